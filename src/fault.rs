//! Classifying which synchronous fault fired and why, from the CPU's own
//! fault status registers.
//!
//! Mirrors `InitFDIR`/`SaveRegisters` in `fdir.c`, decoding the Cortex-M
//! `CFSR`/`HFSR` bit layout the way the teacher's own
//! `abort_handler::fault` module decodes Cortex-A's `DFSR`/`IFSR`
//! (`FaultDetails::from(u32)`).

use core::fmt::{self, Display, Formatter};

use bitflags::bitflags;

use crate::model::SavedRegisters;

const CMSIS_SHCSR: *mut u32 = 0xE000_ED24 as *mut u32;
const CMSIS_CFSR: *const u32 = 0xE000_ED28 as *const u32;
const CMSIS_HFSR: *const u32 = 0xE000_ED2C as *const u32;
const CMSIS_CCR: *mut u32 = 0xE000_ED14 as *mut u32;

const SHCSR_MEMFAULTENA: u32 = 1 << 16;
const SHCSR_BUSFAULTENA: u32 = 1 << 17;
const SHCSR_USGFAULTENA: u32 = 1 << 18;

const CCR_UNALIGN_TRP: u32 = 1 << 3;
const CCR_DIV_0_TRP: u32 = 1 << 4;

/// Enables the MemManage, BusFault and UsageFault exceptions, and traps on
/// unaligned access and division by zero.
///
/// Without this, the three configurable faults escalate straight to
/// `HardFault`, and divide-by-zero/unaligned access are silently tolerated
/// by the instructions that would otherwise trap on them.
///
/// Mirrors `InitFDIR` in `fdir.c`.
///
/// # Safety
///
/// Must run with access to the System Control Block, i.e. at a privileged
/// exception level on a real Cortex-M core (or not at all on the host).
pub unsafe fn init() {
    // SAFETY: forwarded from the caller's contract above.
    unsafe {
        let shcsr = CMSIS_SHCSR.read_volatile();
        CMSIS_SHCSR.write_volatile(shcsr | SHCSR_MEMFAULTENA | SHCSR_BUSFAULTENA | SHCSR_USGFAULTENA);

        let ccr = CMSIS_CCR.read_volatile();
        CMSIS_CCR.write_volatile(ccr | CCR_DIV_0_TRP | CCR_UNALIGN_TRP);
    }

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Reads the current `CFSR` and `HFSR` verbatim.
///
/// # Safety
///
/// Same contract as [`init`].
#[must_use]
pub unsafe fn read_fault_status() -> (CfsrFlags, HfsrFlags) {
    // SAFETY: forwarded from the caller's contract above.
    let cfsr = unsafe { CMSIS_CFSR.read_volatile() };
    // SAFETY: forwarded from the caller's contract above.
    let hfsr = unsafe { CMSIS_HFSR.read_volatile() };
    (CfsrFlags::from_bits_truncate(cfsr), HfsrFlags::from_bits_truncate(hfsr))
}

/// Which of the four synchronous fault exceptions is being handled.
///
/// Mirrors the four naked handlers (`HardFault_Handler`,
/// `MemManage_Handler`, `BusFault_Handler`, `UsageFault_Handler`) in
/// `fdir.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// An escalated fault, or one of the faults this crate cannot itself
    /// re-enable (a fault in the fault handler, a fault with its own
    /// handler disabled, or a fault escalated by priority).
    HardFault,
    /// A memory protection/MPU violation.
    MemManage,
    /// A bus error on an instruction or data access, or a bus fault during
    /// exception entry/return.
    BusFault,
    /// An undefined instruction, invalid state, unaligned access, or
    /// division by zero (with the relevant trap enabled).
    UsageFault,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HardFault => "HardFault",
            Self::MemManage => "MemManage fault",
            Self::BusFault => "BusFault",
            Self::UsageFault => "UsageFault",
        })
    }
}

bitflags! {
    /// The Configurable Fault Status Register: `MMFSR` in bits 0-7, `BFSR`
    /// in bits 8-15, `UFSR` in bits 16-31.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CfsrFlags: u32 {
        /// MMFSR: attempted instruction fetch from a non-executable region.
        const IACCVIOL = 1 << 0;
        /// MMFSR: attempted data access violating MPU/memory permissions.
        const DACCVIOL = 1 << 1;
        /// MMFSR: unstacking on exception return faulted.
        const MUNSTKERR = 1 << 3;
        /// MMFSR: stacking on exception entry faulted.
        const MSTKERR = 1 << 4;
        /// MMFSR: a floating-point lazy state preservation faulted.
        const MLSPERR = 1 << 5;
        /// MMFSR: `MMFAR` holds a valid faulting address.
        const MMARVALID = 1 << 7;
        /// BFSR: a bus fault on an instruction fetch (precise).
        const IBUSERR = 1 << 8;
        /// BFSR: a precise data bus error.
        const PRECISERR = 1 << 9;
        /// BFSR: an imprecise data bus error.
        const IMPRECISERR = 1 << 10;
        /// BFSR: unstacking on exception return faulted.
        const UNSTKERR = 1 << 11;
        /// BFSR: stacking on exception entry faulted.
        const STKERR = 1 << 12;
        /// BFSR: a floating-point lazy state preservation faulted.
        const LSPERR = 1 << 13;
        /// BFSR: `BFAR` holds a valid faulting address.
        const BFARVALID = 1 << 15;
        /// UFSR: execution of an undefined instruction.
        const UNDEFINSTR = 1 << 16;
        /// UFSR: execution of an instruction with an invalid EPSR state.
        const INVSTATE = 1 << 17;
        /// UFSR: an integrity check failure on `EXC_RETURN`.
        const INVPC = 1 << 18;
        /// UFSR: attempted coprocessor access with no coprocessor present.
        const NOCP = 1 << 19;
        /// UFSR: an unaligned access, with `UNALIGN_TRP` set.
        const UNALIGNED = 1 << 24;
        /// UFSR: a division by zero, with `DIV_0_TRP` set.
        const DIVBYZERO = 1 << 25;
    }
}

impl Display for CfsrFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<none>");
        }

        let mut first = true;
        for (name, flag) in self.iter_names() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}")?;
            let _ = flag;
        }
        Ok(())
    }
}

bitflags! {
    /// The Hard Fault Status Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HfsrFlags: u32 {
        /// A bus fault occurred while reading the vector table.
        const VECTTBL = 1 << 1;
        /// A configurable fault escalated to a hard fault, since its own
        /// handler was disabled or could not be executed at its priority.
        const FORCED = 1 << 30;
        /// A debug event occurred while debug monitoring was disabled.
        const DEBUGEVT = 1 << 31;
    }
}

/// The captured details of a synchronous CPU fault: which exception fired,
/// the register state it fired with, and the decoded status registers.
///
/// Unlike the teacher's `Fault<'a>`, this crate never resumes the faulting
/// thread, so it owns a snapshot of the registers rather than a mutable
/// reference into the exception frame.
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    /// Which synchronous exception fired.
    pub kind: FaultKind,
    /// The saved CPU state from immediately before the exception.
    pub registers: SavedRegisters,
    /// The decoded Configurable Fault Status Register.
    pub cfsr: CfsrFlags,
    /// The decoded Hard Fault Status Register.
    pub hfsr: HfsrFlags,
}

impl Fault {
    /// Captures a fault's kind, registers and fault status registers.
    #[must_use]
    pub const fn new(kind: FaultKind, registers: SavedRegisters, cfsr: CfsrFlags, hfsr: HfsrFlags) -> Self {
        Self {
            kind,
            registers,
            cfsr,
            hfsr,
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at pc=0x{:08x} lr=0x{:08x}: cfsr=[{}] hfsr=0x{:08x}",
            self.kind, self.registers.pc, self.registers.lr, self.cfsr, self.hfsr.bits()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfsr_decodes_known_bits() {
        let cfsr = CfsrFlags::from_bits_truncate(0x0002_0000); // DIVBYZERO
        assert!(cfsr.contains(CfsrFlags::DIVBYZERO));
        assert!(!cfsr.contains(CfsrFlags::UNALIGNED));
    }

    #[test]
    fn cfsr_truncates_reserved_bits() {
        let cfsr = CfsrFlags::from_bits_truncate(0xFFFF_FFFF);
        assert!(cfsr.contains(CfsrFlags::IACCVIOL));
        assert!(cfsr.contains(CfsrFlags::DIVBYZERO));
    }

    #[test]
    fn display_includes_fault_kind_and_pc() {
        extern crate std;
        let registers = SavedRegisters {
            pc: 0x0800_1234,
            lr: 0x0800_5678,
            ..SavedRegisters::default()
        };
        let fault = Fault::new(
            FaultKind::UsageFault,
            registers,
            CfsrFlags::DIVBYZERO,
            HfsrFlags::empty(),
        );
        let text = std::format!("{fault}");
        assert!(text.contains("UsageFault"));
        assert!(text.contains("08001234"));
    }
}
