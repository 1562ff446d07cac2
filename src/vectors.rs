//! Naked-function exception entry trampolines.
//!
//! Feature-gated (`handler`): a consumer with their own boot substrate and
//! frame-capture stub can ignore this module entirely and call
//! [`crate::unwind::walker::unwind_stack`] directly. When enabled, this
//! module is the reference frame-capture stub the crate-level docs describe
//! as an external collaborator of the unwinder proper (`spec.md` §1).
//!
//! Mirrors `HardFault_Handler`/`MemManage_Handler`/`BusFault_Handler`/
//! `UsageFault_Handler` plus `SaveRegisters`/`PrepareUnwind` in `fdir.c`,
//! written in the naked-`asm!` style of
//! `vexide_startup::abort_handler::fault_exception_vector!`.

use core::arch::naked_asm;
use core::ptr::{addr_of, addr_of_mut};

use crate::fault::{self, Fault, FaultKind};
use crate::model::{Call, DebugInfo, SavedRegisters};
use crate::unwind;

unsafe extern "C" {
    /// Start of the `.ARM.exidx` section, provided by the linker script.
    static exidx_start: u8;
    /// End of the `.ARM.exidx` section, provided by the linker script.
    static exidx_end: u8;
}

/// Process-wide capture of the most recent fault this handler observed.
///
/// Mirrors `debug_info`/`last_call` in `fdir.c`: written once by exactly one
/// handler invocation (a nested synchronous fault escalates to `HardFault`,
/// which is itself terminal), then read by a reporter sink. See
/// `SPEC_FULL.md` §D.
static mut DEBUG_INFO: DebugInfo = DebugInfo::new();

/// Returns the [`DebugInfo`] captured by the most recent fault, if any
/// handler has run yet.
///
/// # Safety
///
/// Must not be called while a fault handler may still be writing to
/// [`DEBUG_INFO`]; in practice this means "not from inside a nested fault".
#[must_use]
pub unsafe fn debug_info() -> &'static DebugInfo {
    // SAFETY: forwarded from the caller's contract above.
    unsafe { &*addr_of!(DEBUG_INFO) }
}

macro_rules! fault_exception_vector {
    (
        $(#[$attrs:meta])*
        $name:ident: $kind:expr
    ) => {
        $(#[$attrs])*
        #[unsafe(naked)]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name() {
            naked_asm!(
                // Test bit 2 of EXC_RETURN (in lr): 0 => main stack, 1 => process
                // stack. Mirrors `SaveRegisters`/`PrepareUnwind` in fdir.c.
                "tst lr, #4",
                "ite eq",
                "mrseq r0, msp",
                "mrsne r0, psp",
                // r7 is this crate's frame pointer register (AAPCS, Cortex-M).
                "mov r1, r7",
                "movs r2, {kind}",
                "b {trampoline}",
                kind = const $kind as u32,
                trampoline = sym fault_trampoline,
            );
        }
    };
}

fault_exception_vector!(
    /// Entry trampoline for the `HardFault` exception.
    ///
    /// # Safety
    ///
    /// Must only be installed as the `HardFault` vector table entry.
    hard_fault: FaultKind::HardFault
);
fault_exception_vector!(
    /// Entry trampoline for the `MemManage` exception.
    ///
    /// # Safety
    ///
    /// Must only be installed as the `MemManage` vector table entry.
    mem_manage_fault: FaultKind::MemManage
);
fault_exception_vector!(
    /// Entry trampoline for the `BusFault` exception.
    ///
    /// # Safety
    ///
    /// Must only be installed as the `BusFault` vector table entry.
    bus_fault: FaultKind::BusFault
);
fault_exception_vector!(
    /// Entry trampoline for the `UsageFault` exception.
    ///
    /// # Safety
    ///
    /// Must only be installed as the `UsageFault` vector table entry.
    usage_fault: FaultKind::UsageFault
);

/// Captures the fault, runs the unwinder, and parks forever.
///
/// `stack_frame` is the interrupted exception frame (`msp` or `psp`,
/// whichever was active), `fp` is the interrupted `r7`, and `kind_raw`
/// identifies which of the four vectors dispatched here.
///
/// Mirrors the body of `UsageFault_Handler` in `fdir.c`: save registers,
/// prepare the unwind seed, unwind, then `while (1)`. Unlike the original,
/// every fault kind (not only `UsageFault`) runs the same capture-and-unwind
/// sequence, since nothing about `SaveRegisters`/`PrepareUnwind`/
/// `UnwindStack` is specific to one exception class.
///
/// # Safety
///
/// Must only be reached from one of the naked trampolines above, with
/// `stack_frame` pointing at a processor-written exception frame and `fp`
/// holding the interrupted frame pointer.
unsafe extern "C" fn fault_trampoline(stack_frame: *const u32, fp: u32, kind_raw: u32) -> ! {
    let kind = match kind_raw {
        1 => FaultKind::MemManage,
        2 => FaultKind::BusFault,
        3 => FaultKind::UsageFault,
        _ => FaultKind::HardFault,
    };

    // SAFETY: `stack_frame` was captured by the trampoline from msp/psp
    // immediately on exception entry.
    let registers = unsafe { SavedRegisters::from_exception_frame(stack_frame) };
    // SAFETY: called from within an active exception, same privilege level
    // `init` requires.
    let (cfsr, hfsr) = unsafe { fault::read_fault_status() };

    let last_call = Call {
        lr: registers.lr,
        fp,
    };

    // SAFETY: single-writer-per-fault invariant documented on `DEBUG_INFO`;
    // no other code touches this static while a handler is running.
    unsafe {
        let info = &mut *addr_of_mut!(DEBUG_INFO);
        info.registers = registers;
        info.cfsr = cfsr.bits();
        info.hfsr = hfsr.bits();

        let exidx_base = addr_of!(exidx_start);
        let exidx_len = (addr_of!(exidx_end) as usize) - (exidx_base as usize);
        let entries_count = (exidx_len / 8) as u32;

        // `unwind_stack` honors `entries_count == 0` itself (an empty
        // table yields exactly the seed frame), so no special-casing is
        // needed here.
        unwind::walker::unwind_stack(&mut info.call_stack, last_call, exidx_base, entries_count);
    }

    let _fault = Fault::new(kind, registers, cfsr, hfsr);

    loop {
        cortex_m::asm::nop();
    }
}
