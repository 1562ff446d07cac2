//! Failure Detection, Identification and Recovery (FDIR) for a 32-bit ARM
//! Cortex-M target.
//!
//! When the processor raises a synchronous fault exception (hard fault,
//! memory-management fault, bus fault, usage fault), this crate captures the
//! pre-exception register state and synthesizes a symbolic call stack by
//! walking the `.ARM.exidx` / `.ARM.extab` sections emitted by a conforming
//! toolchain (the ARM Exception Handling ABI, "EHABI").
//!
//! The core of this crate, and the part that is exercised by its test suite
//! on the host, is [`unwind`]: a decoder for the compact EHABI unwind
//! bytecode that needs no allocation, no access to the thread state it is
//! reconstructing, and terminates rather than guesses when it meets a
//! corrupt table.
//!
//! [`model`] holds the plain data captured at fault entry. [`fault`] and
//! [`vectors`] (behind the `handler` feature) are the optional,
//! hardware-touching layers that feed the unwinder from a real Cortex-M
//! exception; they are not required to use the unwinder itself.
//!
//! This crate does not symbolize addresses, does not interpret DWARF, does
//! not attempt to recover from a corrupt unwind table, and does not
//! transport or format its results — that is a reporter sink's job.

#![no_std]
#![warn(missing_docs)]

pub mod fault;
pub mod model;
pub mod unwind;
#[cfg(feature = "handler")]
pub mod vectors;

pub use model::{Call, CallStack, DebugInfo, SavedRegisters, CALL_STACK_MAX_SIZE};
pub use unwind::walker::unwind_stack;
