//! The EHABI decoder: six small, pure functions and one stateful walker.
//!
//! Submodules are layered bottom-up, each built only on the ones before it:
//! [`primitives`] (byte reads, `prel31`), [`exidx`] (table entries and
//! lookup), [`opcode`] (the unwind bytecode interpreter),
//! [`personality`] (`SU16`/`LU16`/`LU32` dispatch), and [`walker`] (the
//! frame-by-frame state machine that ties them together).

pub mod exidx;
pub mod opcode;
pub mod personality;
pub mod primitives;
pub mod walker;
