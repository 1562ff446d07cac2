//! The frame walker: the one piece of this crate that is not pure.
//!
//! [`unwind_stack`] repeatedly resolves the current return address to the
//! function that contains it, runs that function's unwind instructions,
//! and follows the resulting frame pointer chain, writing each resolved
//! frame into a [`CallStack`] until it fills up or the chain ends.
//!
//! Mirrors `UnwindStack`/`UnwindNextFrame` in `stacktrace.c`.

use crate::model::{Call, CallStack, FP_TERMINATOR, LR_TERMINATOR};

use super::exidx::{self, EXIDX_CANTUNWIND};
use super::personality;
use super::primitives::read_word;

/// Walks the call stack starting from `last_call`, writing resolved frames
/// into `call_stack`.
///
/// `exidx_section` and `entries_count` describe the `.ARM.exidx` table to
/// search; entries must be sorted ascending by resolved function address,
/// which a conforming linker guarantees.
///
/// The walk stops when `call_stack` reaches [`CALL_STACK_MAX_SIZE`]
/// (`crate::model::CALL_STACK_MAX_SIZE`), when it meets `EXIDX_CANTUNWIND`,
/// a malformed second word, or an unrecognized personality index, when the
/// exidx lookup cannot find a covering entry (an empty table, or `lr` below
/// every indexed function), or when the frame pointer chain reaches the
/// `0x07070707` debug-fill sentinel. None of these are reported as errors:
/// the caller reads however many frames [`CallStack::frames`] holds.
/// `entries_count == 0` is accepted and yields exactly one recorded frame
/// (spec.md §8: "An empty index table ⇒ length == 1").
///
/// Mirrors `UnwindStack` in `stacktrace.c`.
///
/// # Safety
///
/// `exidx_section .. exidx_section + 8 * entries_count` must lie within the
/// `.ARM.exidx` section, and every extab/stack address the walk follows
/// from there must be valid to read. A corrupt or adversarial table can at
/// worst make this read arbitrary readable memory as more exidx/extab data
/// or stack frames; it cannot make this function write outside
/// `call_stack` or allocate.
pub unsafe fn unwind_stack(
    call_stack: &mut CallStack,
    last_call: Call,
    exidx_section: *const u8,
    entries_count: u32,
) {
    call_stack.seed(last_call);

    while !call_stack.is_full() && !call_stack.working().is_terminal() {
        // SAFETY: forwarded from the caller's contract above.
        unsafe { unwind_next_frame(call_stack, exidx_section, entries_count) };
    }
}

/// Resolves the working frame's `lr` against the exidx table and advances
/// `call_stack` to the next frame in the chain.
///
/// Mirrors `UnwindNextFrame` in `stacktrace.c`.
///
/// # Safety
///
/// Same contract as [`unwind_stack`].
unsafe fn unwind_next_frame(call_stack: &mut CallStack, exidx_section: *const u8, entries_count: u32) {
    let current = call_stack.working();

    // SAFETY: forwarded from the caller's contract above.
    let lookup_result = unsafe { exidx::lookup(exidx_section, entries_count, current.lr) };
    let Some(entry) = lookup_result else {
        // An empty table or a return address below every indexed function:
        // there is no entry to pin `lr` to, so the working frame is
        // finalized exactly as seeded (spec.md §8: "An empty index table ⇒
        // length == 1 (the seed frame, immediately terminated)").
        call_stack.advance();
        if !call_stack.is_full() {
            call_stack.set_working(Call {
                lr: LR_TERMINATOR,
                fp: FP_TERMINATOR,
            });
        }
        return;
    };

    // The working frame's `lr` is pinned to the resolved start of the
    // function it was found in before we move on to the next slot; this is
    // the frame's entry in the finalized call stack.
    call_stack.set_working(Call {
        lr: entry.decoded_fn,
        fp: current.fp,
    });
    call_stack.advance();

    if call_stack.is_full() {
        return;
    }

    let next = if entry.exidx_entry == EXIDX_CANTUNWIND {
        Call {
            lr: LR_TERMINATOR,
            fp: FP_TERMINATOR,
        }
    } else if entry.exidx_entry & 0x8000_0000 != 0 {
        // SAFETY: forwarded from the caller's contract above.
        match unsafe { personality::decode_frame(entry.exidx_entry, entry.decoded_entry, current.fp) } {
            // SAFETY: forwarded from the caller's contract above.
            Some(new_fp) => unsafe { resolve_next_call(new_fp) },
            // Unknown personality index: fail this frame rather than trust
            // an `fp` no routine actually decoded (spec.md §4.4, §7 item 2).
            None => Call {
                lr: LR_TERMINATOR,
                fp: FP_TERMINATOR,
            },
        }
    } else {
        // SAFETY: forwarded from the caller's contract above.
        let extab_entry = unsafe { read_word(entry.decoded_entry as *const u8, 0) };
        if extab_entry & 0x8000_0000 != 0 {
            // SAFETY: forwarded from the caller's contract above.
            match unsafe { personality::decode_frame(extab_entry, entry.decoded_entry, current.fp) } {
                // SAFETY: forwarded from the caller's contract above.
                Some(new_fp) => unsafe { resolve_next_call(new_fp) },
                None => Call {
                    lr: LR_TERMINATOR,
                    fp: FP_TERMINATOR,
                },
            }
        } else {
            // The extab entry itself is not a compact-model descriptor.
            // The original leaves this case unhandled (the working slot
            // keeps whatever was there before); we terminate explicitly
            // rather than resume from a frame pointer nothing decoded.
            Call {
                lr: LR_TERMINATOR,
                fp: FP_TERMINATOR,
            }
        }
    };

    call_stack.set_working(next);
}

/// Reads the `(fp, lr)` pair a resolved virtual stack pointer points at: the
/// callee-saved frame pointer at offset 0, and the return address at offset
/// 4 with the Thumb bit stripped.
///
/// # Safety
///
/// `new_fp .. new_fp + 8` must be valid to read.
unsafe fn resolve_next_call(new_fp: u32) -> Call {
    let ptr = new_fp as *const u8;
    // SAFETY: forwarded from the caller's contract above.
    let fp = unsafe { read_word(ptr, 0) };
    // SAFETY: forwarded from the caller's contract above.
    let lr = unsafe { read_word(ptr, 4) }.wrapping_sub(1);
    Call { lr, fp }
}
