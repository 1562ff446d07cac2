//! Personality routine dispatch: the `SU16`/`LU16`/`LU32` index encoded in
//! the top nibble of a compact-model entry's first word.
//!
//! Mirrors `DecodeFrame` in `stacktrace.c`. Arm reserves indices 3-15 for
//! future use; this unwinder has no personality routine for them and
//! reports the frame as unresolvable so the frame walker can terminate the
//! walk instead of trusting a frame pointer nothing actually decoded.

use super::opcode::decode_compact_model_entry;

/// Short frame: up to 3 unwind instructions packed into the first word
/// itself (bits 16-23, 8-15, 0-7).
pub const SU16: u8 = 0x0;
/// Long frame, 16-bit instruction-count field: unwind instructions continue
/// into `instr_count` additional words.
pub const LU16: u8 = 0x1;
/// Long frame, 32-bit instruction-count field. This unwinder decodes it
/// identically to `LU16` — the distinction only matters for table
/// producers, not for a reader walking a conforming table.
pub const LU32: u8 = 0x2;

/// Runs the personality routine selected by `entry`'s top nibble against
/// the compact-model data it carries, starting from frame pointer `fp`.
///
/// `decoded_entry` is the resolved address of this entry (used as the base
/// for any additional instruction words an `LU16`/`LU32` entry needs).
///
/// Returns `None` for any personality index other than `SU16`/`LU16`/`LU32`
/// (spec.md §4.4: "any other index ⇒ fail this frame ... and terminate the
/// walk"). The caller must not fall back to the unmodified `fp` in that
/// case — there is no way to tell "the routine ran and left `fp` alone"
/// apart from "no routine ran at all" if this only returned `u32`.
///
/// Mirrors `DecodeFrame` in `stacktrace.c`.
///
/// # Safety
///
/// If `entry`'s personality index is `LU16` or `LU32`, every instruction
/// word from `decoded_entry` onward for `instr_count` instructions must be
/// valid to read.
#[must_use]
pub unsafe fn decode_frame(entry: u32, decoded_entry: u32, fp: u32) -> Option<u32> {
    let word = entry & 0x00ff_ffff;
    let instr_count = ((word >> 16) & 0xff) as u8;
    let personality = ((entry >> 24) & 0xf) as u8;

    let entry_ptr = decoded_entry as *const u8;

    match personality {
        SU16 => Some(unsafe { decode_compact_model_entry(entry_ptr, word, fp, 3, 1) }),
        LU16 | LU32 => Some(unsafe {
            decode_compact_model_entry(entry_ptr, word, fp, 2 + 4 * instr_count, 2)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn su16_personality_runs_inline_instructions() {
        // Personality SU16 (top nibble 0), instr1 = 0x10 at bits 16-23 ->
        // vsp += (0x10<<2)+4 = 0x44. No second/third instruction byte set,
        // which decodes as a no-op ("finish"-equivalent, byte 0x00 falls
        // into the catch-all no-op arm).
        let entry = 0x0010_0000;
        let fp = 0x2000_0000;
        let new_fp = unsafe { decode_frame(entry, 0, fp) }.unwrap();
        assert_eq!(new_fp, fp + 0x44);
    }

    #[test]
    fn unknown_personality_signals_failure() {
        let entry = 0x0f00_0000; // personality index 15, reserved
        let fp = 0x2000_0000;
        assert!(unsafe { decode_frame(entry, 0, fp) }.is_none());
    }

    #[test]
    fn lu16_personality_reads_additional_words() {
        // One additional instruction word beyond the header: instr_count=1
        // field at bits16-23 of the 24-bit word -> total instr slots =
        // 2 + 4*1 = 6, starting at offset2=2 within the header word.
        // Header word's own two instruction slots (index 0, 1) are both
        // no-ops (0x00 byte at bits8-15 and bits0-7).
        let header_word_low24 = 0x01_0000u32; // instr_count = 1
        let entry = (LU16 as u32) << 24 | header_word_low24;

        // `decoded_entry` is the address of the header word itself;
        // `decoded_entry + 4` is where the continuation instructions live.
        // Fill the continuation word with "finish" (0xb0) bytes so the walk
        // is a pure no-op regardless of how many of its bytes are consumed.
        let continuation: [u32; 2] = [0, 0xb0b0_b0b0];
        let decoded_entry = continuation.as_ptr() as u32;

        let fp = 0x2000_0000;
        let new_fp = unsafe { decode_frame(entry, decoded_entry, fp) }.unwrap();
        assert_eq!(new_fp, fp);
    }
}
