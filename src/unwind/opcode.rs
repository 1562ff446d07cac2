//! The EHABI compact-model unwind bytecode interpreter.
//!
//! Mirrors `DecodeCompactModelEntry`/`GetInstruction` in `stacktrace.c`.
//! Every arithmetic step uses wrapping 32-bit math to match the original's
//! implicit `uint32_t` overflow behavior exactly (see
//! `decode_compact_model_entry`'s `01xxxxxx` branch).

use super::primitives::read_word;

/// Fetches the unwind-instruction byte at logical position `offset` within
/// the bytecode stream that starts `offset2` bytes into `word`.
///
/// When `offset` falls within the already-decoded `word`, the byte is
/// extracted directly. Once it crosses the boundary of that first word, the
/// containing word is re-read from memory at `entry_ptr` — this never
/// caches a previously-read word across the boundary, since a single
/// [`decode_compact_model_entry`] call can walk across arbitrarily many
/// words for an `LU16`/`LU32` entry.
///
/// Mirrors `GetInstruction` in `stacktrace.c`.
///
/// # Safety
///
/// Once `offset` crosses the first word, this reads four bytes starting at
/// `entry_ptr + 4 * ((offset - offset2) / 4 + 1)`; that range must be valid
/// to read for every `offset` in `0..instr_count` the caller will pass.
#[must_use]
pub unsafe fn get_instruction(entry_ptr: *const u8, word: u32, offset: u8, offset2: u8) -> u32 {
    let offset = u32::from(offset);
    let offset2 = u32::from(offset2);

    if offset >= 4 - offset2 {
        let word_index = 4 * ((offset - offset2) / 4 + 1);
        // SAFETY: forwarded from the caller's contract above.
        let new_word = unsafe { read_word(entry_ptr, word_index) };
        let shift = 24 - ((offset - offset2) % 4) * 8;
        (new_word >> shift) & 0xff
    } else {
        let shift = 24 - ((offset + offset2) % 4) * 8;
        (word >> shift) & 0xff
    }
}

/// Runs `instr_count` unwind instructions starting at logical position
/// `offset` in the bytecode stream (1 for `SU16`, 2 for `LU16`/`LU32`),
/// folding their effect into `fp`, and returns the resulting virtual stack
/// pointer.
///
/// Mirrors `DecodeCompactModelEntry` in `stacktrace.c`. Opcodes this
/// unwinder has no use for (register-popping masks, `vsp = r7`/`r11`, and
/// the various reserved/spare encodings) are recognized — so the cursor
/// still advances past their operand bytes correctly — but do not change
/// `fp`; this unwinder only ever needs the final virtual stack pointer, not
/// the registers restored along the way.
///
/// # Safety
///
/// Forwarded to [`get_instruction`]: every word this call touches via
/// `entry_ptr` must be valid to read.
#[must_use]
pub unsafe fn decode_compact_model_entry(
    entry_ptr: *const u8,
    word: u32,
    fp: u32,
    instr_count: u8,
    offset: u8,
) -> u32 {
    let mut new_fp = fp;
    let mut instr_index: u8 = 0;

    while instr_index < instr_count {
        let double_instr = instr_index < instr_count - 1;

        // SAFETY: forwarded from the caller's contract above.
        let instr1 = unsafe { get_instruction(entry_ptr, word, instr_index, offset) };
        let instr2 = if double_instr {
            // SAFETY: forwarded from the caller's contract above.
            unsafe { get_instruction(entry_ptr, word, instr_index + 1, offset) }
        } else {
            0
        };

        if instr1 & 0xc0 == 0x00 {
            // 00xxxxxx: vsp = vsp + (xxxxxx << 2) + 4
            new_fp = new_fp.wrapping_add(((instr1 & 0x3f) << 2).wrapping_add(4));
        } else if instr1 & 0xc0 == 0x40 {
            // 01xxxxxx: vsp = vsp - (xxxxxx << 2) - 4 (preserved literally, see SPEC_FULL.md §E.1)
            new_fp = new_fp.wrapping_sub(((instr1 & 0x3f) << 2).wrapping_sub(4));
        } else if double_instr && instr1 == 0x80 && instr2 == 0x00 {
            instr_index += 1;
        } else if double_instr && instr1 & 0xf0 == 0x80 {
            instr_index += 1;
        } else if instr1 == 0x9d {
        } else if instr1 == 0x9f {
        } else if instr1 & 0xf0 == 0x90 {
        } else if instr1 & 0xf8 == 0xa0 {
        } else if instr1 & 0xf8 == 0xa8 {
        } else if instr1 == 0xb0 {
        } else if double_instr && instr1 == 0xb1 && instr2 == 0x00 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xb1 && instr2 & 0xf0 == 0x00 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xb1 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xb2 {
            // 10110010 uleb128: vsp = vsp + 0x204 + (uleb128 << 2)
            new_fp = new_fp.wrapping_add(0x204 + (instr2 << 2));
            instr_index += 1;
        } else if double_instr && instr1 == 0xb3 {
            instr_index += 1;
        } else if instr1 == 0xb4 {
        } else if instr1 & 0xf8 == 0xb8 {
        } else if instr1 & 0xf8 == 0xc0 {
        } else if double_instr && instr1 == 0xc6 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xc7 && instr2 == 0x00 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xc7 && instr2 & 0xf0 == 0x00 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xc7 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xc8 {
            instr_index += 1;
        } else if double_instr && instr1 == 0xc9 {
            instr_index += 1;
        } else if instr1 & 0xf8 == 0xc8 {
        } else if instr1 & 0xf8 == 0xd0 {
        } else if instr1 & 0xc0 == 0xc0 {
        } else {
        }

        instr_index += 1;
    }

    new_fp
}

#[cfg(test)]
mod tests {
    use super::*;

    // For `offset2 == 1` (SU16), instruction index 0 sits at bits 16-23 of
    // `word`, index 1 at bits 8-15, index 2 at bits 0-7 — the layout
    // `stacktrace.c` describes as "bits 16-23, 8-15, 0-7 of the first word".

    #[test]
    fn vsp_increment_opcode() {
        // instr1 = 0x10 (00010000) -> vsp += (0x10<<2)+4 = 0x44
        let word = 0x0010_0000;
        let fp = 0x2000_0000;
        let new_fp = unsafe { decode_compact_model_entry(core::ptr::null(), word, fp, 1, 1) };
        assert_eq!(new_fp, fp + 0x44);
    }

    #[test]
    fn vsp_decrement_opcode() {
        // instr1 = 0x42 (01000010) -> vsp -= (2<<2)-4 = 4
        let word = 0x0042_0000;
        let fp = 0x2000_0100;
        let new_fp = unsafe { decode_compact_model_entry(core::ptr::null(), word, fp, 1, 1) };
        assert_eq!(new_fp, fp - 4);
    }

    #[test]
    fn vsp_decrement_opcode_zero_mask_adds_four() {
        // mask == 0 underflows in the original's unsigned arithmetic,
        // netting a +4 instead of a -(-4); this pins that behavior down.
        let word = 0x0040_0000;
        let fp = 0x2000_0100;
        let new_fp = unsafe { decode_compact_model_entry(core::ptr::null(), word, fp, 1, 1) };
        assert_eq!(new_fp, fp + 4);
    }

    #[test]
    fn finish_opcode_is_a_noop() {
        let word = 0x00b0_0000; // 0xb0 = finish
        let fp = 0x2000_0000;
        let new_fp = unsafe { decode_compact_model_entry(core::ptr::null(), word, fp, 1, 1) };
        assert_eq!(new_fp, fp);
    }

    #[test]
    fn large_vsp_increment_consumes_uleb128_operand() {
        // 0xb2 <uleb128> -> vsp += 0x204 + (uleb128<<2); uleb128 = 5 here.
        // instr1 at bits 16-23, instr2 at bits 8-15.
        let word = 0x00b2_0500;
        let fp = 0x2000_0000;
        let new_fp = unsafe { decode_compact_model_entry(core::ptr::null(), word, fp, 2, 1) };
        assert_eq!(new_fp, fp + 0x204 + (5 << 2));
    }

    #[test]
    fn get_instruction_crosses_word_boundary() {
        // offset2 = 2 (an LU16/LU32 entry): indices 0 and 1 sit in the first
        // word; index 2 onward crosses into the next one.
        let word0 = 0x0000_0000u32;
        let word1 = 0xaabb_0000u32; // memory bytes: [0x00, 0x00, 0xbb, 0xaa]
        let words = [word0, word1];
        let ptr = words.as_ptr().cast::<u8>();

        let first = unsafe { get_instruction(ptr, word0, 2, 2) };
        assert_eq!(first, 0xaa);
        let second = unsafe { get_instruction(ptr, word0, 3, 2) };
        assert_eq!(second, 0xbb);
    }
}
