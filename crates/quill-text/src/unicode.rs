//! Character classification helpers used by font selection and shaping.

use unicode_linebreak::linebreaks;

/// True for characters that cause joining behavior with their neighbors
/// (zero-width joiner). Ranges containing one of these should stay on the
/// font that rendered the previous character so joined clusters don't
/// break visually.
pub fn is_join_causer(ch: char) -> bool {
    ch == '\u{200D}'
}

/// True for code points in the Private Use Areas. These never fall back to
/// preference or system fonts; only an explicitly requested font may
/// render them.
pub fn is_private_use(ch: char) -> bool {
    matches!(ch, '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{10FFFD}')
}

/// Characters that must not be handed to a shaping backend because they
/// are layout controls rather than renderable text. They get zero-width,
/// non-rendering glyph entries instead.
pub fn is_invalid_char(ch: char) -> bool {
    if ch >= ' ' {
        return ch == '\u{0085}' // NEL
            || ch == '\u{200B}' // ZWSP
            || ch == '\u{2028}' // LSEP
            || ch == '\u{2029}' // PSEP
            || matches!(ch, '\u{202A}'..='\u{202E}' | '\u{200E}' | '\u{200F}');
    }
    matches!(ch, '\u{000B}' | '\t' | '\r' | '\n' | '\u{000C}')
        || ('\u{001C}'..='\u{001F}').contains(&ch)
}

// The missing-glyph box draws the code point as hex digits in a tiny
// internal font; these mirror that layout so the box stays clickable.
const MINIFONT_DIGIT_WIDTH: f64 = 5.0;
const MINIFONT_PADDING: f64 = 1.0;
const BOX_BORDER_AND_PADDING: f64 = 4.0;

/// Minimum visible width (in device units) for the fallback box drawn in
/// place of a character no font can render. Wide enough for the hex
/// digits of the code point laid out in two rows.
pub fn missing_glyph_min_width(ch: u32) -> f64 {
    let digits: f64 = if ch <= 0xFFFF { 4.0 } else { 6.0 };
    (digits / 2.0) * (MINIFONT_DIGIT_WIDTH + MINIFONT_PADDING) + BOX_BORDER_AND_PADDING
}

/// Compute per-character break-before flags for
/// [`TextRun::set_potential_line_breaks`](crate::textrun::TextRun::set_potential_line_breaks)
/// using UAX-14 line breaking.
///
/// Entry `i` is true when a line may break before character `i`. The
/// break reported after the final character is dropped; a text run has no
/// "after the end" position.
pub fn potential_line_breaks(text: &str) -> Vec<bool> {
    let char_count = text.chars().count();
    let mut flags = vec![false; char_count];
    if char_count == 0 {
        return flags;
    }

    // Map byte offsets back to character indexes once.
    let mut char_of_byte = vec![0usize; text.len() + 1];
    for (char_index, (byte_index, ch)) in text.char_indices().enumerate() {
        for b in byte_index..byte_index + ch.len_utf8() {
            char_of_byte[b] = char_index;
        }
    }
    char_of_byte[text.len()] = char_count;

    // Mandatory and allowed breaks are both "can break before" here;
    // mandatory breaks have already produced separate runs upstream.
    for (offset, _opportunity) in linebreaks(text) {
        let index = char_of_byte[offset];
        if index < char_count {
            flags[index] = true;
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_causer_is_zwj_only() {
        assert!(is_join_causer('\u{200D}'));
        assert!(!is_join_causer('a'));
        assert!(!is_join_causer('\u{200C}'));
    }

    #[test]
    fn private_use_ranges() {
        assert!(is_private_use('\u{E000}'));
        assert!(is_private_use('\u{F8FF}'));
        assert!(is_private_use('\u{F0000}'));
        assert!(!is_private_use('A'));
    }

    #[test]
    fn invalid_chars_include_controls() {
        assert!(is_invalid_char('\n'));
        assert!(is_invalid_char('\t'));
        assert!(is_invalid_char('\u{200B}'));
        assert!(!is_invalid_char(' '));
        assert!(!is_invalid_char('x'));
    }

    #[test]
    fn missing_width_grows_for_supplementary() {
        assert!(missing_glyph_min_width(0x10001) > missing_glyph_min_width(0x2603));
    }

    #[test]
    fn line_breaks_after_space() {
        let flags = potential_line_breaks("a b");
        assert_eq!(flags.len(), 3);
        // Break opportunity before 'b' (after the space).
        assert!(flags[2]);
        assert!(!flags[1]);
    }
}
