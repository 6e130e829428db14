//! Fills a text run's glyph records from a shaping backend.
//!
//! The backend reports glyphs with cluster byte offsets; here they are
//! regrouped per character, choosing the compact simple encoding when a
//! cluster is one glyph over one character with a small advance and no
//! offsets, and the detailed side table otherwise.

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::font::Font;
use crate::glyph::{CompressedGlyph, DetailedGlyph};
use crate::textrun::TextRun;
use crate::unicode::is_invalid_char;

/// Shape `run[start..end)` with `font`, recording the glyph run and all
/// glyph data. Layout-control characters are blanked rather than handed
/// to the backend.
pub fn shape_range(run: &mut TextRun, start: usize, end: usize, font: &Arc<Font>) {
    run.add_glyph_run(Arc::clone(font), start, false);

    let text = Arc::clone(run.text());
    let mut i = start;
    while i < end {
        if is_invalid_char(text[i]) {
            run.set_blank_glyph(i);
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < end && !is_invalid_char(text[j]) {
            j += 1;
        }
        shape_segment(run, i, j, font);
        i = j;
    }
}

fn shape_segment(run: &mut TextRun, seg_start: usize, seg_end: usize, font: &Arc<Font>) {
    let text: String = run.text()[seg_start..seg_end].iter().collect();
    let seg_len = seg_end - seg_start;

    let Some(shaped) = font.entry().shape_text(&text, font.style().size) else {
        // Total shaping failure: record every character as missing so
        // layout still has advances to work with.
        log::warn!("shaping failed for font '{}'", font.name());
        for c in 0..seg_len {
            run.set_missing_glyph(seg_start + c, run.get_char(seg_start + c));
        }
        return;
    };

    // Byte offset -> character index within the segment.
    let mut char_of_byte = vec![0usize; text.len() + 1];
    for (char_index, (byte_index, ch)) in text.char_indices().enumerate() {
        for b in byte_index..byte_index + ch.len_utf8() {
            char_of_byte[b] = char_index;
        }
    }
    char_of_byte[text.len()] = seg_len;

    let mut grapheme_start = vec![false; seg_len];
    for (byte_index, _) in text.grapheme_indices(true) {
        grapheme_start[char_of_byte[byte_index]] = true;
    }

    // Backend glyphs grouped by the character starting their cluster.
    let mut glyph_count = vec![0usize; seg_len];
    let mut first_glyph = vec![usize::MAX; seg_len];
    for (g, glyph) in shaped.iter().enumerate() {
        let c = char_of_byte[(glyph.cluster as usize).min(text.len())];
        if c < seg_len {
            glyph_count[c] += 1;
            first_glyph[c] = first_glyph[c].min(g);
        }
    }

    let app_units = run.app_units_per_dev_unit() as f64;
    for c in 0..seg_len {
        let index = seg_start + c;
        if glyph_count[c] == 0 {
            // Inside the previous cluster or ligature.
            if index == 0 {
                log::debug!("backend produced no glyph for the first character");
                run.set_blank_glyph(index);
                continue;
            }
            let glyph = CompressedGlyph::complex(grapheme_start[c], false, 0);
            run.set_glyphs(index, glyph, &[]);
            continue;
        }

        // Number of characters this cluster spans.
        let mut span = 1;
        while c + span < seg_len && glyph_count[c + span] == 0 {
            span += 1;
        }

        let glyphs = &shaped[first_glyph[c]..first_glyph[c] + glyph_count[c]];
        if glyph_count[c] == 1 && span == 1 {
            let glyph = &glyphs[0];
            let advance = (glyph.x_advance * app_units).round() as i32;
            if glyph.x_offset == 0.0
                && glyph.y_offset == 0.0
                && CompressedGlyph::is_simple_advance(advance)
                && CompressedGlyph::is_simple_glyph_id(glyph.glyph_id)
            {
                run.set_simple_glyph(index, advance, glyph.glyph_id);
                continue;
            }
        }

        let details: Vec<DetailedGlyph> = glyphs
            .iter()
            .map(|glyph| DetailedGlyph {
                glyph_id: glyph.glyph_id,
                advance: (glyph.x_advance * app_units).round() as i32,
                x_offset: glyph.x_offset * app_units,
                y_offset: glyph.y_offset * app_units,
            })
            .collect();
        let glyph = CompressedGlyph::complex(true, true, details.len() as u16);
        run.set_glyphs(index, glyph, &details);
    }
}
