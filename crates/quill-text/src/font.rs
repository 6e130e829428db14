//! A font: a face bound to a style, with cached metrics and glyph
//! extents, and the low-level draw/measure loops that walk a text run's
//! glyph records.

use core::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::extents::{GlyphExtents, INVALID_WIDTH};
use crate::geom::{Point, Rect};
use crate::glyph::GlyphData;
use crate::style::FontStyle;
use crate::surface::{DrawTarget, GlyphPlacement, Spacing};
use crate::textrun::TextRun;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("no usable fonts for family list '{0}'")]
    NoUsableFonts(String),
    #[error("invalid font: {0}")]
    InvalidFont(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metrics of a font at a concrete size, in device units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
    pub em_height: f64,
    pub x_height: f64,
    pub ave_char_width: f64,
    pub space_width: f64,
    pub max_advance: f64,
}

impl FontMetrics {
    /// Repair metrics a face reported badly. A zero-size style zeroes
    /// everything; layout then places nothing.
    pub fn sanitize(&mut self, size: f64) {
        if size == 0.0 {
            *self = FontMetrics::default();
            return;
        }
        if !self.ascent.is_finite() || self.ascent < 0.0 {
            self.ascent = 0.0;
        }
        if !self.descent.is_finite() || self.descent < 0.0 {
            self.descent = 0.0;
        }
        if self.em_height <= 0.0 {
            self.em_height = self.ascent + self.descent;
        }
        if self.x_height <= 0.0 {
            self.x_height = self.ascent * 0.5;
        }
        if self.ave_char_width <= 0.0 {
            self.ave_char_width = self.space_width;
        }
        if self.max_advance < self.ave_char_width {
            self.max_advance = self.ave_char_width;
        }
    }
}

/// One glyph as produced by a shaping backend, in device units.
/// `cluster` is the byte offset of the first character of the cluster the
/// glyph belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedGlyph {
    pub glyph_id: u32,
    pub cluster: u32,
    pub x_advance: f64,
    pub x_offset: f64,
    pub y_offset: f64,
}

/// A loaded face. Implementations wrap a real font backend or a test
/// double; everything above this trait is backend-agnostic.
pub trait FontEntry {
    fn name(&self) -> &str;

    /// Character coverage query against the face's cmap.
    fn has_character(&self, ch: char) -> bool;

    fn glyph_for_char(&self, ch: char) -> Option<u32>;

    fn is_bold(&self) -> bool {
        false
    }

    fn is_italic(&self) -> bool {
        false
    }

    /// Downloaded (@font-face style) fonts get precise ink extents during
    /// measurement because the author may rely on overflowing glyphs.
    fn is_user_font(&self) -> bool {
        false
    }

    fn metrics(&self, size: f64) -> FontMetrics;

    /// Tight ink bounds of one glyph in device units (y-down, origin at
    /// the baseline), or None when the face has no outline for it.
    fn glyph_bounds(&self, glyph_id: u32, size: f64) -> Option<Rect>;

    /// Shape a small piece of text. None means the backend failed
    /// entirely; the caller records missing glyphs instead.
    fn shape_text(&self, text: &str, size: f64) -> Option<Vec<ShapedGlyph>>;
}

/// Which bounding box `Font::measure` computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundingBoxType {
    /// Advance box, widened by cached ink overflow where already known.
    Loose,
    /// Precise ink extents, populating the extents cache as needed.
    Tight,
}

/// Result of measuring a range of a text run. All values in app units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunMetrics {
    pub advance_width: f64,
    pub ascent: f64,
    pub descent: f64,
    pub bounding_box: Rect,
}

impl RunMetrics {
    /// Accumulate `other`, horizontally adjacent to self on the given
    /// side.
    pub fn combine_with(&mut self, other: &RunMetrics, other_is_on_left: bool) {
        self.ascent = self.ascent.max(other.ascent);
        self.descent = self.descent.max(other.descent);
        if other_is_on_left {
            self.bounding_box = self
                .bounding_box
                .translate(other.advance_width, 0.0)
                .union(&other.bounding_box);
        } else {
            self.bounding_box = self
                .bounding_box
                .union(&other.bounding_box.translate(self.advance_width, 0.0));
        }
        self.advance_width += other.advance_width;
    }
}

const GLYPH_BUFFER_SIZE: usize = 256;

/// Accumulates positioned glyphs so the drawing target sees batches, not
/// single-glyph calls.
struct GlyphBuffer {
    glyphs: Vec<GlyphPlacement>,
}

impl GlyphBuffer {
    fn new() -> Self {
        GlyphBuffer {
            glyphs: Vec::with_capacity(GLYPH_BUFFER_SIZE),
        }
    }

    fn push(&mut self, glyph: GlyphPlacement) {
        self.glyphs.push(glyph);
    }

    fn flush(&mut self, target: &mut dyn DrawTarget, to_path: bool, reverse: bool, finish: bool) {
        // Leave room for the two glyphs one character can append when
        // synthetic bold is active.
        if !finish && self.glyphs.len() + 2 <= GLYPH_BUFFER_SIZE {
            return;
        }
        if self.glyphs.is_empty() {
            return;
        }
        if reverse {
            self.glyphs.reverse();
        }
        if to_path {
            target.append_glyph_path(&self.glyphs);
        } else {
            target.fill_glyphs(&self.glyphs);
        }
        self.glyphs.clear();
    }
}

/// A face bound to a style. Immutable identity; shared via `Arc` within
/// one thread. The extents caches behind `RefCell` are the only mutable
/// state.
pub struct Font {
    entry: Arc<dyn FontEntry>,
    style: FontStyle,
    metrics: FontMetrics,
    space_glyph: u32,
    /// Horizontal offset in device units of the double-strike used to
    /// simulate bold when the style wants bold but the face isn't.
    synthetic_bold_offset: f64,
    extents: RefCell<Vec<Arc<GlyphExtents>>>,
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Font")
            .field("name", &self.entry.name())
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl Font {
    pub fn new(entry: Arc<dyn FontEntry>, style: FontStyle) -> Self {
        let mut metrics = entry.metrics(style.size);
        metrics.sanitize(style.size);
        let synthetic_bold_offset = if style.wants_bold() && !entry.is_bold() {
            1.0
        } else {
            0.0
        };
        let space_glyph = entry.glyph_for_char(' ').unwrap_or(0);
        Font {
            entry,
            style,
            metrics,
            space_glyph,
            synthetic_bold_offset,
            extents: RefCell::new(Vec::new()),
        }
    }

    pub fn entry(&self) -> &Arc<dyn FontEntry> {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn style(&self) -> &FontStyle {
        &self.style
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub fn space_glyph(&self) -> u32 {
        self.space_glyph
    }

    pub fn has_character(&self, ch: char) -> bool {
        self.entry.has_character(ch)
    }

    pub fn synthetic_bold_offset(&self) -> f64 {
        self.synthetic_bold_offset
    }

    pub fn has_synthetic_bold(&self) -> bool {
        self.synthetic_bold_offset != 0.0
    }

    /// The extents cache for one exact scale, created on first use. A new
    /// cache starts with the space glyph known at width 0; spaces render
    /// no ink.
    pub fn get_or_create_glyph_extents(&self, app_units_per_dev_unit: i32) -> Arc<GlyphExtents> {
        let mut list = self.extents.borrow_mut();
        for extents in list.iter() {
            if extents.app_units_per_dev_unit() == app_units_per_dev_unit {
                return Arc::clone(extents);
            }
        }
        let extents = Arc::new(GlyphExtents::new(app_units_per_dev_unit));
        extents.set_contained_width(self.space_glyph, 0);
        list.push(Arc::clone(&extents));
        extents
    }

    /// Measure one glyph through the drawing target and cache the result.
    ///
    /// A glyph whose ink stays inside `[0, w] x [-ascent, descent]` with a
    /// non-negative bearing is stored as a cheap contained width unless
    /// the caller insists on tight extents; anything else is promoted to
    /// the tight table.
    pub fn setup_glyph_extents(
        &self,
        target: &mut dyn DrawTarget,
        glyph_id: u32,
        need_tight: bool,
        extents: &GlyphExtents,
    ) {
        let app_units = extents.app_units_per_dev_unit() as f64;
        let ink = match target.glyph_ink_extents(self, glyph_id) {
            Some(ink) => ink,
            None => {
                // Record an empty box so we don't re-query a glyph the
                // backend can't measure.
                extents.set_tight_extents(glyph_id, Rect::default());
                return;
            }
        };
        if !need_tight
            && ink.x >= 0.0
            && ink.y >= -self.metrics.ascent
            && ink.y_most() <= self.metrics.descent
        {
            let width = (ink.x_most() * app_units).ceil();
            if width >= 0.0 && width < f64::from(INVALID_WIDTH) {
                extents.set_contained_width(glyph_id, width as u16);
                return;
            }
        }
        extents.set_tight_extents(glyph_id, ink.scale(app_units));
    }

    /// Measure `run[start..end]`, which must be shaped entirely with this
    /// font. Returns app-unit metrics; the bounding box is relative to
    /// the range's origin (leading edge for RTL).
    pub fn measure(
        &self,
        run: &TextRun,
        start: usize,
        end: usize,
        bbox_type: BoundingBoxType,
        mut target: Option<&mut (dyn DrawTarget + '_)>,
        spacing: Option<&[Spacing]>,
    ) -> RunMetrics {
        let app_units = run.app_units_per_dev_unit() as f64;
        let mut metrics = RunMetrics {
            ascent: self.metrics.ascent * app_units,
            descent: self.metrics.descent * app_units,
            ..RunMetrics::default()
        };
        if start >= end {
            // Exit before touching spacing[0], which is undefined here.
            metrics.bounding_box =
                Rect::new(0.0, -metrics.ascent, 0.0, metrics.ascent + metrics.descent);
            return metrics;
        }

        let is_rtl = run.is_rtl();
        let direction = run.direction();
        let needs_glyph_extents = run.needs_bounding_box() || self.entry.is_user_font();
        let extents = if bbox_type == BoundingBoxType::Loose
            && !needs_glyph_extents
            && !run.has_detailed_glyphs()
        {
            None
        } else {
            Some(self.get_or_create_glyph_extents(run.app_units_per_dev_unit()))
        };

        let mut advance_min = 0.0f64;
        let mut advance_max = 0.0f64;
        let mut x = 0.0f64;
        if let Some(spacing) = spacing {
            x += direction * spacing[0].before;
        }

        for i in start..end {
            let glyph_data = run.glyphs()[i];
            match glyph_data.data() {
                GlyphData::Simple { glyph_id, advance } => {
                    let advance = f64::from(advance);
                    // Only fetch real ink extents when the tight box was
                    // requested or this run must be measured precisely.
                    if bbox_type != BoundingBoxType::Loose || needs_glyph_extents {
                        if let Some(extents) = extents.as_ref() {
                            let width = extents.contained_width(glyph_id);
                            if width != INVALID_WIDTH && bbox_type == BoundingBoxType::Loose {
                                union_range(x, &mut advance_min, &mut advance_max);
                                union_range(
                                    x + direction * f64::from(width),
                                    &mut advance_min,
                                    &mut advance_max,
                                );
                            } else {
                                let mut rect = extents
                                    .tight_extents(self, target.as_deref_mut(), glyph_id)
                                    .unwrap_or_else(|| {
                                        Rect::new(
                                            0.0,
                                            -metrics.ascent,
                                            advance,
                                            metrics.ascent + metrics.descent,
                                        )
                                    });
                                if is_rtl {
                                    rect.x -= advance;
                                }
                                rect.x += x;
                                metrics.bounding_box = metrics.bounding_box.union(&rect);
                            }
                        }
                    }
                    x += direction * advance;
                }
                GlyphData::Complex { .. } | GlyphData::Missing { .. } => {
                    let details = run.detailed_glyphs(i);
                    for detail in &details[..glyph_data.glyph_count()] {
                        let advance = f64::from(detail.advance);
                        let mut rect = if glyph_data.is_missing() {
                            None
                        } else {
                            extents.as_ref().and_then(|extents| {
                                extents.tight_extents(
                                    self,
                                    target.as_deref_mut(),
                                    detail.glyph_id,
                                )
                            })
                        }
                        .unwrap_or_else(|| {
                            Rect::new(0.0, -metrics.ascent, advance, metrics.ascent + metrics.descent)
                        });
                        rect = rect.translate(detail.x_offset, detail.y_offset);
                        if is_rtl {
                            rect.x -= advance;
                        }
                        rect.x += x;
                        metrics.bounding_box = metrics.bounding_box.union(&rect);
                        x += direction * advance;
                    }
                }
            }
            if let Some(spacing) = spacing {
                let mut space = spacing[i - start].after;
                if i + 1 < end {
                    space += spacing[i + 1 - start].before;
                }
                x += direction * space;
            }
        }

        if bbox_type == BoundingBoxType::Loose {
            union_range(x, &mut advance_min, &mut advance_max);
            let font_box = Rect::new(
                advance_min,
                -metrics.ascent,
                advance_max - advance_min,
                metrics.ascent + metrics.descent,
            );
            metrics.bounding_box = metrics.bounding_box.union(&font_box);
        }
        if is_rtl {
            metrics.bounding_box.x -= x;
        }
        metrics.advance_width = x * direction;
        metrics
    }

    /// Draw `run[start..end]`, which must be shaped entirely with this
    /// font, starting at `pt` (app units). `pt.x` advances past the drawn
    /// range. If the target rejects the font nothing is drawn.
    pub fn draw(
        &self,
        run: &TextRun,
        start: usize,
        end: usize,
        target: &mut dyn DrawTarget,
        to_path: bool,
        pt: &mut Point,
        spacing: Option<&[Spacing]>,
    ) {
        if start >= end {
            return;
        }

        let app_units = run.app_units_per_dev_unit() as f64;
        let dev_per_app = 1.0 / app_units;
        let is_rtl = run.is_rtl();
        let direction = run.direction();
        // Double-strike offset, in the run's direction.
        let syn_bold_offset = direction * self.synthetic_bold_offset * app_units;
        let mut x = pt.x;
        let y = pt.y;

        if !target.set_font(self) {
            return;
        }

        let mut buffer = GlyphBuffer::new();
        if let Some(spacing) = spacing {
            x += direction * spacing[0].before;
        }
        for i in start..end {
            let glyph_data = run.glyphs()[i];
            match glyph_data.data() {
                GlyphData::Simple { glyph_id, advance } => {
                    let advance = f64::from(advance);
                    let glyph_x;
                    if is_rtl {
                        x -= advance;
                        glyph_x = x;
                    } else {
                        glyph_x = x;
                        x += advance;
                    }
                    buffer.push(GlyphPlacement {
                        glyph_id,
                        x: glyph_x * dev_per_app,
                        y: y * dev_per_app,
                    });
                    if self.synthetic_bold_offset != 0.0 {
                        buffer.push(GlyphPlacement {
                            glyph_id,
                            x: (glyph_x + syn_bold_offset) * dev_per_app,
                            y: y * dev_per_app,
                        });
                    }
                    buffer.flush(target, to_path, is_rtl, false);
                }
                GlyphData::Complex { .. } | GlyphData::Missing { .. } => {
                    let details = run.detailed_glyphs(i);
                    for detail in &details[..glyph_data.glyph_count()] {
                        let advance = f64::from(detail.advance);
                        if glyph_data.is_missing() {
                            // Missing characters are drawn as a hex box,
                            // never added to a path.
                            if !to_path {
                                let mut glyph_x = x;
                                if is_rtl {
                                    glyph_x -= advance;
                                }
                                let height = self.metrics.ascent;
                                let rect = Rect::new(
                                    glyph_x * dev_per_app,
                                    y * dev_per_app - height,
                                    advance * dev_per_app,
                                    height,
                                );
                                let ch = char::from_u32(detail.glyph_id).unwrap_or('\u{FFFD}');
                                target.draw_missing_glyph(rect, ch);
                            }
                        } else {
                            let mut glyph_x = x + detail.x_offset;
                            if is_rtl {
                                glyph_x -= advance;
                            }
                            buffer.push(GlyphPlacement {
                                glyph_id: detail.glyph_id,
                                x: glyph_x * dev_per_app,
                                y: (y + detail.y_offset) * dev_per_app,
                            });
                            if self.synthetic_bold_offset != 0.0 {
                                buffer.push(GlyphPlacement {
                                    glyph_id: detail.glyph_id,
                                    x: (glyph_x + syn_bold_offset) * dev_per_app,
                                    y: (y + detail.y_offset) * dev_per_app,
                                });
                            }
                            buffer.flush(target, to_path, is_rtl, false);
                        }
                        x += direction * advance;
                    }
                }
            }
            if let Some(spacing) = spacing {
                let mut space = spacing[i - start].after;
                if i + 1 < end {
                    space += spacing[i + 1 - start].before;
                }
                x += direction * space;
            }
        }
        buffer.flush(target, to_path, is_rtl, true);
        pt.x = x;
    }
}

fn union_range(x: f64, min: &mut f64, max: &mut f64) {
    *min = min.min(x);
    *max = max.max(x);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extents::INVALID_WIDTH;
    use crate::mock::{MockFontEntry, RecordingTarget};
    use crate::style::{FontSlant, FontStyle};

    #[test]
    fn sanitize_zeroes_metrics_for_zero_size() {
        let mut metrics = FontMetrics {
            ascent: 12.0,
            descent: 3.0,
            ..FontMetrics::default()
        };
        metrics.sanitize(0.0);
        assert_eq!(metrics, FontMetrics::default());
    }

    #[test]
    fn synthetic_bold_only_when_face_is_not_bold() {
        let style = FontStyle::new(FontSlant::Normal, 700, 0, 16.0, "x-western");
        let plain = Font::new(MockFontEntry::new("Mock").arc(), style.clone());
        assert!(plain.has_synthetic_bold());
        let bold = Font::new(MockFontEntry::new("Mock Bold").bold().arc(), style);
        assert!(!bold.has_synthetic_bold());
        let regular = Font::new(MockFontEntry::new("Mock").arc(), FontStyle::default());
        assert!(!regular.has_synthetic_bold());
    }

    #[test]
    fn extents_cache_is_per_scale_and_seeds_space() {
        let font = Font::new(MockFontEntry::new("Mock").arc(), FontStyle::default());
        let a = font.get_or_create_glyph_extents(60);
        let b = font.get_or_create_glyph_extents(60);
        assert!(Arc::ptr_eq(&a, &b));
        let c = font.get_or_create_glyph_extents(120);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.contained_width(font.space_glyph()), 0);
    }

    #[test]
    fn contained_ink_is_cached_as_a_width() {
        let font = Font::new(MockFontEntry::new("Mock").arc(), FontStyle::default());
        let mut target = RecordingTarget::new();
        let extents = font.get_or_create_glyph_extents(60);
        font.setup_glyph_extents(&mut target, 'a' as u32, false, &extents);
        assert!(extents.is_glyph_known('a' as u32));
        assert!(!extents.is_glyph_known_with_tight_extents('a' as u32));
        // ceil of x_most 0.5 * 16.0 in app units.
        assert_eq!(extents.contained_width('a' as u32), 480);
    }

    #[test]
    fn overflowing_ink_is_promoted_to_the_tight_table() {
        let font = Font::new(
            MockFontEntry::new("Mock").with_overflowing_ink().arc(),
            FontStyle::default(),
        );
        let mut target = RecordingTarget::new();
        let extents = font.get_or_create_glyph_extents(60);
        font.setup_glyph_extents(&mut target, 'a' as u32, false, &extents);
        // Negative bearing and ink past the ascent box disqualify the
        // contained-width fast path even without a tight request.
        assert!(extents.is_glyph_known_with_tight_extents('a' as u32));
        assert_eq!(extents.contained_width('a' as u32), INVALID_WIDTH);
        let tight = extents.tight_extents(&font, None, 'a' as u32).unwrap();
        assert_eq!(tight.x, -0.1 * 16.0 * 60.0);
        assert_eq!(tight.y, -0.9 * 16.0 * 60.0);
    }

    #[test]
    fn tight_request_skips_the_contained_table() {
        let font = Font::new(MockFontEntry::new("Mock").arc(), FontStyle::default());
        let mut target = RecordingTarget::new();
        let extents = font.get_or_create_glyph_extents(60);
        font.setup_glyph_extents(&mut target, 'a' as u32, true, &extents);
        assert!(extents.is_glyph_known_with_tight_extents('a' as u32));
        assert_eq!(extents.contained_width('a' as u32), INVALID_WIDTH);
    }

    #[test]
    fn combine_with_places_boxes_side_by_side() {
        let mut left = RunMetrics {
            advance_width: 100.0,
            ascent: 10.0,
            descent: 2.0,
            bounding_box: Rect::new(0.0, -10.0, 100.0, 12.0),
        };
        let right = RunMetrics {
            advance_width: 50.0,
            ascent: 8.0,
            descent: 4.0,
            bounding_box: Rect::new(0.0, -8.0, 60.0, 12.0),
        };
        left.combine_with(&right, false);
        assert_eq!(left.advance_width, 150.0);
        assert_eq!(left.ascent, 10.0);
        assert_eq!(left.descent, 4.0);
        assert_eq!(left.bounding_box.x_most(), 160.0);
    }
}
