//! Immutable-text shaped runs: glyph storage, glyph-run bookkeeping,
//! drawing, measuring and line breaking.
//!
//! A `TextRun` stores one [`CompressedGlyph`] per character, a sparse
//! side table of [`DetailedGlyph`]s, and a sorted list of font runs that
//! tile the text. Ranges handed to draw/measure may start or end inside
//! a ligature; those edges are rendered by drawing the whole ligature
//! clipped to the part's share of its advance.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::font::{BoundingBoxType, Font, RunMetrics};
use crate::geom::{Point, Rect};
use crate::glyph::{CompressedGlyph, DetailedGlyph, GlyphData};
use crate::style::FontSlant;
use crate::surface::{DrawTarget, PropertyProvider, Spacing};
use crate::unicode::missing_glyph_min_width;

/// Spacing and hyphenation are fetched from the provider in chunks of
/// this many characters.
const MEASUREMENT_BUFFER_SIZE: usize = 100;

/// Behavior flags fixed at run creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub is_rtl: bool,
    /// Provider spacing is applied around each character.
    pub enable_spacing: bool,
    /// Provider hyphenation breaks are considered by line breaking.
    pub enable_hyphen_breaks: bool,
    /// Measurement must produce precise ink bounding boxes.
    pub need_bounding_box: bool,
}

/// One font run: `font` renders characters from `character_offset` up to
/// the next run's offset.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub font: Arc<Font>,
    pub character_offset: usize,
}

/// Kind of break chosen by [`TextRun::break_and_measure_text`]. Ordered:
/// an earlier variant never overrides a later one within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    NoBreak,
    WordWrap,
    Normal,
}

/// Result of [`TextRun::break_and_measure_text`].
#[derive(Debug)]
pub struct BreakAndMeasureResult {
    pub chars_fit: usize,
    pub used_hyphenation: bool,
    /// Last break opportunity inside the fitted text when everything fit,
    /// as an offset from the range start.
    pub last_break: Option<usize>,
    /// Advance of the trailing trimmable spaces, excluded from the fit
    /// comparison and from `metrics`.
    pub trimmed_advance: f64,
    pub metrics: RunMetrics,
}

/// Extent and apportionment of the ligature group around a partial range.
#[derive(Debug, Clone, Copy)]
struct LigatureData {
    ligature_start: usize,
    ligature_end: usize,
    /// Advance of the clusters before the part, in app units.
    part_advance: f64,
    /// The part's share of the ligature advance, in app units.
    part_width: f64,
    clip_before_part: bool,
    clip_after_part: bool,
}

pub struct GlyphRunSegment<'a> {
    pub font: &'a Arc<Font>,
    pub start: usize,
    pub end: usize,
}

/// Walks the glyph runs overlapping a character range, yielding each
/// run's font with the range clamped to the run.
pub struct GlyphRunIterator<'a> {
    run: &'a TextRun,
    start: usize,
    end: usize,
    next_index: usize,
}

impl<'a> Iterator for GlyphRunIterator<'a> {
    type Item = GlyphRunSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let glyph_run = self.run.glyph_runs.get(self.next_index)?;
        if glyph_run.character_offset >= self.end {
            return None;
        }
        let start = self.start.max(glyph_run.character_offset);
        let last = self
            .run
            .glyph_runs
            .get(self.next_index + 1)
            .map(|r| r.character_offset)
            .unwrap_or(self.run.len());
        let end = self.end.min(last);
        self.next_index += 1;
        Some(GlyphRunSegment {
            font: &glyph_run.font,
            start,
            end,
        })
    }
}

pub struct TextRun {
    text: Arc<[char]>,
    glyphs: Vec<CompressedGlyph>,
    detailed: Vec<Option<Box<[DetailedGlyph]>>>,
    glyph_runs: Vec<GlyphRun>,
    app_units_per_dev_unit: i32,
    flags: RunFlags,
    /// User-font-set generation this run was shaped against; a mismatch
    /// with the owning group means the run is stale.
    user_font_generation: u64,
}

impl TextRun {
    pub fn new(
        text: Arc<[char]>,
        app_units_per_dev_unit: i32,
        flags: RunFlags,
        user_font_generation: u64,
    ) -> Self {
        debug_assert!(app_units_per_dev_unit > 0, "invalid app unit scale");
        let len = text.len();
        TextRun {
            text,
            glyphs: vec![CompressedGlyph::default(); len],
            detailed: vec![None; len],
            glyph_runs: Vec::new(),
            app_units_per_dev_unit,
            flags,
            user_font_generation,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &Arc<[char]> {
        &self.text
    }

    pub fn get_char(&self, index: usize) -> char {
        self.text[index]
    }

    pub fn app_units_per_dev_unit(&self) -> i32 {
        self.app_units_per_dev_unit
    }

    pub fn flags(&self) -> RunFlags {
        self.flags
    }

    pub fn is_rtl(&self) -> bool {
        self.flags.is_rtl
    }

    pub fn direction(&self) -> f64 {
        if self.flags.is_rtl { -1.0 } else { 1.0 }
    }

    pub fn needs_bounding_box(&self) -> bool {
        self.flags.need_bounding_box
    }

    pub fn user_font_generation(&self) -> u64 {
        self.user_font_generation
    }

    pub fn glyphs(&self) -> &[CompressedGlyph] {
        &self.glyphs
    }

    pub fn has_detailed_glyphs(&self) -> bool {
        self.detailed.iter().any(|d| d.is_some())
    }

    pub fn detailed_glyphs(&self, index: usize) -> &[DetailedGlyph] {
        self.detailed[index].as_deref().unwrap_or(&[])
    }

    pub fn is_cluster_start(&self, index: usize) -> bool {
        self.glyphs[index].is_cluster_start()
    }

    pub fn glyph_runs(&self) -> &[GlyphRun] {
        &self.glyph_runs
    }

    pub fn iter_runs(&self, start: usize, end: usize) -> GlyphRunIterator<'_> {
        GlyphRunIterator {
            run: self,
            start,
            end,
            next_index: self.find_first_glyph_run_containing(start),
        }
    }

    /// Index of the glyph run containing `offset` (`glyph_runs.len()` for
    /// the end-of-text offset).
    pub fn find_first_glyph_run_containing(&self, offset: usize) -> usize {
        debug_assert!(offset <= self.len(), "bad offset looking for glyph run");
        if offset == self.len() || self.glyph_runs.is_empty() {
            return self.glyph_runs.len();
        }
        let mut start = 0;
        let mut end = self.glyph_runs.len();
        while end - start > 1 {
            let mid = (start + end) / 2;
            if self.glyph_runs[mid].character_offset <= offset {
                start = mid;
            } else {
                end = mid;
            }
        }
        debug_assert!(self.glyph_runs[start].character_offset <= offset);
        start
    }

    /// Append a glyph run starting at `character_offset`. Adjacent runs
    /// with the same font coalesce; a second run at the same offset
    /// replaces the first, unless a new run is forced.
    pub fn add_glyph_run(&mut self, font: Arc<Font>, character_offset: usize, force_new: bool) {
        if !force_new {
            if let Some(last) = self.glyph_runs.last_mut() {
                debug_assert!(
                    last.character_offset <= character_offset,
                    "glyph runs out of order (and run not forced)"
                );
                if Arc::ptr_eq(&last.font, &font) {
                    return;
                }
                if last.character_offset == character_offset {
                    last.font = font;
                    return;
                }
            } else {
                debug_assert!(
                    character_offset == 0,
                    "first run doesn't cover the first character (and run not forced)"
                );
            }
        }
        self.glyph_runs.push(GlyphRun {
            font,
            character_offset,
        });
    }

    /// Restore offset order after out-of-order shaping, coalescing
    /// adjacent runs that ended up with the same font.
    pub fn sort_glyph_runs(&mut self) {
        if self.glyph_runs.len() <= 1 {
            return;
        }
        self.glyph_runs
            .sort_by_key(|glyph_run| glyph_run.character_offset);
        let mut sorted: Vec<GlyphRun> = Vec::with_capacity(self.glyph_runs.len());
        for glyph_run in self.glyph_runs.drain(..) {
            match sorted.last() {
                Some(prev) if Arc::ptr_eq(&prev.font, &glyph_run.font) => {}
                _ => sorted.push(glyph_run),
            }
        }
        self.glyph_runs = sorted;
    }

    /// Advance any glyph run that starts on a ligature continuation to
    /// the first real character, so a partial ligature is never drawn
    /// with the wrong font. Runs emptied by this are dropped.
    pub fn sanitize_glyph_runs(&mut self) {
        if self.glyph_runs.len() <= 1 {
            return;
        }
        let char_count = self.len();
        let mut i = self.glyph_runs.len();
        while i > 0 {
            i -= 1;
            let next_offset = self
                .glyph_runs
                .get(i + 1)
                .map(|r| r.character_offset)
                .unwrap_or(char_count);
            let run = &mut self.glyph_runs[i];
            while run.character_offset < char_count
                && self.glyphs[run.character_offset].is_ligature_continuation()
            {
                run.character_offset += 1;
            }
            if run.character_offset >= next_offset {
                self.glyph_runs.remove(i);
            }
        }
    }

    /// Store a simple glyph, replacing whatever was at `index`.
    pub fn set_simple_glyph(&mut self, index: usize, advance: i32, glyph_id: u32) {
        self.detailed[index] = None;
        self.glyphs[index].set_simple(advance, glyph_id);
    }

    /// Store a non-simple glyph record with its side-table entries.
    /// `glyph.glyph_count()` must equal `details.len()`.
    pub fn set_glyphs(&mut self, index: usize, glyph: CompressedGlyph, details: &[DetailedGlyph]) {
        debug_assert!(!glyph.is_simple(), "simple glyphs not handled here");
        debug_assert_eq!(glyph.glyph_count(), details.len());
        debug_assert!(
            index > 0 || (glyph.is_cluster_start() && glyph.is_ligature_group_start()),
            "first character must start a cluster and a ligature group"
        );
        self.detailed[index] = if details.is_empty() {
            None
        } else {
            Some(details.into())
        };
        let can_break = self.glyphs[index].can_break_before();
        self.glyphs[index] = glyph;
        self.glyphs[index].set_can_break_before(can_break);
    }

    /// Record that no font can render the character at `index`. The
    /// synthesized entry keeps the code point (for the hex box) and gets
    /// an advance wide enough to show it: the font's average character
    /// width, but never narrower than the box itself.
    pub fn set_missing_glyph(&mut self, index: usize, ch: char) {
        let run_index = self.find_first_glyph_run_containing(index);
        // With no glyph run recorded yet there is no average width to
        // consult; the box minimum stands alone.
        let width = match self.glyph_runs.get(run_index) {
            Some(glyph_run) => glyph_run
                .font
                .metrics()
                .ave_char_width
                .max(missing_glyph_min_width(ch as u32)),
            None => missing_glyph_min_width(ch as u32),
        };
        let advance = (width * self.app_units_per_dev_unit as f64) as i32;
        self.detailed[index] = Some(Box::new([DetailedGlyph {
            glyph_id: ch as u32,
            advance,
            x_offset: 0.0,
            y_offset: 0.0,
        }]));
        self.glyphs[index].set_missing(1);
    }

    /// Zero-width invisible entry for characters that must not render
    /// (control characters and the like).
    pub fn set_blank_glyph(&mut self, index: usize) {
        self.detailed[index] = None;
        self.glyphs[index].set_missing(0);
    }

    /// Try to record a space at `index` without shaping: the font's space
    /// glyph with the metric space width. Returns false when the space
    /// doesn't fit the simple encoding and must be shaped instead.
    pub fn set_space_glyph(&mut self, font: &Arc<Font>, index: usize) -> bool {
        let space_glyph = font.space_glyph();
        let advance =
            (font.metrics().space_width * self.app_units_per_dev_unit as f64).round() as i32;
        if space_glyph == 0
            || !CompressedGlyph::is_simple_glyph_id(space_glyph)
            || !CompressedGlyph::is_simple_advance(advance)
        {
            return false;
        }
        self.add_glyph_run(Arc::clone(font), index, false);
        self.set_simple_glyph(index, advance, space_glyph);
        true
    }

    /// Apply UAX-14 style break-before flags. Breaks proposed inside a
    /// cluster are rejected; the shaper's clusters win. Returns whether
    /// any flag changed.
    pub fn set_potential_line_breaks(&mut self, start: usize, break_before: &[bool]) -> bool {
        debug_assert!(start + break_before.len() <= self.len());
        let mut changed = false;
        for (i, &can_break) in break_before.iter().enumerate() {
            let mut can_break = can_break;
            if can_break && !self.glyphs[start + i].is_cluster_start() {
                log::warn!("line break suggested inside cluster at {}", start + i);
                can_break = false;
            }
            changed |= self.glyphs[start + i].set_can_break_before(can_break);
        }
        changed
    }

    pub fn count_missing_glyphs(&self) -> usize {
        self.glyphs.iter().filter(|g| g.is_missing()).count()
    }

    fn advance_for_glyphs(&self, start: usize, end: usize) -> i32 {
        let mut advance = 0;
        for i in start..end {
            let glyph = &self.glyphs[i];
            match glyph.data() {
                GlyphData::Simple { advance: a, .. } => advance += a,
                _ => {
                    for detail in &self.detailed_glyphs(i)[..glyph.glyph_count()] {
                        advance += detail.advance;
                    }
                }
            }
        }
        advance
    }

    fn compute_ligature_data(
        &self,
        part_start: usize,
        part_end: usize,
        provider: Option<&dyn PropertyProvider>,
    ) -> LigatureData {
        debug_assert!(part_start < part_end, "empty ligature part");
        debug_assert!(part_end <= self.len());

        let mut i = part_start;
        while !self.glyphs[i].is_ligature_group_start() {
            debug_assert!(i > 0, "ligature at the start of the run");
            i -= 1;
        }
        let ligature_start = i;
        let mut i = part_start + 1;
        while i < self.len() && !self.glyphs[i].is_ligature_group_start() {
            i += 1;
        }
        let ligature_end = i;

        let ligature_width = self.advance_for_glyphs(ligature_start, ligature_end) as f64;
        // The first character of the ligature counts as a cluster start
        // for the purpose of dividing up the ligature advance.
        let mut total_cluster_count = 0usize;
        let mut part_cluster_index = 0usize;
        let mut part_cluster_count = 0usize;
        for i in ligature_start..ligature_end {
            if i == ligature_start || self.glyphs[i].is_cluster_start() {
                total_cluster_count += 1;
                if i < part_start {
                    part_cluster_index += 1;
                } else if i < part_end {
                    part_cluster_count += 1;
                }
            }
        }
        debug_assert!(total_cluster_count > 0, "ligature involving no clusters");
        let mut part_width =
            ligature_width * part_cluster_count as f64 / total_cluster_count as f64;
        let part_advance =
            ligature_width * part_cluster_index as f64 / total_cluster_count as f64;

        let (clip_before_part, clip_after_part) = if part_cluster_count == 0 {
            // Nothing to draw; clip the slice away entirely.
            (true, true)
        } else {
            (
                part_cluster_index > 0,
                part_cluster_index + part_cluster_count < total_cluster_count,
            )
        };

        if let Some(provider) = provider.filter(|_| self.flags.enable_spacing) {
            let mut spacing = [Spacing::default(); 1];
            if part_start == ligature_start {
                provider.spacing(part_start, &mut spacing);
                part_width += spacing[0].before;
            }
            if part_end == ligature_end {
                provider.spacing(part_end - 1, &mut spacing);
                part_width += spacing[0].after;
            }
        }

        LigatureData {
            ligature_start,
            ligature_end,
            part_advance,
            part_width,
            clip_before_part,
            clip_after_part,
        }
    }

    fn compute_partial_ligature_width(
        &self,
        part_start: usize,
        part_end: usize,
        provider: Option<&dyn PropertyProvider>,
    ) -> f64 {
        if part_start >= part_end {
            return 0.0;
        }
        self.compute_ligature_data(part_start, part_end, provider)
            .part_width
    }

    /// Move `start` forward and `end` backward to ligature group starts.
    pub fn shrink_to_ligature_boundaries(&self, start: &mut usize, end: &mut usize) {
        if *start >= *end {
            return;
        }
        while *start < *end && !self.glyphs[*start].is_ligature_group_start() {
            *start += 1;
        }
        if *end < self.len() {
            while *end > *start && !self.glyphs[*end].is_ligature_group_start() {
                *end -= 1;
            }
        }
    }

    /// Spacing for `[start, end)`, zeroed outside `[spacing_start,
    /// spacing_end)`. None when spacing is disabled or no provider.
    fn adjusted_spacing(
        &self,
        start: usize,
        end: usize,
        provider: Option<&dyn PropertyProvider>,
        spacing_start: usize,
        spacing_end: usize,
    ) -> Option<Vec<Spacing>> {
        let provider = provider.filter(|_| self.flags.enable_spacing)?;
        let mut spacing = vec![Spacing::default(); end - start];
        if spacing_start < spacing_end {
            provider.spacing(
                spacing_start,
                &mut spacing[spacing_start - start..spacing_end - start],
            );
        }
        Some(spacing)
    }

    fn draw_glyphs(
        &self,
        font: &Font,
        target: &mut dyn DrawTarget,
        to_path: bool,
        pt: &mut Point,
        start: usize,
        end: usize,
        provider: Option<&dyn PropertyProvider>,
        spacing_start: usize,
        spacing_end: usize,
    ) {
        let spacing = self.adjusted_spacing(start, end, provider, spacing_start, spacing_end);
        font.draw(self, start, end, target, to_path, pt, spacing.as_deref());
    }

    /// Clamp the dirty interval `[left, right]` to the part's slice of
    /// its ligature, given the part's origin x.
    fn clip_partial_ligature(
        &self,
        left: &mut f64,
        right: &mut f64,
        x_origin: f64,
        ligature: &LigatureData,
    ) {
        if ligature.clip_before_part {
            if self.is_rtl() {
                *right = right.min(x_origin);
            } else {
                *left = left.max(x_origin);
            }
        }
        if ligature.clip_after_part {
            let end_edge = x_origin + self.direction() * ligature.part_width;
            if self.is_rtl() {
                *left = left.max(end_edge);
            } else {
                *right = right.min(end_edge);
            }
        }
    }

    fn draw_partial_ligature(
        &self,
        font: &Font,
        target: &mut dyn DrawTarget,
        start: usize,
        end: usize,
        dirty_rect: Option<&Rect>,
        pt: &mut Point,
        provider: Option<&dyn PropertyProvider>,
    ) {
        if start >= end {
            return;
        }
        let Some(dirty_rect) = dirty_rect else {
            log::error!("cannot draw partial ligatures without a dirty rect");
            return;
        };

        // Draw the whole ligature, clipped to this part's slice of it.
        let data = self.compute_ligature_data(start, end, provider);
        let mut left = dirty_rect.x;
        let mut right = dirty_rect.x_most();
        self.clip_partial_ligature(&mut left, &mut right, pt.x, &data);

        let app_units = self.app_units_per_dev_unit as f64;
        target.save();
        // Division by the scale keeps rects aligned on whole app-unit
        // multiples clipping on true device unit boundaries.
        target.clip_rect(Rect::new(
            left / app_units,
            dirty_rect.y / app_units,
            (right - left) / app_units,
            dirty_rect.height / app_units,
        ));
        let direction = self.direction();
        let mut ligature_pt = Point::new(pt.x - direction * data.part_advance, pt.y);
        self.draw_glyphs(
            font,
            target,
            false,
            &mut ligature_pt,
            data.ligature_start,
            data.ligature_end,
            provider,
            start,
            end,
        );
        target.restore();

        pt.x += direction * data.part_width;
    }

    fn range_has_synthetic_bold(&self, start: usize, end: usize) -> bool {
        self.iter_runs(start, end)
            .any(|segment| segment.font.has_synthetic_bold())
    }

    /// Draw `[start, start + length)` at `pt` (app units). Returns the
    /// advance of the drawn range.
    ///
    /// When the target's color has partial alpha and any font in range
    /// draws a synthetic-bold double strike, the text is first composited
    /// opaquely into an offscreen group and the group painted with the
    /// color's alpha, so overlapping strikes don't darken.
    pub fn draw(
        &self,
        target: &mut dyn DrawTarget,
        pt: Point,
        start: usize,
        length: usize,
        dirty_rect: Option<&Rect>,
        provider: Option<&dyn PropertyProvider>,
    ) -> f64 {
        debug_assert!(start + length <= self.len(), "substring out of range");

        let direction = self.direction();
        let mut pt = pt;
        let origin_x = pt.x;
        let app_units = self.app_units_per_dev_unit as f64;

        let color = target.current_color();
        let buffer_alpha = color.a > 0.0
            && color.a < 1.0
            && self.range_has_synthetic_bold(start, start + length);
        if buffer_alpha {
            let metrics = self.measure_text(
                start,
                length,
                BoundingBoxType::Loose,
                Some(target),
                provider,
            );
            let bounds = metrics.bounding_box.translate(pt.x, pt.y);
            target.save();
            target.clip_rect(bounds.scale(1.0 / app_units));
            target.set_color(color.opaque());
            target.push_group();
        }

        for segment in self.iter_runs(start, start + length) {
            let font = segment.font;
            let mut ligature_start = segment.start;
            let mut ligature_end = segment.end;
            self.shrink_to_ligature_boundaries(&mut ligature_start, &mut ligature_end);

            self.draw_partial_ligature(
                font,
                target,
                segment.start,
                ligature_start,
                dirty_rect,
                &mut pt,
                provider,
            );
            self.draw_glyphs(
                font,
                target,
                false,
                &mut pt,
                ligature_start,
                ligature_end,
                provider,
                ligature_start,
                ligature_end,
            );
            self.draw_partial_ligature(
                font,
                target,
                ligature_end,
                segment.end,
                dirty_rect,
                &mut pt,
                provider,
            );
        }

        if buffer_alpha {
            target.pop_group_with_alpha(color.a);
            target.restore();
        }

        (pt.x - origin_x) * direction
    }

    /// Append the range's glyph outlines to the target's current path.
    /// The range must fall on ligature boundaries. Returns the advance.
    pub fn draw_to_path(
        &self,
        target: &mut dyn DrawTarget,
        pt: Point,
        start: usize,
        length: usize,
        provider: Option<&dyn PropertyProvider>,
    ) -> f64 {
        debug_assert!(start + length <= self.len(), "substring out of range");

        let direction = self.direction();
        let mut pt = pt;
        let origin_x = pt.x;

        for segment in self.iter_runs(start, start + length) {
            let mut ligature_start = segment.start;
            let mut ligature_end = segment.end;
            self.shrink_to_ligature_boundaries(&mut ligature_start, &mut ligature_end);
            debug_assert!(
                ligature_start == segment.start,
                "can't draw path starting inside ligature"
            );
            debug_assert!(
                ligature_end == segment.end,
                "can't end drawing path inside ligature"
            );
            self.draw_glyphs(
                segment.font,
                target,
                true,
                &mut pt,
                ligature_start,
                ligature_end,
                provider,
                ligature_start,
                ligature_end,
            );
        }

        (pt.x - origin_x) * direction
    }

    fn accumulate_metrics_for_run(
        &self,
        font: &Font,
        start: usize,
        end: usize,
        bbox_type: BoundingBoxType,
        target: Option<&mut (dyn DrawTarget + '_)>,
        provider: Option<&dyn PropertyProvider>,
        spacing_start: usize,
        spacing_end: usize,
        accumulated: &mut RunMetrics,
    ) {
        let spacing = self.adjusted_spacing(start, end, provider, spacing_start, spacing_end);
        let metrics = font.measure(self, start, end, bbox_type, target, spacing.as_deref());
        accumulated.combine_with(&metrics, self.is_rtl());
    }

    fn accumulate_partial_ligature_metrics(
        &self,
        font: &Font,
        start: usize,
        end: usize,
        bbox_type: BoundingBoxType,
        target: Option<&mut (dyn DrawTarget + '_)>,
        provider: Option<&dyn PropertyProvider>,
        accumulated: &mut RunMetrics,
    ) {
        if start >= end {
            return;
        }

        // Measure the whole ligature, then clip the bounding box to the
        // part, mirroring how drawing clips it.
        let data = self.compute_ligature_data(start, end, provider);
        let mut metrics = RunMetrics::default();
        self.accumulate_metrics_for_run(
            font,
            data.ligature_start,
            data.ligature_end,
            bbox_type,
            target,
            provider,
            start,
            end,
            &mut metrics,
        );

        let mut bbox_left = metrics.bounding_box.x;
        let mut bbox_right = metrics.bounding_box.x_most();
        // Where this part's drawing origin sits relative to the left
        // baseline origin of the whole ligature.
        let origin = if self.is_rtl() {
            metrics.advance_width - data.part_advance
        } else {
            0.0
        };
        self.clip_partial_ligature(&mut bbox_left, &mut bbox_right, origin, &data);
        metrics.bounding_box.x = bbox_left;
        metrics.bounding_box.width = bbox_right - bbox_left;

        // Shift from ligature-relative to part-relative coordinates.
        metrics.bounding_box.x -= if self.is_rtl() {
            metrics.advance_width - (data.part_advance + data.part_width)
        } else {
            data.part_advance
        };
        metrics.advance_width = data.part_width;

        accumulated.combine_with(&metrics, self.is_rtl());
    }

    pub fn measure_text(
        &self,
        start: usize,
        length: usize,
        bbox_type: BoundingBoxType,
        mut target: Option<&mut (dyn DrawTarget + '_)>,
        provider: Option<&dyn PropertyProvider>,
    ) -> RunMetrics {
        debug_assert!(start + length <= self.len(), "substring out of range");

        let mut accumulated = RunMetrics::default();
        for segment in self.iter_runs(start, start + length) {
            let font = segment.font;
            let mut ligature_start = segment.start;
            let mut ligature_end = segment.end;
            self.shrink_to_ligature_boundaries(&mut ligature_start, &mut ligature_end);

            self.accumulate_partial_ligature_metrics(
                font,
                segment.start,
                ligature_start,
                bbox_type,
                target.as_deref_mut(),
                provider,
                &mut accumulated,
            );
            self.accumulate_metrics_for_run(
                font,
                ligature_start,
                ligature_end,
                bbox_type,
                target.as_deref_mut(),
                provider,
                ligature_start,
                ligature_end,
                &mut accumulated,
            );
            self.accumulate_partial_ligature_metrics(
                font,
                ligature_end,
                segment.end,
                bbox_type,
                target.as_deref_mut(),
                provider,
                &mut accumulated,
            );
        }
        accumulated
    }

    /// Fit as many characters as possible into `available_width` app
    /// units, breaking at break-before flags, hyphenation points, or (at
    /// `WordWrap` priority) anywhere.
    ///
    /// Trailing spaces are trimmable when `trim_whitespace` is set: they
    /// don't count against the width and are excluded from the returned
    /// metrics. With `suppress_initial_break` there is no break
    /// opportunity at the very start, guaranteeing forward progress even
    /// when nothing fits.
    #[allow(clippy::too_many_arguments)]
    pub fn break_and_measure_text(
        &self,
        start: usize,
        max_length: usize,
        available_width: f64,
        provider: Option<&dyn PropertyProvider>,
        suppress_initial_break: bool,
        trim_whitespace: bool,
        bbox_type: BoundingBoxType,
        target: Option<&mut (dyn DrawTarget + '_)>,
        can_word_wrap: bool,
        break_priority: &mut BreakPriority,
    ) -> BreakAndMeasureResult {
        let max_length = max_length.min(self.len() - start);
        let end = start + max_length;

        let mut buffer_start = start;
        let mut buffer_length = max_length.min(MEASUREMENT_BUFFER_SIZE);
        let mut spacing_buffer = [Spacing::default(); MEASUREMENT_BUFFER_SIZE];
        let have_spacing = provider.is_some() && self.flags.enable_spacing;
        let mut hyphen_buffer = [false; MEASUREMENT_BUFFER_SIZE];
        let have_hyphenation = provider.is_some() && self.flags.enable_hyphen_breaks;
        if let Some(provider) = provider {
            if have_spacing {
                provider.spacing(buffer_start, &mut spacing_buffer[..buffer_length]);
            }
            if have_hyphenation {
                provider.hyphenation_breaks(buffer_start, &mut hyphen_buffer[..buffer_length]);
            }
        }

        let mut width = 0.0f64;
        let mut advance = 0.0f64;
        let mut trimmable_chars = 0usize;
        let mut trimmable_advance = 0.0f64;
        let mut last_break: Option<usize> = None;
        let mut last_break_trimmable_chars = 0usize;
        let mut last_break_trimmable_advance = 0.0f64;
        let mut last_break_used_hyphenation = false;
        let mut aborted = false;

        let mut ligature_run_start = start;
        let mut ligature_run_end = end;
        self.shrink_to_ligature_boundaries(&mut ligature_run_start, &mut ligature_run_end);

        for i in start..end {
            if i >= buffer_start + buffer_length {
                // Fetch more spacing and hyphenation data.
                buffer_start = i;
                buffer_length = (end - i).min(MEASUREMENT_BUFFER_SIZE);
                if let Some(provider) = provider {
                    if have_spacing {
                        provider.spacing(buffer_start, &mut spacing_buffer[..buffer_length]);
                    }
                    if have_hyphenation {
                        provider
                            .hyphenation_breaks(buffer_start, &mut hyphen_buffer[..buffer_length]);
                    }
                }
            }

            // No break opportunity at the very start of the line: if the
            // width is too small for even one character, that opportunity
            // would be taken over and over without progress.
            if !suppress_initial_break || i > start {
                let line_break_here = self.glyphs[i].can_break_before();
                let hyphenation = have_hyphenation && hyphen_buffer[i - buffer_start];
                let word_wrapping = can_word_wrap && *break_priority <= BreakPriority::WordWrap;

                if line_break_here || hyphenation || word_wrapping {
                    let mut hyphenated_advance = advance;
                    if !line_break_here && !word_wrapping {
                        if let Some(provider) = provider {
                            hyphenated_advance += provider.hyphen_width();
                        }
                    }

                    if last_break.is_none()
                        || width + hyphenated_advance - trimmable_advance <= available_width
                    {
                        last_break = Some(i);
                        last_break_trimmable_chars = trimmable_chars;
                        last_break_trimmable_advance = trimmable_advance;
                        last_break_used_hyphenation = !line_break_here && !word_wrapping;
                        *break_priority = if hyphenation || line_break_here {
                            BreakPriority::Normal
                        } else {
                            BreakPriority::WordWrap
                        };
                    }

                    width += advance;
                    advance = 0.0;
                    if width - trimmable_advance > available_width {
                        // No more text fits.
                        aborted = true;
                        break;
                    }
                }
            }

            let char_advance = if i >= ligature_run_start && i < ligature_run_end {
                let mut a = self.advance_for_glyphs(i, i + 1) as f64;
                if have_spacing {
                    let space = &spacing_buffer[i - buffer_start];
                    a += space.before + space.after;
                }
                a
            } else {
                self.compute_partial_ligature_width(i, i + 1, provider)
            };

            advance += char_advance;
            if trim_whitespace {
                if self.get_char(i) == ' ' {
                    trimmable_chars += 1;
                    trimmable_advance += char_advance;
                } else {
                    trimmable_chars = 0;
                    trimmable_advance = 0.0;
                }
            }
        }

        if !aborted {
            width += advance;
        }

        // Three possibilities: everything fit; some text fit up to a
        // break opportunity; nothing fits before the first opportunity
        // (then we overflow rather than return zero characters).
        let chars_fit;
        let mut used_hyphenation = false;
        if width - trimmable_advance <= available_width {
            chars_fit = max_length;
        } else if let Some(break_at) = last_break {
            chars_fit = break_at - start;
            trimmable_chars = last_break_trimmable_chars;
            trimmable_advance = last_break_trimmable_advance;
            used_hyphenation = last_break_used_hyphenation;
        } else {
            chars_fit = max_length;
        }

        let metrics = self.measure_text(
            start,
            chars_fit - trimmable_chars,
            bbox_type,
            target,
            provider,
        );
        let last_break = if chars_fit == max_length {
            last_break.map(|b| b - start)
        } else {
            None
        };

        BreakAndMeasureResult {
            chars_fit,
            used_hyphenation,
            last_break,
            trimmed_advance: trimmable_advance,
            metrics,
        }
    }

    /// Advance of the range in app units, including spacing, with partial
    /// ligatures apportioned.
    pub fn get_advance_width(
        &self,
        start: usize,
        length: usize,
        provider: Option<&dyn PropertyProvider>,
    ) -> f64 {
        debug_assert!(start + length <= self.len(), "substring out of range");

        let mut ligature_run_start = start;
        let mut ligature_run_end = start + length;
        self.shrink_to_ligature_boundaries(&mut ligature_run_start, &mut ligature_run_end);

        let mut result = self.compute_partial_ligature_width(start, ligature_run_start, provider)
            + self.compute_partial_ligature_width(ligature_run_end, start + length, provider);

        // Spacing is accumulated here in one pass rather than glyph by
        // glyph.
        if let Some(spacing) = self.adjusted_spacing(
            ligature_run_start,
            ligature_run_end,
            provider,
            ligature_run_start,
            ligature_run_end,
        ) {
            for space in &spacing {
                result += space.before + space.after;
            }
        }

        result + self.advance_for_glyphs(ligature_run_start, ligature_run_end) as f64
    }

    /// Copy glyph data for `source[start..start + length)` into this run
    /// at `dest`. Break-before flags of the destination are preserved.
    pub fn copy_glyph_data_from(
        &mut self,
        source: &TextRun,
        start: usize,
        length: usize,
        dest: usize,
    ) {
        self.copy_glyph_records(source, start, length, dest);
        for i in 0..length {
            self.detailed[dest + i] = source.detailed[start + i].clone();
        }
        self.copy_glyph_run_structure(source, start, length, dest);
    }

    /// Like [`copy_glyph_data_from`](Self::copy_glyph_data_from) but
    /// moves the detailed side-table entries out of `source`, leaving its
    /// affected characters as zero-advance missing glyphs.
    pub fn steal_glyph_data_from(
        &mut self,
        source: &mut TextRun,
        start: usize,
        length: usize,
        dest: usize,
    ) {
        self.copy_glyph_records(source, start, length, dest);
        for i in 0..length {
            self.detailed[dest + i] = source.detailed[start + i].take();
            source.glyphs[start + i].set_missing(0);
        }
        self.copy_glyph_run_structure(source, start, length, dest);
    }

    fn copy_glyph_records(&mut self, source: &TextRun, start: usize, length: usize, dest: usize) {
        debug_assert!(start + length <= source.len(), "source range out of bounds");
        debug_assert!(dest + length <= self.len(), "dest range out of bounds");
        for i in 0..length {
            let mut glyph = source.glyphs[start + i];
            glyph.set_can_break_before(self.glyphs[dest + i].can_break_before());
            self.glyphs[dest + i] = glyph;
        }
    }

    fn copy_glyph_run_structure(
        &mut self,
        source: &TextRun,
        start: usize,
        length: usize,
        dest: usize,
    ) {
        let segments: Vec<(Arc<Font>, usize)> = source
            .iter_runs(start, start + length)
            .map(|segment| (Arc::clone(segment.font), segment.start))
            .collect();
        for (font, seg_start) in segments {
            debug_assert!(
                source.is_cluster_start(seg_start),
                "started word in the middle of a cluster"
            );
            self.add_glyph_run(font, seg_start - start + dest, false);
        }
    }

    /// A new run over the same text and parameters with this run's glyph
    /// data deep-copied in.
    pub fn clone_run(&self) -> TextRun {
        let mut cloned = TextRun::new(
            Arc::clone(&self.text),
            self.app_units_per_dev_unit,
            self.flags,
            self.user_font_generation,
        );
        cloned.copy_glyph_data_from(self, 0, self.len(), 0);
        cloned
    }

    /// Eagerly populate the extents caches of every font in the run, so
    /// later measurement doesn't need a drawing target.
    pub fn fetch_glyph_extents(&self, target: &mut dyn DrawTarget) {
        let needs_glyph_extents = self.needs_bounding_box()
            || self
                .glyph_runs
                .iter()
                .any(|glyph_run| glyph_run.font.entry().is_user_font());
        if !needs_glyph_extents && !self.has_detailed_glyphs() {
            return;
        }

        for segment in self.iter_runs(0, self.len()) {
            let font = segment.font;
            let extents = font.get_or_create_glyph_extents(self.app_units_per_dev_unit);
            for i in segment.start..segment.end {
                let glyph_data = &self.glyphs[i];
                match glyph_data.data() {
                    GlyphData::Simple { glyph_id, .. } => {
                        // In speed mode simple glyphs keep optimistic
                        // bounds; only quality mode pays for extents here.
                        if needs_glyph_extents && !extents.is_glyph_known(glyph_id) {
                            font.setup_glyph_extents(target, glyph_id, false, &extents);
                        }
                    }
                    GlyphData::Complex { .. } => {
                        for detail in &self.detailed_glyphs(i)[..glyph_data.glyph_count()] {
                            if !extents.is_glyph_known_with_tight_extents(detail.glyph_id) {
                                font.setup_glyph_extents(target, detail.glyph_id, true, &extents);
                            }
                        }
                    }
                    GlyphData::Missing { .. } => {}
                }
            }
        }
    }

    /// Widen advances by each synthetic-bold font's strike offset so
    /// boldened glyphs don't crowd their neighbors. Simple glyphs widen
    /// in place (or spill to the side table when they no longer fit);
    /// complex records widen at the trailing cluster edge.
    pub fn adjust_advances_for_synthetic_bold(&mut self, start: usize, length: usize) {
        let app_units = self.app_units_per_dev_unit as f64;
        let is_rtl = self.is_rtl();

        let segments: Vec<(Arc<Font>, usize, usize)> = self
            .iter_runs(start, start + length)
            .map(|segment| (Arc::clone(segment.font), segment.start, segment.end))
            .collect();
        for (font, seg_start, seg_end) in segments {
            if !font.has_synthetic_bold() {
                continue;
            }
            let offset = (font.synthetic_bold_offset() * app_units) as i32;
            for i in seg_start..seg_end {
                match self.glyphs[i].data() {
                    GlyphData::Simple { glyph_id, advance } => {
                        let advance = advance + offset;
                        if CompressedGlyph::is_simple_advance(advance) {
                            self.glyphs[i].set_simple(advance, glyph_id);
                        } else {
                            let glyph = CompressedGlyph::complex(true, true, 1);
                            self.set_glyphs(
                                i,
                                glyph,
                                &[DetailedGlyph {
                                    glyph_id,
                                    advance,
                                    x_offset: 0.0,
                                    y_offset: 0.0,
                                }],
                            );
                        }
                    }
                    GlyphData::Complex { .. } | GlyphData::Missing { .. } => {
                        let count = self.glyphs[i].glyph_count();
                        if count == 0 {
                            continue;
                        }
                        if let Some(details) = self.detailed[i].as_deref_mut() {
                            if is_rtl {
                                details[0].advance += offset;
                            } else {
                                details[count - 1].advance += offset;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Human-readable summary: the text, then each glyph run as
    /// `offset: name size/weight/slant/lang`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push('"');
        for &ch in self.text.iter() {
            if (' '..='\u{7e}').contains(&ch) {
                out.push(ch);
            } else {
                let _ = write!(out, "\\u{:04x}", ch as u32);
            }
        }
        out.push_str("\" [");
        for (i, glyph_run) in self.glyph_runs.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let style = glyph_run.font.style();
            let slant = match style.slant {
                FontSlant::Normal => "normal",
                FontSlant::Italic => "italic",
                FontSlant::Oblique => "oblique",
            };
            let _ = write!(
                out,
                "{}: {} {}/{}/{}/{}",
                glyph_run.character_offset,
                glyph_run.font.name(),
                style.size,
                style.weight,
                slant,
                style.language
            );
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontEntry;
    use crate::mock::{MockFontEntry, RecordingTarget, TargetOp};
    use crate::style::{FontSlant, FontStyle};

    const APP_UNITS: i32 = 60;

    fn font(name: &str) -> Arc<Font> {
        Arc::new(Font::new(MockFontEntry::new(name).arc(), FontStyle::default()))
    }

    fn run(text: &str) -> TextRun {
        let chars: Arc<[char]> = text.chars().collect();
        TextRun::new(chars, APP_UNITS, RunFlags::default(), 0)
    }

    fn simple_run(text: &str, advance: i32) -> TextRun {
        let mut r = run(text);
        let f = font("Mock");
        r.add_glyph_run(Arc::clone(&f), 0, false);
        for (i, ch) in text.chars().enumerate() {
            r.set_simple_glyph(i, advance, ch as u32);
        }
        r
    }

    // Four characters forming one ligature of three clusters:
    // start + continuation + two cluster starts inside the group.
    fn ligature_run() -> TextRun {
        let mut r = run("affi");
        let f = font("Mock");
        r.add_glyph_run(Arc::clone(&f), 0, false);
        r.set_simple_glyph(0, 600, 'a' as u32);
        r.set_glyphs(
            1,
            CompressedGlyph::complex(true, true, 1),
            &[DetailedGlyph {
                glyph_id: 0xF100,
                advance: 900,
                x_offset: 0.0,
                y_offset: 0.0,
            }],
        );
        r.set_glyphs(2, CompressedGlyph::complex(true, false, 0), &[]);
        r.set_glyphs(3, CompressedGlyph::complex(true, false, 0), &[]);
        r
    }

    #[test]
    fn add_glyph_run_coalesces_and_replaces() {
        let mut r = run("abcd");
        let f1 = font("One");
        let f2 = font("Two");
        r.add_glyph_run(Arc::clone(&f1), 0, false);
        // Same font again: no new run.
        r.add_glyph_run(Arc::clone(&f1), 2, false);
        assert_eq!(r.glyph_runs().len(), 1);
        // Different font at the same offset as an existing run start
        // replaces the font.
        r.add_glyph_run(Arc::clone(&f2), 2, false);
        assert_eq!(r.glyph_runs().len(), 2);
        r.add_glyph_run(Arc::clone(&f1), 2, false);
        assert_eq!(r.glyph_runs().len(), 2);
        assert!(Arc::ptr_eq(&r.glyph_runs()[1].font, &f1));
    }

    #[test]
    fn glyph_runs_tile_the_text() {
        let mut r = run("abcdef");
        let f1 = font("One");
        let f2 = font("Two");
        r.add_glyph_run(Arc::clone(&f1), 0, false);
        r.add_glyph_run(Arc::clone(&f2), 3, false);
        let segments: Vec<(usize, usize)> =
            r.iter_runs(0, r.len()).map(|s| (s.start, s.end)).collect();
        assert_eq!(segments, [(0, 3), (3, 6)]);
        // Partial range clamps to the overlap.
        let segments: Vec<(usize, usize)> =
            r.iter_runs(2, 4).map(|s| (s.start, s.end)).collect();
        assert_eq!(segments, [(2, 3), (3, 4)]);
        assert_eq!(r.find_first_glyph_run_containing(2), 0);
        assert_eq!(r.find_first_glyph_run_containing(3), 1);
    }

    #[test]
    fn sanitize_advances_runs_starting_on_continuations() {
        let mut r = ligature_run();
        let f2 = font("Two");
        // A second run starting on the ligature continuation at 2 gets
        // pushed to the end of the text and dropped as empty.
        r.add_glyph_run(Arc::clone(&f2), 2, true);
        r.sanitize_glyph_runs();
        assert_eq!(r.glyph_runs().len(), 1);
        assert_eq!(r.glyph_runs()[0].character_offset, 0);
        // Same when several runs start inside the ligature.
        let mut r = ligature_run();
        r.add_glyph_run(Arc::clone(&f2), 2, true);
        r.add_glyph_run(font("Three"), 3, true);
        r.sanitize_glyph_runs();
        assert_eq!(r.glyph_runs().len(), 1);
    }

    #[test]
    fn ligature_apportionment_conserves_width() {
        let r = ligature_run();
        // Ligature covers [1, 4): width 900, three clusters.
        let w1 = r.compute_partial_ligature_width(1, 2, None);
        let w2 = r.compute_partial_ligature_width(2, 3, None);
        let w3 = r.compute_partial_ligature_width(3, 4, None);
        assert_eq!(w1, 300.0);
        assert_eq!(w2, 300.0);
        assert_eq!(w3, 300.0);
        assert_eq!(w1 + w2 + w3, 900.0);
        // The whole part in one piece gets the whole width.
        assert_eq!(r.compute_partial_ligature_width(1, 4, None), 900.0);
    }

    #[test]
    fn partial_ligature_clip_flags() {
        let r = ligature_run();
        let middle = r.compute_ligature_data(2, 3, None);
        assert!(middle.clip_before_part);
        assert!(middle.clip_after_part);
        let head = r.compute_ligature_data(1, 2, None);
        assert!(!head.clip_before_part);
        assert!(head.clip_after_part);
        let tail = r.compute_ligature_data(3, 4, None);
        assert!(tail.clip_before_part);
        assert!(!tail.clip_after_part);
    }

    #[test]
    fn advance_width_splits_ligature_edges() {
        let r = ligature_run();
        let full = r.get_advance_width(0, 4, None);
        assert_eq!(full, 600.0 + 900.0);
        // A range ending mid-ligature takes its cluster share.
        assert_eq!(r.get_advance_width(0, 2, None), 600.0 + 300.0);
        assert_eq!(r.get_advance_width(2, 2, None), 600.0);
    }

    #[test]
    fn shrink_to_ligature_boundaries_moves_both_edges() {
        let r = ligature_run();
        let (mut start, mut end) = (2usize, 3usize);
        r.shrink_to_ligature_boundaries(&mut start, &mut end);
        assert_eq!((start, end), (3, 3));
        let (mut start, mut end) = (0usize, 4usize);
        r.shrink_to_ligature_boundaries(&mut start, &mut end);
        assert_eq!((start, end), (0, 4));
    }

    #[test]
    fn potential_breaks_rejected_inside_clusters() {
        let mut r = ligature_run();
        // Position 2 is a cluster start, so a break is accepted there;
        // make it a continuation of the cluster at 1 instead.
        r.set_glyphs(2, CompressedGlyph::complex(false, false, 0), &[]);
        let changed = r.set_potential_line_breaks(0, &[false, true, true, true]);
        assert!(changed);
        assert!(r.glyphs()[1].can_break_before());
        assert!(!r.glyphs()[2].can_break_before());
        assert!(r.glyphs()[3].can_break_before());
        // Re-applying the same flags reports no change.
        assert!(!r.set_potential_line_breaks(0, &[false, true, true, true]));
    }

    #[test]
    fn break_and_measure_breaks_at_flagged_positions() {
        let mut r = simple_run("aa aa", 600);
        r.set_potential_line_breaks(0, &[false, false, false, true, false]);
        let mut priority = BreakPriority::NoBreak;
        let result = r.break_and_measure_text(
            0,
            5,
            2000.0,
            None,
            true,
            true,
            BoundingBoxType::Loose,
            None,
            false,
            &mut priority,
        );
        // Three glyphs fit (1800), the break before index 3 is taken and
        // the trailing space at index 2 is trimmable.
        assert_eq!(result.chars_fit, 3);
        assert!(!result.used_hyphenation);
        assert_eq!(result.trimmed_advance, 600.0);
        assert_eq!(result.metrics.advance_width, 1200.0);
        assert_eq!(priority, BreakPriority::Normal);
    }

    #[test]
    fn break_and_measure_overflows_without_opportunity() {
        let r = simple_run("aaaa", 600);
        let mut priority = BreakPriority::NoBreak;
        let result = r.break_and_measure_text(
            0,
            4,
            1000.0,
            None,
            true,
            false,
            BoundingBoxType::Loose,
            None,
            false,
            &mut priority,
        );
        // Nothing fits and there is no break opportunity: the text
        // overflows rather than making no progress.
        assert_eq!(result.chars_fit, 4);
        assert_eq!(result.last_break, None);
    }

    #[test]
    fn break_and_measure_always_makes_progress() {
        // Narrower than a single character with the initial break
        // suppressed: the line overflows instead of fitting nothing.
        let r = simple_run("abcd", 600);
        let mut priority = BreakPriority::NoBreak;
        let result = r.break_and_measure_text(
            0,
            4,
            300.0,
            None,
            true,
            false,
            BoundingBoxType::Loose,
            None,
            false,
            &mut priority,
        );
        assert!(result.chars_fit >= 1);
    }

    #[test]
    fn break_and_measure_word_wrap_priority() {
        let r = simple_run("aaaa", 600);
        let mut priority = BreakPriority::NoBreak;
        let result = r.break_and_measure_text(
            0,
            4,
            1300.0,
            None,
            true,
            false,
            BoundingBoxType::Loose,
            None,
            true,
            &mut priority,
        );
        assert_eq!(result.chars_fit, 2);
        assert_eq!(priority, BreakPriority::WordWrap);
    }

    #[test]
    fn copy_preserves_destination_break_bits() {
        let source = simple_run("abc", 600);
        let mut dest = run("abc");
        dest.set_potential_line_breaks(0, &[false, true, false]);
        dest.copy_glyph_data_from(&source, 0, 3, 0);
        assert!(dest.glyphs()[1].can_break_before());
        assert!(dest.glyphs()[0].is_simple());
        assert_eq!(dest.glyph_runs().len(), 1);
        assert_eq!(dest.get_advance_width(0, 3, None), 1800.0);
    }

    #[test]
    fn steal_empties_the_source() {
        let mut source = ligature_run();
        let mut dest = run("affi");
        dest.steal_glyph_data_from(&mut source, 0, 4, 0);
        assert_eq!(dest.get_advance_width(0, 4, None), 1500.0);
        assert_eq!(dest.detailed_glyphs(1).len(), 1);
        assert!(source.glyphs()[1].is_missing());
        assert_eq!(source.detailed_glyphs(1).len(), 0);
    }

    #[test]
    fn clone_run_is_a_deep_copy() {
        let source = ligature_run();
        let cloned = source.clone_run();
        assert_eq!(cloned.get_advance_width(0, 4, None), 1500.0);
        assert_eq!(cloned.count_missing_glyphs(), 0);
    }

    #[test]
    fn missing_glyph_advance_uses_min_visible_width() {
        let mut r = run("a\u{E000}");
        let f = font("Mock");
        r.add_glyph_run(Arc::clone(&f), 0, false);
        r.set_simple_glyph(0, 600, 'a' as u32);
        r.set_missing_glyph(1, '\u{E000}');
        assert_eq!(r.count_missing_glyphs(), 1);
        let detail = r.detailed_glyphs(1)[0];
        assert_eq!(detail.glyph_id, 0xE000);
        // Mock ave char width is 8px; the hex box minimum (16px) wins.
        assert_eq!(detail.advance, 16 * APP_UNITS);
    }

    #[test]
    fn missing_glyph_without_any_glyph_run_still_gets_a_box() {
        let mut r = run("\u{E000}");
        r.set_missing_glyph(0, '\u{E000}');
        assert_eq!(r.count_missing_glyphs(), 1);
        let detail = r.detailed_glyphs(0)[0];
        assert_eq!(detail.glyph_id, 0xE000);
        assert_eq!(detail.advance, 16 * APP_UNITS);
    }

    #[test]
    fn set_space_glyph_fast_path() {
        let f = font("Mock");
        let mut r = run(" ");
        assert!(r.set_space_glyph(&f, 0));
        assert!(r.glyphs()[0].is_simple());
        assert_eq!(r.glyphs()[0].simple_glyph(), f.space_glyph());
        let space_advance = (f.metrics().space_width * APP_UNITS as f64).round() as i32;
        assert_eq!(r.glyphs()[0].simple_advance(), space_advance);
    }

    #[test]
    fn synthetic_bold_widens_advances() {
        let style = FontStyle::new(FontSlant::Normal, 700, 0, 16.0, "x-western");
        let bold = Arc::new(Font::new(MockFontEntry::new("Mock").arc(), style));
        assert!(bold.has_synthetic_bold());
        let mut r = run("ab");
        r.add_glyph_run(Arc::clone(&bold), 0, false);
        r.set_simple_glyph(0, 600, 'a' as u32);
        r.set_simple_glyph(1, 600, 'b' as u32);
        r.adjust_advances_for_synthetic_bold(0, 2);
        assert_eq!(r.glyphs()[0].simple_advance(), 600 + APP_UNITS);
        assert_eq!(r.glyphs()[1].simple_advance(), 600 + APP_UNITS);
    }

    #[test]
    fn measure_is_idempotent() {
        let r = simple_run("abc", 600);
        let first = r.measure_text(0, 3, BoundingBoxType::Loose, None, None);
        let second = r.measure_text(0, 3, BoundingBoxType::Loose, None, None);
        assert_eq!(first, second);
        assert_eq!(first.advance_width, 1800.0);
        assert_eq!(first.bounding_box.width, 1800.0);
    }

    #[test]
    fn draw_advances_past_the_range() {
        let r = simple_run("abc", 600);
        let mut target = RecordingTarget::new();
        let advance = r.draw(&mut target, Point::new(0.0, 0.0), 0, 3, None, None);
        assert_eq!(advance, 1800.0);
        let filled: usize = target
            .ops()
            .iter()
            .filter_map(|op| match op {
                TargetOp::FillGlyphs(count) => Some(*count),
                _ => None,
            })
            .sum();
        assert_eq!(filled, 3);
    }

    #[test]
    fn translucent_synthetic_bold_buffers_through_a_group() {
        let style = FontStyle::new(FontSlant::Normal, 700, 0, 16.0, "x-western");
        let bold = Arc::new(Font::new(MockFontEntry::new("Mock").arc(), style));
        let mut r = run("ab");
        r.add_glyph_run(Arc::clone(&bold), 0, false);
        r.set_simple_glyph(0, 600, 'a' as u32);
        r.set_simple_glyph(1, 600, 'b' as u32);

        let mut target = RecordingTarget::new();
        target.set_color(crate::geom::Color::new(1.0, 0.0, 0.0, 0.5));
        r.draw(&mut target, Point::new(0.0, 0.0), 0, 2, None, None);
        let pushes = target
            .ops()
            .iter()
            .filter(|op| matches!(op, TargetOp::PushGroup))
            .count();
        assert_eq!(pushes, 1);
        assert!(target
            .ops()
            .iter()
            .any(|op| matches!(op, TargetOp::PopGroupWithAlpha(a) if *a == 0.5)));

        // Opaque color: no group.
        let mut target = RecordingTarget::new();
        r.draw(&mut target, Point::new(0.0, 0.0), 0, 2, None, None);
        assert!(!target.ops().iter().any(|op| matches!(op, TargetOp::PushGroup)));
    }

    #[test]
    fn dump_lists_runs_with_styles() {
        let r = simple_run("hi\u{2028}", 600);
        let dumped = r.dump();
        assert!(dumped.starts_with("\"hi\\u2028\" ["));
        assert!(dumped.contains("0: Mock 16/400/normal/x-western"));
    }
}
