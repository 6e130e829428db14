//! Test doubles: a scriptable font entry, a font system backed by plain
//! maps, and a drawing target that records every call it receives.

use core::cell::RefCell;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::font::{Font, FontEntry, FontMetrics, ShapedGlyph};
use crate::geom::{Color, Rect};
use crate::group::FontSystem;
use crate::style::FontStyle;
use crate::surface::{DrawTarget, GlyphPlacement};

/// A synthetic face with fixed proportional metrics: glyph ids are the
/// code points themselves and every glyph advances half the font size.
pub struct MockFontEntry {
    name: String,
    /// None covers every character.
    coverage: Option<HashSet<char>>,
    bold: bool,
    user: bool,
    fi_ligature: bool,
    failing_shaper: bool,
    offset_marks: bool,
    overflowing_ink: bool,
}

impl MockFontEntry {
    pub fn new(name: &str) -> Self {
        MockFontEntry {
            name: name.to_string(),
            coverage: None,
            bold: false,
            user: false,
            fi_ligature: false,
            failing_shaper: false,
            offset_marks: false,
            overflowing_ink: false,
        }
    }

    /// Covers exactly the characters of `chars`.
    pub fn with_coverage(name: &str, chars: &str) -> Self {
        MockFontEntry {
            coverage: Some(chars.chars().collect()),
            ..MockFontEntry::new(name)
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    /// Shape "fi" as a single ligature glyph clustered on the 'f'.
    pub fn with_fi_ligature(mut self) -> Self {
        self.fi_ligature = true;
        self
    }

    /// `shape_text` always fails.
    pub fn failing_shaper(mut self) -> Self {
        self.failing_shaper = true;
        self
    }

    /// Shape U+0301 as a zero-advance glyph with a negative x offset in
    /// its own cluster.
    pub fn with_offset_marks(mut self) -> Self {
        self.offset_marks = true;
        self
    }

    /// Report ink boxes with a negative left bearing that overshoot the
    /// ascent/descent box, the way a swash italic or heavily kerned face
    /// does.
    pub fn with_overflowing_ink(mut self) -> Self {
        self.overflowing_ink = true;
        self
    }

    pub fn arc(self) -> Arc<dyn FontEntry> {
        Arc::new(self)
    }
}

impl FontEntry for MockFontEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_character(&self, ch: char) -> bool {
        match &self.coverage {
            Some(coverage) => coverage.contains(&ch),
            None => true,
        }
    }

    fn glyph_for_char(&self, ch: char) -> Option<u32> {
        self.has_character(ch).then_some(ch as u32)
    }

    fn is_bold(&self) -> bool {
        self.bold
    }

    fn is_user_font(&self) -> bool {
        self.user
    }

    fn metrics(&self, size: f64) -> FontMetrics {
        FontMetrics {
            ascent: 0.8 * size,
            descent: 0.2 * size,
            em_height: size,
            x_height: 0.5 * size,
            ave_char_width: 0.5 * size,
            space_width: 0.5 * size,
            max_advance: size,
        }
    }

    fn glyph_bounds(&self, _glyph_id: u32, size: f64) -> Option<Rect> {
        if self.overflowing_ink {
            return Some(Rect::new(-0.1 * size, -0.9 * size, 0.7 * size, 1.2 * size));
        }
        // Ink stays inside the ascent/descent box with a zero bearing.
        Some(Rect::new(0.0, -0.7 * size, 0.5 * size, 0.75 * size))
    }

    fn shape_text(&self, text: &str, size: f64) -> Option<Vec<ShapedGlyph>> {
        if self.failing_shaper {
            return None;
        }
        let mut shaped = Vec::new();
        let mut skip_next = false;
        for (byte_index, ch) in text.char_indices() {
            if skip_next {
                skip_next = false;
                continue;
            }
            if self.fi_ligature && ch == 'f' && text[byte_index + 1..].starts_with('i') {
                shaped.push(ShapedGlyph {
                    glyph_id: 0xFF01,
                    cluster: byte_index as u32,
                    x_advance: 0.75 * size,
                    x_offset: 0.0,
                    y_offset: 0.0,
                });
                skip_next = true;
                continue;
            }
            if self.offset_marks && ch == '\u{0301}' {
                shaped.push(ShapedGlyph {
                    glyph_id: ch as u32,
                    cluster: byte_index as u32,
                    x_advance: 0.0,
                    x_offset: -0.25 * size,
                    y_offset: 0.0,
                });
                continue;
            }
            shaped.push(ShapedGlyph {
                glyph_id: ch as u32,
                cluster: byte_index as u32,
                x_advance: 0.5 * size,
                x_offset: 0.0,
                y_offset: 0.0,
            });
        }
        Some(shaped)
    }
}

/// A font system resolving families from a map and fallback from an
/// ordered list.
#[derive(Default)]
pub struct MockFontSystem {
    families: RefCell<HashMap<String, Arc<dyn FontEntry>>>,
    fallback: RefCell<Vec<Arc<dyn FontEntry>>>,
}

impl MockFontSystem {
    pub fn new() -> Self {
        MockFontSystem::default()
    }

    pub fn add_family(&self, name: &str, entry: Arc<dyn FontEntry>) {
        self.families
            .borrow_mut()
            .insert(name.to_ascii_lowercase(), entry);
    }

    pub fn add_fallback(&self, entry: Arc<dyn FontEntry>) {
        self.fallback.borrow_mut().push(entry);
    }
}

impl FontSystem for MockFontSystem {
    fn resolve_family(&self, family: &str, _style: &FontStyle) -> Option<Arc<dyn FontEntry>> {
        self.families
            .borrow()
            .get(&family.to_ascii_lowercase())
            .cloned()
    }

    fn find_font_for_char(&self, ch: char, _style: &FontStyle) -> Option<Arc<dyn FontEntry>> {
        self.fallback
            .borrow()
            .iter()
            .find(|entry| entry.has_character(ch))
            .cloned()
    }
}

/// Everything a [`DrawTarget`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOp {
    SetFont(String),
    FillGlyphs(usize),
    AppendGlyphPath(usize),
    DrawMissingGlyph(char),
    SetColor(Color),
    Save,
    Restore,
    ClipRect(Rect),
    PushGroup,
    PopGroupWithAlpha(f32),
}

/// A drawing target that renders nothing and remembers every call.
pub struct RecordingTarget {
    ops: Vec<TargetOp>,
    color: Color,
    saved: Vec<Color>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        RecordingTarget {
            ops: Vec::new(),
            color: Color::BLACK,
            saved: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[TargetOp] {
        &self.ops
    }
}

impl DrawTarget for RecordingTarget {
    fn set_font(&mut self, font: &Font) -> bool {
        self.ops.push(TargetOp::SetFont(font.name().to_string()));
        true
    }

    fn fill_glyphs(&mut self, glyphs: &[GlyphPlacement]) {
        self.ops.push(TargetOp::FillGlyphs(glyphs.len()));
    }

    fn append_glyph_path(&mut self, glyphs: &[GlyphPlacement]) {
        self.ops.push(TargetOp::AppendGlyphPath(glyphs.len()));
    }

    fn draw_missing_glyph(&mut self, _rect: Rect, ch: char) {
        self.ops.push(TargetOp::DrawMissingGlyph(ch));
    }

    fn current_color(&self) -> Color {
        self.color
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
        self.ops.push(TargetOp::SetColor(color));
    }

    fn save(&mut self) {
        self.saved.push(self.color);
        self.ops.push(TargetOp::Save);
    }

    fn restore(&mut self) {
        if let Some(color) = self.saved.pop() {
            self.color = color;
        }
        self.ops.push(TargetOp::Restore);
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.ops.push(TargetOp::ClipRect(rect));
    }

    fn push_group(&mut self) {
        self.ops.push(TargetOp::PushGroup);
    }

    fn pop_group_with_alpha(&mut self, alpha: f32) {
        self.ops.push(TargetOp::PopGroupWithAlpha(alpha));
    }
}
