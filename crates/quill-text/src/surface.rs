//! Contracts to the drawing surface and to the layout caller.
//!
//! The crate never rasterizes. Everything pixel-shaped goes through
//! [`DrawTarget`], implemented by whatever backend hosts the surface;
//! everything layout-shaped (letter spacing, hyphenation) comes back in
//! through [`PropertyProvider`].

use crate::font::Font;
use crate::geom::{Color, Rect};

/// One positioned glyph, in device units relative to the surface origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPlacement {
    pub glyph_id: u32,
    pub x: f64,
    pub y: f64,
}

/// Backend drawing surface.
///
/// `set_font` returning false means the backend cannot render this font at
/// all; the caller abandons drawing the affected glyph run silently.
pub trait DrawTarget {
    fn set_font(&mut self, font: &Font) -> bool;

    /// Fill a batch of glyphs with the current color.
    fn fill_glyphs(&mut self, glyphs: &[GlyphPlacement]);

    /// Append glyph outlines to the current path instead of filling.
    fn append_glyph_path(&mut self, glyphs: &[GlyphPlacement]);

    /// Tight ink extents of a single glyph, in device units, y-up bearing
    /// converted to our y-down rect. Backends with no outline access may
    /// leave the default, which asks the font entry directly.
    fn glyph_ink_extents(&mut self, font: &Font, glyph_id: u32) -> Option<Rect> {
        font.entry().glyph_bounds(glyph_id, font.style().size)
    }

    /// Draw the hex-box placeholder for a character no font can render.
    /// `rect` is in device units.
    fn draw_missing_glyph(&mut self, rect: Rect, ch: char);

    fn current_color(&self) -> Color;
    fn set_color(&mut self, color: Color);

    fn save(&mut self);
    fn restore(&mut self);

    /// Intersect the clip with `rect` (device units). Only meaningful
    /// between `save`/`restore`.
    fn clip_rect(&mut self, rect: Rect);

    /// Begin drawing into an offscreen group.
    fn push_group(&mut self);

    /// Composite the current group onto the surface below it with the
    /// given uniform alpha.
    fn pop_group_with_alpha(&mut self, alpha: f32);
}

/// Per-character spacing in app units, applied before and after the
/// character's advance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spacing {
    pub before: f64,
    pub after: f64,
}

/// Layout-side callbacks for text measurement.
///
/// All three are queried with character indexes relative to the text run
/// the operation was invoked on. Buffers are filled for
/// `start..start + buf.len()`.
pub trait PropertyProvider {
    fn spacing(&self, start: usize, spacing: &mut [Spacing]);

    /// `breaks[i]` is set true when a hyphenation break is allowed before
    /// character `start + i`.
    fn hyphenation_breaks(&self, start: usize, breaks: &mut [bool]);

    /// Width of the hyphen that would be appended at a hyphenation break,
    /// in app units.
    fn hyphen_width(&self) -> f64;
}

/// Provider for text with no spacing and no hyphenation.
#[derive(Debug, Default)]
pub struct NoProperties;

impl PropertyProvider for NoProperties {
    fn spacing(&self, _start: usize, spacing: &mut [Spacing]) {
        spacing.fill(Spacing::default());
    }

    fn hyphenation_breaks(&self, _start: usize, breaks: &mut [bool]) {
        breaks.fill(false);
    }

    fn hyphen_width(&self) -> f64 {
        0.0
    }
}
