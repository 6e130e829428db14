//! quill-text: text shaping and glyph-run management.
//!
//! The pipeline: a [`FontGroup`] resolves a family list and splits text
//! into per-font ranges, the shaper fills a [`TextRun`] with compressed
//! glyph records, and the run then measures, line-breaks and draws
//! itself through a caller-provided [`DrawTarget`]. Nothing here
//! rasterizes; drawing is batched glyph placements handed to the
//! backend.
//!
//! Coordinates are app units (integer device sub-units) except at the
//! [`DrawTarget`] boundary, which speaks device units.

pub mod cache;
pub mod extents;
pub mod font;
pub mod geom;
pub mod glyph;
pub mod group;
pub mod prefs;
pub mod shaper;
pub mod style;
pub mod surface;
pub mod system;
pub mod textrun;
pub mod unicode;

#[cfg(test)]
mod mock;

pub use cache::FontCache;
pub use extents::GlyphExtents;
pub use font::{
    BoundingBoxType, Font, FontEntry, FontError, FontMetrics, RunMetrics, ShapedGlyph,
};
pub use geom::{Color, Point, Rect};
pub use glyph::{CompressedGlyph, DetailedGlyph, GlyphData};
pub use group::{FontGroup, FontSystem, TextRange, UserFontSet};
pub use prefs::FontPrefs;
pub use style::{FontSlant, FontStyle};
pub use surface::{DrawTarget, GlyphPlacement, NoProperties, PropertyProvider, Spacing};
pub use system::{SwashFontEntry, SystemFontSource};
pub use textrun::{
    BreakAndMeasureResult, BreakPriority, GlyphRun, GlyphRunIterator, RunFlags, TextRun,
};
