//! Platform font backend: swash faces discovered through fontdb, shaped
//! with harfrust.

use core::cell::RefCell;
use std::sync::Arc;

use fontdb::{Database, Family, Query, Source, Stretch, Style, Weight};
use harfrust::{FontRef as HbFontRef, ShaperData, ShaperInstance, UnicodeBuffer};
use hashbrown::HashMap;
use swash::scale::ScaleContext;
use swash::FontRef;

use crate::font::{FontEntry, FontError, FontMetrics, ShapedGlyph};
use crate::geom::Rect;
use crate::group::FontSystem;
use crate::style::{FontSlant, FontStyle};

/// A face backed by a font file, queried through swash and shaped with
/// harfrust.
#[derive(Debug)]
pub struct SwashFontEntry {
    /// Full font data; the table-directory offset and cache key let a
    /// transient `FontRef` be rebuilt without re-parsing.
    data: Arc<[u8]>,
    offset: u32,
    key: swash::CacheKey,
    index: u32,
    name: String,
    units_per_em: u16,
    bold: bool,
    italic: bool,
    user_font: bool,
}

impl SwashFontEntry {
    pub fn from_bytes(
        name: &str,
        data: Arc<[u8]>,
        index: u32,
        user_font: bool,
    ) -> Result<Self, FontError> {
        let font = FontRef::from_index(&data, index as usize)
            .ok_or_else(|| FontError::InvalidFont(name.to_string()))?;
        let attributes = font.attributes();
        let units_per_em = font.metrics(&[]).units_per_em;
        let (offset, key) = (font.offset, font.key);
        Ok(SwashFontEntry {
            data,
            offset,
            key,
            index,
            name: name.to_string(),
            units_per_em,
            bold: attributes.weight() >= swash::Weight::SEMI_BOLD,
            italic: attributes.style() != swash::Style::Normal,
            user_font,
        })
    }

    pub fn from_vec(
        name: &str,
        data: Vec<u8>,
        index: u32,
        user_font: bool,
    ) -> Result<Self, FontError> {
        Self::from_bytes(name, Arc::from(data), index, user_font)
    }

    pub fn from_path(
        name: &str,
        path: impl AsRef<std::path::Path>,
        index: u32,
        user_font: bool,
    ) -> Result<Self, FontError> {
        let data = std::fs::read(path)?;
        Self::from_vec(name, data, index, user_font)
    }

    fn as_swash_ref(&self) -> FontRef<'_> {
        FontRef {
            data: &self.data,
            offset: self.offset,
            key: self.key,
        }
    }

    fn scale_for(&self, size: f64) -> f64 {
        if self.units_per_em != 0 {
            size / f64::from(self.units_per_em)
        } else {
            1.0
        }
    }
}

impl FontEntry for SwashFontEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_character(&self, ch: char) -> bool {
        self.as_swash_ref().charmap().map(ch) != 0
    }

    fn glyph_for_char(&self, ch: char) -> Option<u32> {
        let glyph = self.as_swash_ref().charmap().map(ch);
        (glyph != 0).then_some(u32::from(glyph))
    }

    fn is_bold(&self) -> bool {
        self.bold
    }

    fn is_italic(&self) -> bool {
        self.italic
    }

    fn is_user_font(&self) -> bool {
        self.user_font
    }

    fn metrics(&self, size: f64) -> FontMetrics {
        let font = self.as_swash_ref();
        let metrics = font.metrics(&[]);
        let scale = self.scale_for(size);
        let glyph_metrics = font.glyph_metrics(&[]).scale(size as f32);
        let space_width = match self.glyph_for_char(' ') {
            Some(glyph) => f64::from(glyph_metrics.advance_width(glyph as u16)),
            None => 0.0,
        };
        FontMetrics {
            ascent: f64::from(metrics.ascent) * scale,
            descent: f64::from(metrics.descent) * scale,
            em_height: size,
            x_height: f64::from(metrics.x_height) * scale,
            ave_char_width: f64::from(metrics.average_width) * scale,
            space_width,
            max_advance: f64::from(metrics.max_width) * scale,
        }
    }

    fn glyph_bounds(&self, glyph_id: u32, size: f64) -> Option<Rect> {
        let mut context = ScaleContext::new();
        let font = self.as_swash_ref();
        let mut scaler = context.builder(font).size(size as f32).build();
        let outline = scaler.scale_outline(glyph_id as u16)?;
        let bounds = outline.bounds();
        // Outline bounds are y-up; rects here are y-down with the origin
        // on the baseline.
        Some(Rect::new(
            f64::from(bounds.min.x),
            -f64::from(bounds.max.y),
            f64::from(bounds.max.x - bounds.min.x),
            f64::from(bounds.max.y - bounds.min.y),
        ))
    }

    fn shape_text(&self, text: &str, size: f64) -> Option<Vec<ShapedGlyph>> {
        let font_ref = HbFontRef::from_index(&self.data, self.index).ok()?;
        let data = ShaperData::new(&font_ref);
        let instance =
            ShaperInstance::from_variations(&font_ref, core::iter::empty::<harfrust::Variation>());
        let shaper = data
            .shaper(&font_ref)
            .instance(Some(&instance))
            .point_size(None)
            .build();

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.guess_segment_properties();

        let glyph_buffer = shaper.shape(buffer, &[]);
        let scale = self.scale_for(size);
        let shaped = glyph_buffer
            .glyph_infos()
            .iter()
            .zip(glyph_buffer.glyph_positions())
            .map(|(info, pos)| ShapedGlyph {
                glyph_id: info.glyph_id,
                cluster: info.cluster,
                x_advance: f64::from(pos.x_advance) * scale,
                x_offset: f64::from(pos.x_offset) * scale,
                y_offset: -f64::from(pos.y_offset) * scale,
            })
            .collect();
        Some(shaped)
    }
}

/// Font discovery over a fontdb database.
///
/// Faces are loaded lazily and memoized by fontdb id; per-character
/// fallback results are memoized too, since a miss costs a scan over
/// every installed face.
pub struct SystemFontSource {
    db: Database,
    entries: RefCell<HashMap<fontdb::ID, Option<Arc<dyn FontEntry>>>>,
    fallback_memo: RefCell<HashMap<char, Option<fontdb::ID>>>,
}

impl SystemFontSource {
    pub fn from_system_fonts() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        Self::with_database(db)
    }

    pub fn with_database(db: Database) -> Self {
        SystemFontSource {
            db,
            entries: RefCell::new(HashMap::new()),
            fallback_memo: RefCell::new(HashMap::new()),
        }
    }

    fn entry_for_face(&self, id: fontdb::ID) -> Option<Arc<dyn FontEntry>> {
        if let Some(cached) = self.entries.borrow().get(&id) {
            return cached.clone();
        }
        let entry = self.load_face(id);
        self.entries.borrow_mut().insert(id, entry.clone());
        entry
    }

    fn load_face(&self, id: fontdb::ID) -> Option<Arc<dyn FontEntry>> {
        let face = self.db.face(id)?;
        let name = face
            .families
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| face.post_script_name.clone());
        let bytes: Arc<[u8]> = match &face.source {
            Source::File(path) => match std::fs::read(path) {
                Ok(bytes) => Arc::from(bytes),
                Err(err) => {
                    log::warn!("failed to read font file {}: {err}", path.display());
                    return None;
                }
            },
            Source::Binary(data) => Arc::from(data.as_ref().as_ref()),
            Source::SharedFile(_, data) => Arc::from(data.as_ref().as_ref()),
        };
        match SwashFontEntry::from_bytes(&name, bytes, face.index, false) {
            Ok(entry) => Some(Arc::new(entry)),
            Err(err) => {
                log::warn!("failed to parse face '{name}': {err}");
                None
            }
        }
    }

    fn query_style(style: &FontStyle) -> (Weight, Style) {
        let slant = match style.slant {
            FontSlant::Normal => Style::Normal,
            FontSlant::Italic => Style::Italic,
            FontSlant::Oblique => Style::Oblique,
        };
        (Weight(style.weight), slant)
    }
}

impl FontSystem for SystemFontSource {
    fn resolve_family(&self, family: &str, style: &FontStyle) -> Option<Arc<dyn FontEntry>> {
        let (weight, slant) = Self::query_style(style);
        let id = self.db.query(&Query {
            families: &[Family::Name(family)],
            weight,
            stretch: Stretch::Normal,
            style: slant,
        })?;
        self.entry_for_face(id)
    }

    fn find_font_for_char(&self, ch: char, _style: &FontStyle) -> Option<Arc<dyn FontEntry>> {
        if let Some(memo) = self.fallback_memo.borrow().get(&ch) {
            return memo.and_then(|id| self.entry_for_face(id));
        }
        let found = self.db.faces().map(|face| face.id).find(|&id| {
            self.entry_for_face(id)
                .is_some_and(|entry| entry.has_character(ch))
        });
        self.fallback_memo.borrow_mut().insert(ch, found);
        found.and_then(|id| self.entry_for_face(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_database_resolves_nothing() {
        let source = SystemFontSource::with_database(Database::new());
        assert!(source
            .resolve_family("Does Not Exist", &FontStyle::default())
            .is_none());
        assert!(source
            .find_font_for_char('a', &FontStyle::default())
            .is_none());
        // Misses are memoized, not an error.
        assert!(source
            .find_font_for_char('a', &FontStyle::default())
            .is_none());
    }

    #[test]
    fn garbage_bytes_are_an_invalid_font() {
        let err = SwashFontEntry::from_vec("Garbage", vec![0u8; 16], 0, false).unwrap_err();
        assert!(matches!(err, FontError::InvalidFont(_)));
    }
}
