//! Per-font glyph extents cache.
//!
//! Each [`Font`](crate::font::Font) owns one `GlyphExtents` per distinct
//! app-units-per-device-unit scale it has been used at. Storage is
//! two-tier: a cheap block-allocated table of "contained widths" for
//! glyphs whose ink stays inside the font's ascent/descent box, and a
//! hash of full tight rectangles for everything else.

use core::cell::RefCell;

use hashbrown::HashMap;

use crate::font::Font;
use crate::geom::Rect;
use crate::surface::DrawTarget;

/// Sentinel contained width: "no cached width, or not containable".
/// A stored width at or above this value forces the tight-extents path.
pub const INVALID_WIDTH: u16 = 0xFFFF;

const BLOCK_SIZE_BITS: u32 = 7;
const BLOCK_SIZE: usize = 1 << BLOCK_SIZE_BITS;

/// Sparse glyph-id -> u16 width table, allocated in blocks of 128 so a
/// handful of glyphs from a large font doesn't cost a full dense array.
#[derive(Debug, Default)]
struct GlyphWidths {
    blocks: Vec<Option<Box<[u16; BLOCK_SIZE]>>>,
}

impl GlyphWidths {
    fn get(&self, glyph_id: u32) -> u16 {
        let block = (glyph_id >> BLOCK_SIZE_BITS) as usize;
        match self.blocks.get(block) {
            Some(Some(widths)) => widths[glyph_id as usize & (BLOCK_SIZE - 1)],
            _ => INVALID_WIDTH,
        }
    }

    fn set(&mut self, glyph_id: u32, width: u16) {
        let block = (glyph_id >> BLOCK_SIZE_BITS) as usize;
        if block >= self.blocks.len() {
            self.blocks.resize_with(block + 1, || None);
        }
        let widths = self.blocks[block].get_or_insert_with(|| Box::new([INVALID_WIDTH; BLOCK_SIZE]));
        widths[glyph_id as usize & (BLOCK_SIZE - 1)] = width;
    }

    fn contains(&self, glyph_id: u32) -> bool {
        self.get(glyph_id) != INVALID_WIDTH
    }
}

/// Glyph extents for one font at one device scale.
///
/// Population is lazy; entries persist for the lifetime of the owning
/// font. Interior mutability keeps the query methods `&self` so the
/// cache can be consulted mid-measure through a shared `Font`. This is
/// single-thread sharing only; the type is deliberately not `Sync`.
#[derive(Debug)]
pub struct GlyphExtents {
    app_units_per_dev_unit: i32,
    contained_widths: RefCell<GlyphWidths>,
    tight_extents: RefCell<HashMap<u32, Rect>>,
}

impl GlyphExtents {
    pub fn new(app_units_per_dev_unit: i32) -> Self {
        Self {
            app_units_per_dev_unit,
            contained_widths: RefCell::new(GlyphWidths::default()),
            tight_extents: RefCell::new(HashMap::new()),
        }
    }

    pub fn app_units_per_dev_unit(&self) -> i32 {
        self.app_units_per_dev_unit
    }

    /// Cached contained width in app units, or [`INVALID_WIDTH`] if the
    /// glyph is unknown here or was promoted to the tight table.
    pub fn contained_width(&self, glyph_id: u32) -> u16 {
        self.contained_widths.borrow().get(glyph_id)
    }

    pub fn set_contained_width(&self, glyph_id: u32, width: u16) {
        self.contained_widths.borrow_mut().set(glyph_id, width);
    }

    pub fn set_tight_extents(&self, glyph_id: u32, extents: Rect) {
        self.tight_extents.borrow_mut().insert(glyph_id, extents);
    }

    /// Whether any extents information is cached for this glyph.
    pub fn is_glyph_known(&self, glyph_id: u32) -> bool {
        self.contained_widths.borrow().contains(glyph_id)
            || self.tight_extents.borrow().contains_key(&glyph_id)
    }

    pub fn is_glyph_known_with_tight_extents(&self, glyph_id: u32) -> bool {
        self.tight_extents.borrow().contains_key(&glyph_id)
    }

    /// Tight ink extents in app units.
    ///
    /// On a miss this needs a live drawing target to measure the glyph;
    /// with no target and no cached value it returns `None` and the
    /// caller must substitute a heuristic box
    /// (`[0, advance] x [-ascent, descent]`).
    pub fn tight_extents(
        &self,
        font: &Font,
        target: Option<&mut (dyn DrawTarget + '_)>,
        glyph_id: u32,
    ) -> Option<Rect> {
        if let Some(rect) = self.tight_extents.borrow().get(&glyph_id) {
            return Some(*rect);
        }
        let target = match target {
            Some(target) => target,
            None => {
                log::warn!("no drawing target to measure tight extents of glyph {glyph_id}");
                return None;
            }
        };
        font.setup_glyph_extents(target, glyph_id, true, self);
        self.tight_extents.borrow().get(&glyph_id).copied()
    }
}
