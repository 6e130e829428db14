//! Per-character glyph records.
//!
//! Each character position in a text run holds one [`CompressedGlyph`].
//! The common case (one glyph, one advance, both small) is stored
//! inline. Everything else (ligatures, multi-glyph clusters, oversized
//! advances, missing characters) stores a count here and puts the actual
//! glyph data in the run's [`DetailedGlyph`] side table.

/// Largest advance (in app units) the simple encoding can hold.
///
/// This threshold is load-bearing: it decides which characters take the
/// detailed path, not just how much memory they use.
pub const MAX_SIMPLE_ADVANCE: i32 = 0x3FFF;

/// Largest glyph id the simple encoding can hold.
pub const MAX_SIMPLE_GLYPH_ID: u32 = 0xFFFF;

/// The glyph payload of one character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphData {
    /// One glyph with a small advance and no offsets. Always a cluster
    /// start and a ligature group start.
    Simple { glyph_id: u32, advance: i32 },
    /// `glyph_count` detailed glyphs in the side table (possibly zero for
    /// a continuation character inside a cluster or ligature).
    Complex {
        glyph_count: u16,
        cluster_start: bool,
        ligature_group_start: bool,
    },
    /// No font could render this character. `glyph_count` is 1 when a
    /// synthesized fallback-box entry exists in the side table, 0 for an
    /// invisible zero-advance placeholder.
    Missing { glyph_count: u16 },
}

/// One character's compressed glyph record plus its line-break bit.
///
/// `can_break_before` is a property of the character position in its
/// context, independent of the glyph data, and survives glyph-data
/// copies between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedGlyph {
    data: GlyphData,
    can_break_before: bool,
}

impl Default for CompressedGlyph {
    /// An unshaped character: missing, zero advance, zero glyphs.
    fn default() -> Self {
        CompressedGlyph {
            data: GlyphData::Missing { glyph_count: 0 },
            can_break_before: false,
        }
    }
}

impl CompressedGlyph {
    /// A simple glyph record. `advance` and `glyph_id` must fit the
    /// simple encoding.
    pub fn simple(advance: i32, glyph_id: u32) -> Self {
        let mut g = CompressedGlyph::default();
        g.set_simple(advance, glyph_id);
        g
    }

    /// A complex record with `count` side-table entries.
    pub fn complex(cluster_start: bool, ligature_group_start: bool, count: u16) -> Self {
        let mut g = CompressedGlyph::default();
        g.set_complex(cluster_start, ligature_group_start, count);
        g
    }

    /// A missing record with `count` (0 or 1) side-table entries.
    pub fn missing(count: u16) -> Self {
        let mut g = CompressedGlyph::default();
        g.set_missing(count);
        g
    }

    /// Whether `advance` fits the simple encoding. Negative advances
    /// never do.
    pub fn is_simple_advance(advance: i32) -> bool {
        (0..=MAX_SIMPLE_ADVANCE).contains(&advance)
    }

    /// Whether `glyph_id` fits the simple encoding.
    pub fn is_simple_glyph_id(glyph_id: u32) -> bool {
        glyph_id <= MAX_SIMPLE_GLYPH_ID
    }

    pub fn data(&self) -> GlyphData {
        self.data
    }

    /// Store a simple glyph. Callers must have checked
    /// [`is_simple_advance`](Self::is_simple_advance) and
    /// [`is_simple_glyph_id`](Self::is_simple_glyph_id) first.
    pub fn set_simple(&mut self, advance: i32, glyph_id: u32) {
        debug_assert!(Self::is_simple_advance(advance));
        debug_assert!(Self::is_simple_glyph_id(glyph_id));
        self.data = GlyphData::Simple { glyph_id, advance };
    }

    pub fn set_complex(&mut self, cluster_start: bool, ligature_group_start: bool, count: u16) {
        self.data = GlyphData::Complex {
            glyph_count: count,
            cluster_start,
            ligature_group_start,
        };
    }

    /// Mark the character missing with `count` side-table entries (0 or 1).
    pub fn set_missing(&mut self, count: u16) {
        debug_assert!(count <= 1);
        self.data = GlyphData::Missing { glyph_count: count };
    }

    /// Set the break-before bit, returning whether the bit changed.
    pub fn set_can_break_before(&mut self, can_break: bool) -> bool {
        let changed = self.can_break_before != can_break;
        self.can_break_before = can_break;
        changed
    }

    pub fn can_break_before(&self) -> bool {
        self.can_break_before
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.data, GlyphData::Simple { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.data, GlyphData::Missing { .. })
    }

    pub fn simple_glyph(&self) -> u32 {
        match self.data {
            GlyphData::Simple { glyph_id, .. } => glyph_id,
            _ => panic!("not a simple glyph"),
        }
    }

    pub fn simple_advance(&self) -> i32 {
        match self.data {
            GlyphData::Simple { advance, .. } => advance,
            _ => panic!("not a simple glyph"),
        }
    }

    /// Number of side-table entries for this character (0 for simple).
    pub fn glyph_count(&self) -> usize {
        match self.data {
            GlyphData::Simple { .. } => 0,
            GlyphData::Complex { glyph_count, .. } | GlyphData::Missing { glyph_count } => {
                glyph_count as usize
            }
        }
    }

    /// Simple and missing characters always start a cluster.
    pub fn is_cluster_start(&self) -> bool {
        match self.data {
            GlyphData::Simple { .. } | GlyphData::Missing { .. } => true,
            GlyphData::Complex { cluster_start, .. } => cluster_start,
        }
    }

    pub fn is_ligature_group_start(&self) -> bool {
        match self.data {
            GlyphData::Simple { .. } | GlyphData::Missing { .. } => true,
            GlyphData::Complex {
                ligature_group_start,
                ..
            } => ligature_group_start,
        }
    }

    /// A character rendered as part of a ligature started by an earlier
    /// character.
    pub fn is_ligature_continuation(&self) -> bool {
        matches!(
            self.data,
            GlyphData::Complex {
                ligature_group_start: false,
                ..
            }
        )
    }
}

/// One entry of the detailed-glyph side table.
///
/// Advances are app units; offsets displace the glyph from the pen
/// position without affecting it. For a Missing character the glyph-id
/// slot holds the original code point so the fallback box can show it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetailedGlyph {
    pub glyph_id: u32,
    pub advance: i32,
    pub x_offset: f64,
    pub y_offset: f64,
}
