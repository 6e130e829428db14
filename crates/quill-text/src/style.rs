//! Font style descriptor used to select and size fonts.

use std::hash::{Hash, Hasher};

/// Default CSS-ish pixel size used when a style gives none.
pub const DEFAULT_PIXEL_FONT_SIZE: f64 = 16.0;

/// Upper bound on requested size. Huge sizes produce huge ink extents and
/// overflow app-unit math long before they are useful.
pub const FONT_MAX_SIZE: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontSlant {
    #[default]
    Normal,
    Italic,
    Oblique,
}

/// Requested font style. Size is in device pixels; zero is legal and means
/// "metrics are all zero, nothing is drawn".
#[derive(Debug, Clone)]
pub struct FontStyle {
    pub slant: FontSlant,
    /// CSS weight, clamped to 100..=900 at construction.
    pub weight: u16,
    /// Width class offset from normal, negative condensed.
    pub stretch: i16,
    pub size: f64,
    /// Language tag driving preference-table lookups.
    pub language: String,
}

impl Default for FontStyle {
    fn default() -> Self {
        FontStyle {
            slant: FontSlant::Normal,
            weight: 400,
            stretch: 0,
            size: DEFAULT_PIXEL_FONT_SIZE,
            language: "x-western".to_string(),
        }
    }
}

impl FontStyle {
    pub fn new(slant: FontSlant, weight: u16, stretch: i16, size: f64, language: &str) -> Self {
        FontStyle {
            slant,
            weight: weight.clamp(100, 900),
            stretch,
            size: if size.is_finite() {
                size.clamp(0.0, FONT_MAX_SIZE)
            } else {
                0.0
            },
            language: language.to_string(),
        }
    }

    pub fn with_size(size: f64) -> Self {
        FontStyle {
            size: size.clamp(0.0, FONT_MAX_SIZE),
            ..FontStyle::default()
        }
    }

    pub fn wants_bold(&self) -> bool {
        self.weight >= 600
    }
}

impl PartialEq for FontStyle {
    fn eq(&self, other: &Self) -> bool {
        self.slant == other.slant
            && self.weight == other.weight
            && self.stretch == other.stretch
            && self.size.to_bits() == other.size.to_bits()
            && self.language == other.language
    }
}

impl Eq for FontStyle {}

impl Hash for FontStyle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slant.hash(state);
        self.weight.hash(state);
        self.stretch.hash(state);
        self.size.to_bits().hash(state);
        self.language.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_and_size_are_clamped() {
        let style = FontStyle::new(FontSlant::Normal, 950, 0, 9999.0, "x-western");
        assert_eq!(style.weight, 900);
        assert_eq!(style.size, FONT_MAX_SIZE);
        let style = FontStyle::new(FontSlant::Normal, 50, 0, f64::NAN, "x-western");
        assert_eq!(style.weight, 100);
        assert_eq!(style.size, 0.0);
    }

    #[test]
    fn zero_size_is_legal() {
        let style = FontStyle::with_size(0.0);
        assert_eq!(style.size, 0.0);
        assert_eq!(style, FontStyle::with_size(0.0));
    }

    #[test]
    fn bold_threshold() {
        assert!(!FontStyle::default().wants_bold());
        assert!(FontStyle::new(FontSlant::Normal, 700, 0, 16.0, "x-western").wants_bold());
    }
}
