//! Cache of constructed fonts, keyed by face name and style.
//!
//! Building a [`Font`] reads metrics and allocates extents storage, so
//! callers that churn through styles share one cache. Eviction is by
//! sweep: the owner calls [`FontCache::age_cached_fonts`] periodically
//! and entries nobody else holds are dropped after three idle sweeps.

use core::cell::{Cell, RefCell};
use std::sync::Arc;

use hashbrown::HashMap;

use crate::font::Font;
use crate::style::FontStyle;

const EXPIRATION_SWEEPS: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    style: FontStyle,
}

struct CacheEntry {
    font: Arc<Font>,
    last_used: Cell<u64>,
}

#[derive(Default)]
pub struct FontCache {
    fonts: RefCell<HashMap<CacheKey, CacheEntry>>,
    sweep: Cell<u64>,
}

impl FontCache {
    pub fn new() -> Self {
        FontCache::default()
    }

    pub fn len(&self) -> usize {
        self.fonts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.borrow().is_empty()
    }

    /// A cached font for this face and style. A hit resets the entry's
    /// idle age, resurrecting entries already queued for expiration.
    pub fn lookup(&self, name: &str, style: &FontStyle) -> Option<Arc<Font>> {
        let fonts = self.fonts.borrow();
        let entry = fonts.get(&CacheKey {
            name: name.to_string(),
            style: style.clone(),
        })?;
        entry.last_used.set(self.sweep.get());
        Some(Arc::clone(&entry.font))
    }

    pub fn insert(&self, font: Arc<Font>) {
        let key = CacheKey {
            name: font.name().to_string(),
            style: font.style().clone(),
        };
        self.fonts.borrow_mut().insert(
            key,
            CacheEntry {
                font,
                last_used: Cell::new(self.sweep.get()),
            },
        );
    }

    /// One expiration sweep. Fonts still shared elsewhere are kept and
    /// their age reset; fonts held only here expire after
    /// `EXPIRATION_SWEEPS` idle sweeps.
    pub fn age_cached_fonts(&self) {
        let sweep = self.sweep.get() + 1;
        self.sweep.set(sweep);
        self.fonts.borrow_mut().retain(|key, entry| {
            if Arc::strong_count(&entry.font) > 1 {
                entry.last_used.set(sweep);
                return true;
            }
            if sweep - entry.last_used.get() < EXPIRATION_SWEEPS {
                return true;
            }
            log::debug!("expiring cached font '{}'", key.name);
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFontEntry;

    fn cached_font(name: &str) -> Arc<Font> {
        Arc::new(Font::new(MockFontEntry::new(name).arc(), FontStyle::default()))
    }

    #[test]
    fn lookup_is_keyed_by_name_and_style() {
        let cache = FontCache::new();
        cache.insert(cached_font("Mock"));
        assert!(cache.lookup("Mock", &FontStyle::default()).is_some());
        assert!(cache.lookup("Other", &FontStyle::default()).is_none());
        assert!(cache.lookup("Mock", &FontStyle::with_size(12.0)).is_none());
    }

    #[test]
    fn unused_fonts_expire_after_three_sweeps() {
        let cache = FontCache::new();
        cache.insert(cached_font("Mock"));
        cache.age_cached_fonts();
        cache.age_cached_fonts();
        assert_eq!(cache.len(), 1);
        cache.age_cached_fonts();
        assert!(cache.is_empty());
    }

    #[test]
    fn in_use_fonts_never_expire() {
        let cache = FontCache::new();
        let held = cached_font("Mock");
        cache.insert(Arc::clone(&held));
        for _ in 0..10 {
            cache.age_cached_fonts();
        }
        assert_eq!(cache.len(), 1);
        drop(held);
        // Age resets while held, so expiry takes three more sweeps.
        cache.age_cached_fonts();
        cache.age_cached_fonts();
        assert_eq!(cache.len(), 1);
        cache.age_cached_fonts();
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_resurrects_an_aging_entry() {
        let cache = FontCache::new();
        cache.insert(cached_font("Mock"));
        cache.age_cached_fonts();
        cache.age_cached_fonts();
        assert!(cache.lookup("Mock", &FontStyle::default()).is_some());
        cache.age_cached_fonts();
        cache.age_cached_fonts();
        assert_eq!(cache.len(), 1);
        cache.age_cached_fonts();
        assert!(cache.is_empty());
    }
}
