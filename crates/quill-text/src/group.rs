//! Ordered font lists and per-character font fallback.
//!
//! A `FontGroup` resolves a CSS-style family list against a
//! [`FontSystem`], then splits text into font-homogeneous ranges: each
//! character gets the first group font covering it, then a
//! script-preference font, then the previous character's font, then
//! system fallback, and may end up with no font at all.

use core::cell::{Cell, RefCell};
use std::sync::Arc;

use hashbrown::HashMap;

use crate::cache::FontCache;
use crate::font::{Font, FontEntry, FontError};
use crate::prefs::{pref_lang_for_char, FontPrefs};
use crate::shaper;
use crate::style::FontStyle;
use crate::textrun::{RunFlags, TextRun};
use crate::unicode::{is_invalid_char, is_join_causer, is_private_use};

/// Resolves family names and system-wide fallback. Implemented by the
/// platform backend and by test doubles.
pub trait FontSystem {
    fn resolve_family(&self, family: &str, style: &FontStyle) -> Option<Arc<dyn FontEntry>>;

    /// Any installed face covering `ch`, best-effort.
    fn find_font_for_char(&self, ch: char, style: &FontStyle) -> Option<Arc<dyn FontEntry>>;
}

/// Downloadable faces registered by the document. Every mutation bumps
/// the generation; text runs shaped against an older generation are
/// stale and must be reshaped.
#[derive(Default)]
pub struct UserFontSet {
    generation: Cell<u64>,
    faces: RefCell<HashMap<String, Arc<dyn FontEntry>>>,
}

impl UserFontSet {
    pub fn new() -> Self {
        UserFontSet::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn add_face(&self, family: &str, entry: Arc<dyn FontEntry>) {
        self.faces
            .borrow_mut()
            .insert(family.to_ascii_lowercase(), entry);
        self.generation.set(self.generation.get() + 1);
    }

    pub fn remove_face(&self, family: &str) {
        if self
            .faces
            .borrow_mut()
            .remove(&family.to_ascii_lowercase())
            .is_some()
        {
            self.generation.set(self.generation.get() + 1);
        }
    }

    pub fn find_entry(&self, family: &str) -> Option<Arc<dyn FontEntry>> {
        self.faces
            .borrow()
            .get(&family.to_ascii_lowercase())
            .cloned()
    }
}

/// One font-homogeneous piece of text. `font` is None when no font at
/// all covers the characters.
#[derive(Debug, Clone)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
    pub font: Option<Arc<Font>>,
}

pub struct FontGroup {
    families: String,
    style: FontStyle,
    fonts: Vec<Arc<Font>>,
    font_system: Arc<dyn FontSystem>,
    prefs: FontPrefs,
    user_fonts: Option<Arc<UserFontSet>>,
    /// Shared cache of constructed fonts; groups built without one
    /// construct fonts directly.
    font_cache: Option<Arc<FontCache>>,
    /// Memo of preference/system faces already turned into fonts.
    resolved: RefCell<HashMap<String, Option<Arc<Font>>>>,
}

impl std::fmt::Debug for FontGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontGroup")
            .field("families", &self.families)
            .field("style", &self.style)
            .field("fonts", &self.fonts)
            .finish_non_exhaustive()
    }
}

impl FontGroup {
    /// Resolve `families` (a CSS font-family list) into an ordered font
    /// list. Fails if not a single family resolves. Font construction
    /// goes through `font_cache` when one is given, so groups sharing a
    /// cache share `Font` instances (and their extents caches) for the
    /// same face and style.
    pub fn new(
        families: &str,
        style: FontStyle,
        font_system: Arc<dyn FontSystem>,
        prefs: FontPrefs,
        user_fonts: Option<Arc<UserFontSet>>,
        font_cache: Option<Arc<FontCache>>,
    ) -> Result<Self, FontError> {
        let mut fonts = Vec::new();
        for_each_family(families, &prefs, &style.language, &mut |family| {
            let entry = user_fonts
                .as_ref()
                .and_then(|set| set.find_entry(family))
                .or_else(|| font_system.resolve_family(family, &style));
            match entry {
                Some(entry) => fonts.push(cached_font(font_cache.as_deref(), entry, &style)),
                None => log::debug!("no face for family '{family}'"),
            }
        });
        if fonts.is_empty() {
            return Err(FontError::NoUsableFonts(families.to_string()));
        }
        Ok(FontGroup {
            families: families.to_string(),
            style,
            fonts,
            font_system,
            prefs,
            user_fonts,
            font_cache,
            resolved: RefCell::new(HashMap::new()),
        })
    }

    pub fn families(&self) -> &str {
        &self.families
    }

    pub fn style(&self) -> &FontStyle {
        &self.style
    }

    pub fn fonts(&self) -> &[Arc<Font>] {
        &self.fonts
    }

    pub fn primary_font(&self) -> &Arc<Font> {
        &self.fonts[0]
    }

    pub fn user_fonts(&self) -> Option<&Arc<UserFontSet>> {
        self.user_fonts.as_ref()
    }

    /// Generation of the attached user-font set, 0 without one.
    pub fn generation(&self) -> u64 {
        self.user_fonts.as_ref().map(|set| set.generation()).unwrap_or(0)
    }

    /// Whether `run` was shaped against an older user-font generation.
    pub fn is_stale(&self, run: &TextRun) -> bool {
        run.user_font_generation() != self.generation()
    }

    /// Pick a font for `ch`.
    ///
    /// If `ch` or the previous character causes joining, the previous
    /// range's font is kept when it covers `ch`, so joined clusters stay
    /// in one font. Then group fonts in order; Private Use code points
    /// stop here (an explicitly requested font may render them, fallback
    /// never does). Then script-preference fonts, the previous font once
    /// more, and finally system fallback.
    ///
    /// The character following `ch` is deliberately not a parameter:
    /// selection only ever looks backward, so lookahead context would be
    /// dead weight in the signature.
    pub fn find_font_for_char(
        &self,
        ch: char,
        prev_ch: Option<char>,
        prev_matched: Option<&Arc<Font>>,
    ) -> Option<Arc<Font>> {
        if is_join_causer(ch) || prev_ch.is_some_and(is_join_causer) {
            if let Some(prev) = prev_matched {
                if prev.has_character(ch) {
                    return Some(Arc::clone(prev));
                }
            }
        }

        for font in &self.fonts {
            if font.has_character(ch) {
                return Some(Arc::clone(font));
            }
        }

        if is_private_use(ch) {
            return None;
        }

        if let Some(font) = self.which_pref_font_supports(ch) {
            return Some(font);
        }

        if let Some(prev) = prev_matched {
            if prev.has_character(ch) {
                return Some(Arc::clone(prev));
            }
        }

        self.which_system_font_supports(ch)
    }

    fn font_for_family(&self, family: &str) -> Option<Arc<Font>> {
        let key = family.to_ascii_lowercase();
        if let Some(cached) = self.resolved.borrow().get(&key) {
            return cached.clone();
        }
        let font = self
            .font_system
            .resolve_family(family, &self.style)
            .map(|entry| cached_font(self.font_cache.as_deref(), entry, &self.style));
        self.resolved.borrow_mut().insert(key, font.clone());
        font
    }

    fn which_pref_font_supports(&self, ch: char) -> Option<Arc<Font>> {
        let char_lang = pref_lang_for_char(ch)?;
        for lang in self.prefs.pref_lang_list(char_lang, &self.style.language) {
            for family in self.prefs.fallback_families(&lang) {
                let Some(font) = self.font_for_family(family) else {
                    continue;
                };
                if font.has_character(ch) {
                    log::debug!("pref font '{}' ({lang}) for U+{:04X}", font.name(), ch as u32);
                    return Some(font);
                }
            }
        }
        None
    }

    fn which_system_font_supports(&self, ch: char) -> Option<Arc<Font>> {
        let entry = self.font_system.find_font_for_char(ch, &self.style)?;
        log::debug!("system fallback '{}' for U+{:04X}", entry.name(), ch as u32);
        let key = entry.name().to_ascii_lowercase();
        if let Some(Some(cached)) = self.resolved.borrow().get(&key) {
            return Some(Arc::clone(cached));
        }
        let font = cached_font(self.font_cache.as_deref(), entry, &self.style);
        self.resolved
            .borrow_mut()
            .insert(key, Some(Arc::clone(&font)));
        Some(font)
    }

    /// Split `text` into maximal ranges rendered by one font each.
    pub fn compute_ranges(&self, text: &[char]) -> Vec<TextRange> {
        let mut ranges: Vec<TextRange> = Vec::new();
        let mut prev_ch = None;
        for (i, &ch) in text.iter().enumerate() {
            let font = self.find_font_for_char(
                ch,
                prev_ch,
                ranges.last().and_then(|range| range.font.as_ref()),
            );
            prev_ch = Some(ch);

            match ranges.last_mut() {
                None => ranges.push(TextRange {
                    start: 0,
                    end: 1,
                    font,
                }),
                Some(prev_range) => {
                    if !same_font(prev_range.font.as_ref(), font.as_ref()) {
                        prev_range.end = i;
                        ranges.push(TextRange {
                            start: i,
                            end: i + 1,
                            font,
                        });
                    }
                }
            }
        }
        if let Some(last) = ranges.last_mut() {
            last.end = text.len();
        }
        ranges
    }

    /// Shape `text` into a new run: split into font ranges, shape each,
    /// record missing glyphs for uncovered ranges, then normalize the
    /// glyph-run structure.
    pub fn make_text_run(
        &self,
        text: &str,
        app_units_per_dev_unit: i32,
        flags: RunFlags,
    ) -> TextRun {
        let chars: Arc<[char]> = text.chars().collect();
        let mut run = TextRun::new(
            Arc::clone(&chars),
            app_units_per_dev_unit,
            flags,
            self.generation(),
        );
        if chars.is_empty() {
            return run;
        }

        let ranges = self.compute_ranges(&chars);
        for (i, range) in ranges.iter().enumerate() {
            match &range.font {
                Some(font) => shaper::shape_range(&mut run, range.start, range.end, font),
                None => {
                    // No font anywhere: keep a font attached anyway so
                    // missing-glyph boxes have metrics to draw with.
                    let font = ranges[..i]
                        .iter()
                        .rev()
                        .find_map(|r| r.font.as_ref())
                        .unwrap_or(self.primary_font());
                    run.add_glyph_run(Arc::clone(font), range.start, false);
                    for index in range.start..range.end {
                        let ch = run.get_char(index);
                        if is_invalid_char(ch) {
                            run.set_blank_glyph(index);
                        } else {
                            run.set_missing_glyph(index, ch);
                        }
                    }
                }
            }
        }

        run.sort_glyph_runs();
        run.sanitize_glyph_runs();
        run.adjust_advances_for_synthetic_bold(0, run.len());
        run
    }

    pub fn make_empty_text_run(&self, app_units_per_dev_unit: i32, flags: RunFlags) -> TextRun {
        TextRun::new(Arc::from([]), app_units_per_dev_unit, flags, self.generation())
    }

    /// A one-space run. At size 0 only the glyph-run structure is
    /// recorded; there is nothing to render.
    pub fn make_space_text_run(&self, app_units_per_dev_unit: i32, flags: RunFlags) -> TextRun {
        let mut run = TextRun::new(
            Arc::from([' ']),
            app_units_per_dev_unit,
            flags,
            self.generation(),
        );
        let font = Arc::clone(self.primary_font());
        if self.style.size == 0.0 {
            run.add_glyph_run(font, 0, false);
        } else if !run.set_space_glyph(&font, 0) {
            shaper::shape_range(&mut run, 0, 1, &font);
        }
        run
    }
}

/// Construct a font, resurrecting a shared one from the cache when the
/// same face name and style were built before.
fn cached_font(cache: Option<&FontCache>, entry: Arc<dyn FontEntry>, style: &FontStyle) -> Arc<Font> {
    let Some(cache) = cache else {
        return Arc::new(Font::new(entry, style.clone()));
    };
    if let Some(font) = cache.lookup(entry.name(), style) {
        return font;
    }
    let font = Arc::new(Font::new(entry, style.clone()));
    cache.insert(Arc::clone(&font));
    font
}

fn same_font(a: Option<&Arc<Font>>, b: Option<&Arc<Font>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Walk a CSS font-family list: quoted names taken verbatim, unquoted
/// names trimmed, generics expanded through the preference tables.
fn for_each_family(
    families: &str,
    prefs: &FontPrefs,
    language: &str,
    callback: &mut dyn FnMut(&str),
) {
    let mut rest = families;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return;
        }
        let name;
        if let Some(quote) = rest.chars().next().filter(|c| *c == '\'' || *c == '"') {
            let body = &rest[1..];
            let Some(close) = body.find(quote) else {
                return;
            };
            name = &body[..close];
            rest = body[close + 1..]
                .split_once(',')
                .map(|(_, tail)| tail)
                .unwrap_or("");
            if !name.is_empty() {
                callback(name);
            }
        } else {
            let (head, tail) = rest.split_once(',').unwrap_or((rest, ""));
            rest = tail;
            name = head.trim();
            if name.is_empty() {
                continue;
            }
            let lower = name.to_ascii_lowercase();
            if FontPrefs::is_generic(&lower) {
                for family in prefs.families_for_generic(&lower, language) {
                    callback(family);
                }
            } else {
                callback(name);
            }
        }
    }
}
