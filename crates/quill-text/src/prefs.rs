//! Font preference tables.
//!
//! Maps generic family names to concrete families per language, and
//! scripts to the fallback families tried when no font in a group covers
//! a character. Loadable from TOML; the built-in defaults lean on the
//! Noto families.

use hashbrown::HashMap;
use serde::Deserialize;

/// Language codes used for the merged CJK fallback ordering.
const CJK_LANGS: &[&str] = &["ja", "ko", "zh-cn", "zh-tw", "zh-hk"];

/// Marker returned by [`pref_lang_for_char`] for unified Han characters,
/// which several CJK languages share. It expands into the merged list in
/// [`FontPrefs::pref_lang_list`].
pub const LANG_CJK_AMBIGUOUS: &str = "zh";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FontPrefs {
    /// Generic family name -> language tag -> concrete family names.
    pub generic: HashMap<String, HashMap<String, Vec<String>>>,
    /// Language tag -> families tried for characters of that script.
    pub fallback: HashMap<String, Vec<String>>,
    /// Ordered accept-languages; drives the CJK ambiguity order.
    pub accept_languages: Vec<String>,
}

impl Default for FontPrefs {
    fn default() -> Self {
        let mut generic: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
        let western =
            |names: &[&str]| -> HashMap<String, Vec<String>> {
                let mut m = HashMap::new();
                m.insert(
                    "x-western".to_string(),
                    names.iter().map(|s| s.to_string()).collect(),
                );
                m
            };
        generic.insert("serif".into(), western(&["Noto Serif", "Times New Roman"]));
        generic.insert("sans-serif".into(), western(&["Noto Sans", "Arial"]));
        generic.insert(
            "monospace".into(),
            western(&["Noto Sans Mono", "Courier New"]),
        );
        generic.insert("cursive".into(), western(&["Comic Sans MS"]));
        generic.insert("fantasy".into(), western(&["Impact"]));

        let mut fallback: HashMap<String, Vec<String>> = HashMap::new();
        let mut fb = |lang: &str, names: &[&str]| {
            fallback.insert(lang.to_string(), names.iter().map(|s| s.to_string()).collect());
        };
        fb("ja", &["Noto Sans CJK JP"]);
        fb("ko", &["Noto Sans CJK KR"]);
        fb("zh-cn", &["Noto Sans CJK SC"]);
        fb("zh-tw", &["Noto Sans CJK TC"]);
        fb("zh-hk", &["Noto Sans CJK TC"]);
        fb("ar", &["Noto Naskh Arabic"]);
        fb("he", &["Noto Sans Hebrew"]);
        fb("el", &["Noto Sans"]);
        fb("th", &["Noto Sans Thai"]);
        fb("x-devanagari", &["Noto Sans Devanagari"]);
        fb("x-cyrillic", &["Noto Sans"]);

        FontPrefs {
            generic,
            fallback,
            accept_languages: vec!["en".to_string()],
        }
    }
}

impl FontPrefs {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn is_generic(name: &str) -> bool {
        matches!(
            name,
            "serif" | "sans-serif" | "monospace" | "cursive" | "fantasy"
        )
    }

    /// Concrete families for a generic name under a language, falling
    /// back to the western table.
    pub fn families_for_generic(&self, generic: &str, language: &str) -> &[String] {
        static EMPTY: Vec<String> = Vec::new();
        let Some(by_lang) = self.generic.get(generic) else {
            return &EMPTY;
        };
        by_lang
            .get(&language.to_ascii_lowercase())
            .or_else(|| by_lang.get("x-western"))
            .unwrap_or(&EMPTY)
    }

    pub fn fallback_families(&self, language: &str) -> &[String] {
        static EMPTY: Vec<String> = Vec::new();
        self.fallback.get(language).map(Vec::as_slice).unwrap_or(&EMPTY)
    }

    /// Ordered preference languages to try for a character's script.
    ///
    /// For unified Han the answer is ambiguous, so the whole CJK set is
    /// returned, ordered by the user's accept-languages, then the
    /// requesting style's language, then a fixed default order.
    pub fn pref_lang_list(&self, char_lang: &str, style_language: &str) -> Vec<String> {
        let mut langs: Vec<String> = Vec::new();
        let push = |lang: &str, langs: &mut Vec<String>| {
            let lang = lang.to_ascii_lowercase();
            if !langs.iter().any(|l| *l == lang) {
                langs.push(lang);
            }
        };
        if char_lang != LANG_CJK_AMBIGUOUS {
            push(char_lang, &mut langs);
            if !is_cjk_lang(char_lang) {
                return langs;
            }
        }
        let style_language = style_language.to_ascii_lowercase();
        if is_cjk_lang(&style_language) {
            push(&style_language, &mut langs);
        }
        for accept in &self.accept_languages {
            let accept = accept.to_ascii_lowercase();
            if is_cjk_lang(&accept) {
                push(&accept, &mut langs);
            }
        }
        for lang in CJK_LANGS {
            push(lang, &mut langs);
        }
        langs
    }
}

fn is_cjk_lang(lang: &str) -> bool {
    CJK_LANGS.contains(&lang)
}

/// Coarse script classification of a character, as a preference-table
/// language key. None means no script-specific table applies.
pub fn pref_lang_for_char(ch: char) -> Option<&'static str> {
    let cp = ch as u32;
    match cp {
        0x0370..=0x03FF => Some("el"),
        0x0400..=0x052F => Some("x-cyrillic"),
        0x0590..=0x05FF => Some("he"),
        0x0600..=0x06FF | 0x0750..=0x077F => Some("ar"),
        0x0900..=0x097F => Some("x-devanagari"),
        0x0E00..=0x0E7F => Some("th"),
        // Kana is unambiguously Japanese; Hangul unambiguously Korean.
        0x3040..=0x30FF | 0x31F0..=0x31FF => Some("ja"),
        0x1100..=0x11FF | 0xA960..=0xA97F | 0xAC00..=0xD7FF => Some("ko"),
        // Unified Han and CJK punctuation are shared across languages.
        0x2E80..=0x303F | 0x3400..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FFFD => {
            Some(LANG_CJK_AMBIGUOUS)
        }
        _ => None,
    }
}
