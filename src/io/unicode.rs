//! Unicode-aware text helpers.
//!
//! Normalization for content hashing, grapheme-safe truncation, and the
//! CJK-density check used for chunk-size scaling.

use unicode_segmentation::UnicodeSegmentation;

/// Characters stripped before hashing: BOM and zero-width code points.
const INVISIBLES: &[char] = &['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Normalizes text for content hashing: strips invisible code points,
/// collapses whitespace runs to single spaces, trims.
#[must_use]
pub fn normalize_for_hash(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !INVISIBLES.contains(c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` grapheme clusters, never splitting one.
#[must_use]
pub fn grapheme_truncate(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

/// Whether a character belongs to the main CJK ranges.
#[must_use]
pub const fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        | '\u{3400}'..='\u{4DBF}' // extension A
        | '\u{3040}'..='\u{30FF}' // hiragana + katakana
        | '\u{AC00}'..='\u{D7AF}' // hangul syllables
    )
}

/// Ratio of CJK characters among non-whitespace characters.
#[must_use]
pub fn cjk_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    cjk as f64 / total as f64
}

/// Whether the text is dense enough in CJK characters to warrant the
/// chunk-size multiplier.
#[must_use]
pub fn is_cjk_heavy(text: &str) -> bool {
    cjk_ratio(text) >= 0.3
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_for_hash("a  b\t\nc"), "a b c");
        assert_eq!(normalize_for_hash("  padded  "), "padded");
    }

    #[test]
    fn test_normalize_strips_invisibles() {
        assert_eq!(normalize_for_hash("\u{FEFF}hello\u{200B}world"), "helloworld");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize_for_hash("a \u{200B} b   c");
        assert_eq!(normalize_for_hash(&once), once);
    }

    #[test]
    fn test_grapheme_truncate() {
        assert_eq!(grapheme_truncate("hello", 3), "hel");
        assert_eq!(grapheme_truncate("héllo", 2), "hé");
        // Multi-codepoint grapheme is kept whole or dropped, never split.
        assert_eq!(grapheme_truncate("👨‍👩‍👧‍👦x", 1), "👨‍👩‍👧‍👦");
    }

    #[test_case("漢字テスト", true; "cjk text")]
    #[test_case("hello world", false; "latin text")]
    #[test_case("mixed 漢字 with english words here", false; "mostly latin")]
    fn test_cjk_heavy(text: &str, expected: bool) {
        assert_eq!(is_cjk_heavy(text), expected);
    }

    #[test]
    fn test_cjk_ratio_empty() {
        assert_eq!(cjk_ratio(""), 0.0);
        assert_eq!(cjk_ratio("   "), 0.0);
    }
}
