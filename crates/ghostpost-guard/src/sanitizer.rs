//! Layers 1+2: input sanitization and content isolation.
//!
//! `sanitize_html` strips comment/script/style constructs and event-handler
//! attributes, decodes entities, and collapses whitespace. `sanitize_plain`
//! strips control characters and Unicode bidi/zero-width format characters.
//! Isolation markers form the visible trust boundary around untrusted email
//! bodies in agent-facing markdown.

use std::sync::LazyLock;

use regex::Regex;

/// Start marker wrapped around untrusted email content.
pub const ISOLATION_START: &str = "=== UNTRUSTED EMAIL CONTENT START ===";

/// End marker wrapped around untrusted email content.
pub const ISOLATION_END: &str = "=== UNTRUSTED EMAIL CONTENT END ===";

static HTML_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static COMMENT_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--?|-->").expect("valid regex"));

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));

static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));

static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\s+on\w+\s*=\s*["'][^"']*["']"#).expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(\d+)|#[xX]([0-9a-fA-F]+)|([a-zA-Z][a-zA-Z0-9]*));").expect("valid regex")
});

static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));

static FORMAT_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x{200B}-\x{200F}\x{202A}-\x{202E}\x{2066}-\x{2069}\x{FEFF}]")
        .expect("valid regex")
});

/// Named entities decoded by `sanitize_html`. Covers the set that actually
/// shows up in mail bodies; unknown entities are left untouched.
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("hellip", '\u{2026}'),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("trade", '\u{2122}'),
];

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| {
                    NAMED_ENTITIES
                        .iter()
                        .find(|(n, _)| *n == name.as_str())
                        .map(|(_, c)| *c)
                })
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Strip HTML comments, script/style tags and event handlers, decode
/// entities, and normalize whitespace. Absent input yields an empty string.
#[must_use]
pub fn sanitize_html(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    if text.is_empty() {
        return String::new();
    }

    // Remove comments iteratively to handle nested/malformed nesting like
    // `<!-- <!-- x --> -->`, which a single pass leaves half-open.
    let mut current = text.to_string();
    loop {
        let stripped = HTML_COMMENT_RE.replace_all(&current, "").into_owned();
        if stripped == current {
            break;
        }
        current = stripped;
    }

    let current = COMMENT_FRAGMENT_RE.replace_all(&current, "");
    let current = SCRIPT_RE.replace_all(&current, "");
    let current = STYLE_RE.replace_all(&current, "");
    let current = EVENT_HANDLER_RE.replace_all(&current, "");
    let current = decode_entities(&current);
    let current = WHITESPACE_RE.replace_all(&current, " ");
    current.trim().to_string()
}

/// Strip C0 control characters (except tab and newline), DEL, and Unicode
/// bidi/zero-width format characters. Absent input yields an empty string.
#[must_use]
pub fn sanitize_plain(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    if text.is_empty() {
        return String::new();
    }

    let stripped = CONTROL_RE.replace_all(text, "");
    let stripped = FORMAT_CHARS_RE.replace_all(&stripped, "");
    stripped.trim().to_string()
}

/// Wrap email content in isolation markers for LLM consumption.
#[must_use]
pub fn isolate_content(text: &str) -> String {
    format!("{ISOLATION_START}\n{text}\n{ISOLATION_END}")
}

/// True iff both isolation markers are present.
#[must_use]
pub fn is_isolated(text: &str) -> bool {
    text.contains(ISOLATION_START) && text.contains(ISOLATION_END)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn absent_input_is_empty() {
        assert_eq!(sanitize_html(None), "");
        assert_eq!(sanitize_plain(None), "");
        assert_eq!(sanitize_html(Some("")), "");
        assert_eq!(sanitize_plain(Some("")), "");
    }

    #[test]
    fn strips_comments_to_fixed_point() {
        let out = sanitize_html(Some("a <!-- <!-- nested --> --> b"));
        assert!(!out.contains("<!--"));
        assert!(!out.contains("-->"));
        assert_eq!(out, "a b");
    }

    #[test]
    fn strips_orphan_comment_fragments() {
        let out = sanitize_html(Some("before <!-- dangling"));
        assert!(!out.contains("<!--"));
        assert_eq!(out, "before dangling");
    }

    #[test]
    fn strips_script_tags_case_insensitive_multiline() {
        let out = sanitize_html(Some("x <SCRIPT type=\"a\">\nalert(1)\n</ScRiPt> y"));
        assert!(!out.to_lowercase().contains("<script"));
        assert_eq!(out, "x y");
    }

    #[test]
    fn strips_style_tags() {
        let out = sanitize_html(Some("x <style>body { color: red }</style> y"));
        assert!(!out.contains("<style"));
        assert_eq!(out, "x y");
    }

    #[test]
    fn strips_event_handlers() {
        let out = sanitize_html(Some(r#"<img src="a.png" onerror="alert(1)">"#));
        assert!(!out.contains("onerror"));

        let out = sanitize_html(Some("<div onclick='do()'>hi</div>"));
        assert!(!out.contains("onclick"));
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(sanitize_html(Some("a &amp; b")), "a & b");
        assert_eq!(sanitize_html(Some("x &#65; y")), "x A y");
        assert_eq!(sanitize_html(Some("x &#x41; y")), "x A y");
        // Unknown entities survive untouched.
        assert_eq!(sanitize_html(Some("&bogus123;")), "&bogus123;");
        // Single-pass decode: double-escaped stays escaped once.
        assert_eq!(sanitize_html(Some("&amp;lt;")), "&lt;");
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(sanitize_html(Some("  a \n\n  b\t c  ")), "a b c");
    }

    #[test]
    fn plain_strips_control_chars_keeps_tab_newline() {
        let out = sanitize_plain(Some("a\x00b\x07c\td\ne"));
        assert_eq!(out, "abc\td\ne");
    }

    #[test]
    fn plain_strips_del() {
        assert_eq!(sanitize_plain(Some("a\x7fb")), "ab");
    }

    #[test]
    fn plain_strips_bidi_and_zero_width() {
        let input = "a\u{200b}b\u{200f}c\u{202e}d\u{2066}e\u{feff}f";
        assert_eq!(sanitize_plain(Some(input)), "abcdef");
    }

    #[test]
    fn isolation_round_trip() {
        let wrapped = isolate_content("hello");
        assert!(is_isolated(&wrapped));
        assert!(wrapped.starts_with(ISOLATION_START));
        assert!(wrapped.ends_with(ISOLATION_END));
        assert!(!is_isolated("hello"));
    }

    #[test]
    fn markers_survive_sanitization() {
        let wrapped = isolate_content("some content");
        assert!(is_isolated(&sanitize_plain(Some(&wrapped))));
    }

    proptest! {
        // Entity decoding can legitimately reintroduce literal `<` from
        // encoded input, so the no-dangerous-substring property is stated
        // over inputs without `&`.
        #[test]
        fn html_output_has_no_dangerous_substrings(input in "[^&]{0,200}") {
            let out = sanitize_html(Some(&input));
            let lower = out.to_lowercase();
            prop_assert!(!lower.contains("<script"));
            prop_assert!(!lower.contains("<style"));
            prop_assert!(!out.contains("<!--"));
            prop_assert!(!out.contains("-->"));
        }

        #[test]
        fn plain_output_has_no_forbidden_codepoints(input in "\\PC{0,200}") {
            let out = sanitize_plain(Some(&input));
            for c in out.chars() {
                let u = c as u32;
                prop_assert!(!(u < 0x20 && c != '\t' && c != '\n'), "control {u:#x} survived");
                prop_assert!(u != 0x7f, "DEL survived");
                prop_assert!(!(0x200b..=0x200f).contains(&u), "zero-width {u:#x} survived");
                prop_assert!(!(0x202a..=0x202e).contains(&u), "bidi {u:#x} survived");
                prop_assert!(!(0x2066..=0x2069).contains(&u), "bidi isolate {u:#x} survived");
                prop_assert!(u != 0xfeff, "BOM survived");
            }
        }

        #[test]
        fn isolation_always_round_trips(input in "\\PC{0,200}") {
            prop_assert!(is_isolated(&isolate_content(&input)));
        }
    }
}
