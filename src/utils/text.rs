//! Text helpers shared by the formatters.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();

fn whitespace() -> Option<&'static Regex> {
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

/// Cut `text` to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    match whitespace() {
        Some(re) => re.replace_all(text.trim(), " ").into_owned(),
        None => text.trim().to_string(),
    }
}

/// Convert an HTML fragment to plain text.
///
/// Each innermost `div` becomes one line. Fragments without any `div` fall
/// back to the text of the whole fragment.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);

    let lines: Vec<String> = match Selector::parse("div") {
        Ok(selector) => fragment
            .select(&selector)
            .filter(|div| {
                !div.descendants()
                    .skip(1)
                    .any(|node| node.value().as_element().is_some_and(|e| e.name() == "div"))
            })
            .map(|div| collapse_whitespace(&div.text().collect::<String>()))
            .filter(|line| !line.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };

    if lines.is_empty() {
        collapse_whitespace(&fragment.root_element().text().collect::<String>())
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_whitespace_pattern_is_compiled_once() {
        let first = whitespace().unwrap();
        assert_eq!(collapse_whitespace("a \n\n b"), "a b");
        assert!(std::ptr::eq(first, whitespace().unwrap()));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }

    #[test]
    fn test_html_to_text_joins_divs() {
        let html = r#"<div class="claim"><div class="claim-text">1. A method comprising a step.</div><div class="claim-text">2. The method of claim 1.</div></div>"#;
        assert_eq!(
            html_to_text(html),
            "1. A method comprising a step.\n2. The method of claim 1."
        );
    }

    #[test]
    fn test_html_to_text_without_divs() {
        assert_eq!(html_to_text("<p>plain <b>text</b></p>"), "plain text");
    }
}
