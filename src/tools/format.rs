//! Records to bounded plain text.

use crate::models::RawRecord;
use crate::utils::truncate_chars;

/// Returned verbatim when a search produced no records
pub const NO_RESULTS: &str = "No good result was found";

/// Default character budget for a tool's output
pub const DEFAULT_MAX_CHARS: usize = 4000;

/// Joins rendered records and enforces a character budget.
///
/// Each record is rendered by a caller-supplied function (one block of
/// labelled lines), blocks are joined with `separator`, and the joined text
/// is cut to `max_chars` characters, even mid-word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFormatter {
    pub max_chars: usize,
    pub separator: String,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl ResultFormatter {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            separator: "\n\n".to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Render, join and truncate. Zero records yields exactly [`NO_RESULTS`].
    pub fn format<F>(&self, records: &[RawRecord], render: F) -> String
    where
        F: Fn(&RawRecord) -> String,
    {
        if records.is_empty() {
            return NO_RESULTS.to_string();
        }

        let joined = records
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(&self.separator);

        truncate_chars(&joined, self.max_chars).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn render_title(record: &RawRecord) -> String {
        format!("Title: {}", record.text_or_na("title"))
    }

    #[test]
    fn test_empty_input_returns_sentinel() {
        let formatter = ResultFormatter::new(10);
        assert_eq!(formatter.format(&[], render_title), NO_RESULTS);
    }

    #[test]
    fn test_blocks_joined_by_blank_line() {
        let records = vec![
            RawRecord::new().with("title", "First"),
            RawRecord::new().with("title", "Second"),
        ];
        let text = ResultFormatter::default().format(&records, render_title);
        assert_eq!(text, "Title: First\n\nTitle: Second");
    }

    #[test]
    fn test_custom_separator_and_missing_field() {
        let records = vec![RawRecord::new(), RawRecord::new().with("title", "B")];
        let text = ResultFormatter::default()
            .with_separator("\n\n---\n\n")
            .format(&records, render_title);
        assert_eq!(text, "Title: N/A\n\n---\n\nTitle: B");
    }

    #[test]
    fn test_hard_truncation() {
        let records = vec![RawRecord::new().with("title", "abcdefghijklmnop")];
        let text = ResultFormatter::new(10).format(&records, render_title);
        assert_eq!(text, "Title: abc");
    }

    proptest! {
        #[test]
        fn prop_output_never_exceeds_budget(
            titles in proptest::collection::vec(".{0,200}", 1..8),
            max_chars in 0usize..600,
        ) {
            let records: Vec<RawRecord> = titles
                .into_iter()
                .map(|t| RawRecord::new().with("title", t))
                .collect();
            let text = ResultFormatter::new(max_chars).format(&records, render_title);
            prop_assert!(text.chars().count() <= max_chars);
        }
    }
}
