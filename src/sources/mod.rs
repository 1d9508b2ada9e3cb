//! Upstream search providers behind a common trait.
//!
//! This module defines the [`Source`] trait that every provider implements and
//! the [`SourceError`] enum shared by the whole request pipeline. A source
//! turns a [`SearchQuery`] into raw records and knows how to render one record
//! as labelled text; the tool layer in [`crate::tools`] does the rest.
//!
//! # Providers
//!
//! | id | category |
//! |----|----------|
//! | `tavily` | web |
//! | `duckduckgo` | web |
//! | `brave_search` | web |
//! | `arxiv` | web, literature |
//! | `pubmed` | literature |
//! | `semantic_scholar` | literature |
//! | `patents_view` | patent |
//! | `patsnap` | patent |
//!
//! # Engine Selection
//!
//! The provider behind each tool category is chosen at runtime with
//! environment variables (see [`crate::config::EngineConfig`]):
//!
//! ```bash
//! export SEARCH_API="brave_search"
//! export LITERATURE_SEARCH_API="semantic_scholar"
//! export PATENT_SEARCH_API="patents_view"
//! ```

mod arxiv;
mod brave;
mod duckduckgo;
pub mod mock;
mod patents_view;
mod patsnap;
mod pubmed;
mod registry;
mod semantic;
mod tavily;

pub use arxiv::{ArxivSource, ARXIV_API_BASE};
pub use brave::{BraveSearchSource, BRAVE_API_BASE};
pub use duckduckgo::{DuckDuckGoSource, DUCKDUCKGO_HTML_BASE};
pub use mock::MockSource;
pub use patents_view::{PatentsViewSource, DEFAULT_CLAIMS_MAX_CHARS, PATENTSVIEW_API_BASE};
pub use patsnap::{PatentDetails, PatsnapSource, PATSNAP_API_BASE};
pub use pubmed::{PubMedSource, PUBMED_API_BASE};
pub use registry::SourceRegistry;
pub use semantic::{SemanticScholarSource, SEMANTIC_API_BASE};
pub use tavily::{TavilySource, TAVILY_API_BASE};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::future::Future;

use crate::models::{RawRecord, SearchQuery};
use crate::tools::ResultFormatter;

/// The Source trait defines the interface for all search providers.
///
/// # Implementing a New Source
///
/// 1. Create a struct holding an [`ApiClient`](crate::client::ApiClient)
/// 2. Implement `search` to return one [`RawRecord`] per result
/// 3. Implement `format_record` to render the labelled block for one record
/// 4. Override `formatter` if the provider needs a different separator
/// 5. Add the source to [`SourceRegistry`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (matches the engine name, e.g. "pubmed")
    fn id(&self) -> &str;

    /// Human-readable name, used as the prefix of error text
    fn name(&self) -> &str;

    /// Tool description shown to the calling agent
    fn description(&self) -> &str;

    /// Search the provider and return one raw record per result
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError>;

    /// Render one record as a block of labelled lines
    fn format_record(&self, record: &RawRecord) -> String;

    /// Formatter used to join and truncate this source's blocks
    fn formatter(&self, max_chars: usize) -> ResultFormatter {
        ResultFormatter::new(max_chars)
    }
}

/// Run one secondary fetch per record, at most `concurrency` at a time.
///
/// Output order matches input order. `fetch` must not fail: a failed lookup
/// degrades its own fields and hands the record back.
pub(crate) async fn enrich_records<F, Fut>(
    records: Vec<RawRecord>,
    concurrency: usize,
    fetch: F,
) -> Vec<RawRecord>
where
    F: Fn(RawRecord) -> Fut,
    Fut: Future<Output = RawRecord>,
{
    stream::iter(records)
        .map(fetch)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Errors that can occur when talking to a provider
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Credential missing or the token exchange was rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Connection, DNS or timeout failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response; 429 is the rate-limit signal
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be decoded (JSON, XML, feed)
    #[error("Decode error: {0}")]
    Decode(String),

    /// 2xx response that carries an upstream error code
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Every attempt was rate limited
    #[error("Rate limited after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<SourceError>,
    },

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SourceError {
    /// Whether this error is the upstream rate-limit signal (HTTP 429)
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::Http { status: 429, .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Decode(format!("XML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let limited = SourceError::Http {
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        let server = SourceError::Http {
            status: 503,
            message: "unavailable".to_string(),
        };

        assert!(limited.is_rate_limited());
        assert!(!server.is_rate_limited());
        assert!(!SourceError::Transport("reset".to_string()).is_rate_limited());
    }

    #[test]
    fn test_error_display_keeps_upstream_message() {
        let err = SourceError::Http {
            status: 401,
            message: "invalid api key".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401: invalid api key");

        let exhausted = SourceError::RetryExhausted {
            attempts: 3,
            last: Box::new(SourceError::Http {
                status: 429,
                message: "slow down".to_string(),
            }),
        };
        assert!(exhausted.to_string().contains("3 attempts"));
        assert!(exhausted.to_string().contains("slow down"));
    }

    #[test]
    fn test_json_error_is_decode() {
        let err: SourceError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
