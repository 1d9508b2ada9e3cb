//! arXiv source backed by the Atom export API.

use async_trait::async_trait;
use feed_rs::parser;
use serde_json::Value;

use crate::client::ApiClient;
use crate::models::{join_or_na, ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{collapse_whitespace, HttpClient, RetryPolicy};

/// arXiv export API base URL
pub const ARXIV_API_BASE: &str = "http://export.arxiv.org/api";

/// arXiv PDF base URL
const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

/// arXiv caps a single page at this many entries
const MAX_PAGE: usize = 200;

/// arXiv research source
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: ApiClient,
}

impl ArxivSource {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self::with_client(ApiClient::new(http, base_url))
    }

    /// Create with a preconfigured API client (for testing)
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Replace the retry policy used for every request of this source
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    fn build_request(query: &SearchQuery) -> ApiRequest {
        let search_query = if query.query.trim().is_empty() {
            "all:*".to_string()
        } else {
            format!("all:{}", query.query.trim())
        };

        ApiRequest::get("query")
            .param("search_query", search_query)
            .param("start", 0)
            .param("max_results", query.max_results.min(MAX_PAGE))
            .param("sortBy", "relevance")
            .param("sortOrder", "descending")
    }

    /// Convert one Atom entry into a record
    fn parse_entry(entry: &feed_rs::model::Entry) -> RawRecord {
        let paper_id = entry
            .id
            .split("/abs/")
            .last()
            .unwrap_or(entry.id.as_str())
            .to_string();

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .unwrap_or_default();

        let summary = entry
            .summary
            .as_ref()
            .map(|s| collapse_whitespace(&s.content))
            .unwrap_or_default();

        let authors: Vec<Value> = entry
            .authors
            .iter()
            .map(|a| Value::String(a.name.clone()))
            .collect();

        let categories: Vec<Value> = entry
            .categories
            .iter()
            .map(|c| Value::String(c.term.clone()))
            .collect();

        let published = entry
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        RawRecord::new()
            .with("entry_id", entry.id.clone())
            .with("title", title)
            .with("summary", summary)
            .with("authors", authors)
            .with("categories", categories)
            .with("published", published)
            .with("pdf_url", format!("{}/{}", ARXIV_PDF_URL, paper_id))
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn description(&self) -> &str {
        "A wrapper around Arxiv.org. Useful for when you need to answer questions about Physics, \
         Mathematics, Computer Science, Quantitative Biology, Quantitative Finance, Statistics, \
         Electrical Engineering, and Economics from scientific articles on arxiv.org. \
         Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let body = self.client.send_text(&Self::build_request(query)).await?;

        let feed = parser::parse(body.as_bytes())
            .map_err(|e| SourceError::Decode(format!("Failed to parse Atom feed: {}", e)))?;

        let records: Vec<RawRecord> = feed
            .entries
            .iter()
            .take(query.max_results)
            .map(Self::parse_entry)
            .collect();

        tracing::debug!("arXiv returned {} entries", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        format!(
            "Published: {}\nTitle: {}\nAuthors: {}\nSummary: {}",
            record.text_or_na("published"),
            record.text_or_na("title"),
            join_or_na(record.strings("authors")),
            record.text_or_na("summary")
        )
    }
}
