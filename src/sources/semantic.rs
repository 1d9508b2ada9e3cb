//! Semantic Scholar literature source.

use async_trait::async_trait;

use crate::client::{ApiClient, ApiKey};
use crate::models::{ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::tools::ResultFormatter;
use crate::utils::{HttpClient, RetryPolicy};

/// Semantic Scholar Graph API base URL
pub const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Fields requested for every paper
const PAPER_FIELDS: &str = "paperId,title,abstract,year,referenceCount,citationCount,url,authors,venue,publicationTypes,publicationDate";

/// Semantic Scholar literature source
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: ApiClient,
}

impl SemanticScholarSource {
    /// Create a source; the API key is optional and raises the rate limit
    pub fn new(http: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        let client = ApiClient::new(http, base_url)
            .with_optional_api_key(api_key.map(|key| ApiKey::header("x-api-key", key)));
        Self::with_client(client)
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
        ApiRequest::get("paper/search")
            .param("query", &query.query)
            .param("limit", query.max_results)
            .param("fields", PAPER_FIELDS)
    }

    /// Content lines for the fields the paper actually has
    fn content_lines(record: &RawRecord) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(abstract_text) = record.text("abstract") {
            lines.push(format!("Abstract: {}", abstract_text));
        }

        let authors: Vec<String> = record
            .list("authors")
            .iter()
            .filter_map(|author| author.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect();
        if !authors.is_empty() {
            lines.push(format!("Authors: {}", authors.join(", ")));
        }

        if let Some(year) = record.text("year") {
            lines.push(format!("Year: {}", year));
        }
        if let Some(venue) = record.text("venue") {
            lines.push(format!("Venue: {}", venue));
        }
        if let Some(citations) = record.text("citationCount") {
            lines.push(format!("Citations: {}", citations));
        }
        if let Some(references) = record.text("referenceCount") {
            lines.push(format!("References: {}", references));
        }

        lines
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic_scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn description(&self) -> &str {
        "A wrapper around semantic scholar. Useful for when you need to answer questions about \
         academic papers, authors, citations and venues. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let response = self.client.send(&Self::build_request(query)).await?;

        let records = RawRecord::from_array(response.get("data"));
        tracing::debug!("Semantic Scholar returned {} papers", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        let content = Self::content_lines(record);
        format!(
            "Title: {}\nURL: {}\nContent:\n{}",
            record.text_or_na("title"),
            record.text_or_na("url"),
            if content.is_empty() {
                crate::models::NOT_AVAILABLE.to_string()
            } else {
                content.join("\n")
            }
        )
    }

    fn formatter(&self, max_chars: usize) -> ResultFormatter {
        ResultFormatter::new(max_chars).with_separator("\n\n---\n\n")
    }
}
