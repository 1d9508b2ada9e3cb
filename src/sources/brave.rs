//! Brave Search web source.

use async_trait::async_trait;

use crate::client::{ApiClient, ApiKey};
use crate::models::{ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{HttpClient, RetryPolicy};

/// Brave Search API base URL
pub const BRAVE_API_BASE: &str = "https://api.search.brave.com/res/v1";

/// Brave rejects `count` above this
const MAX_COUNT: usize = 20;

/// Brave Search web source
#[derive(Debug, Clone)]
pub struct BraveSearchSource {
    client: ApiClient,
}

impl BraveSearchSource {
    /// Create a source authenticated with a subscription token
    pub fn new(http: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        let client = ApiClient::new(http, base_url)
            .with_optional_api_key(api_key.map(|key| ApiKey::header("X-Subscription-Token", key)));
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
        let count = query.max_results.clamp(1, MAX_COUNT);
        if count < query.max_results {
            tracing::warn!(
                "Brave count {} exceeds API limit, capping to {}",
                query.max_results,
                count
            );
        }

        ApiRequest::get("web/search")
            .param("q", &query.query)
            .param("count", count)
    }
}

#[async_trait]
impl Source for BraveSearchSource {
    fn id(&self) -> &str {
        "brave_search"
    }

    fn name(&self) -> &str {
        "Brave Search"
    }

    fn description(&self) -> &str {
        "A search engine useful for answering questions about current events. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let response = self.client.send(&Self::build_request(query)).await?;

        let results = response.get("web").and_then(|web| web.get("results"));
        let mut records = RawRecord::from_array(results);
        records.truncate(query.max_results);

        tracing::debug!("Brave Search returned {} results", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        format!(
            "Title: {}\nURL: {}\nSnippet: {}",
            record.text_or_na("title"),
            record.text_or_na("url"),
            record.text_or_na("description")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_count_is_capped() {
        let request = BraveSearchSource::build_request(&SearchQuery::new("rust").max_results(50));
        assert!(request
            .query
            .contains(&("count".to_string(), "20".to_string())));
    }

    #[tokio::test]
    async fn test_search_reads_web_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/web/search")
            .match_header("x-subscription-token", "brave-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".to_string(), "rust async".to_string()),
                Matcher::UrlEncoded("count".to_string(), "2".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"web": {"results": [
                    {"title": "Tokio", "url": "https://tokio.rs", "description": "An async runtime"},
                    {"title": "async-std", "url": "https://async.rs"}
                ]}}"#,
            )
            .create_async()
            .await;

        let source = BraveSearchSource::new(
            HttpClient::new().unwrap(),
            &server.url(),
            Some("brave-key".to_string()),
        );
        let records = source
            .search(&SearchQuery::new("rust async").max_results(2))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            source.format_record(&records[0]),
            "Title: Tokio\nURL: https://tokio.rs\nSnippet: An async runtime"
        );
        assert!(source.format_record(&records[1]).ends_with("Snippet: N/A"));
        mock.assert_async().await;
    }
}
