//! Tavily web search source, including image results.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{ApiClient, ApiKey};
use crate::models::{ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{HttpClient, RetryPolicy};

/// Tavily API base URL
pub const TAVILY_API_BASE: &str = "https://api.tavily.com";

/// Tavily rejects `max_results` above this
const MAX_RESULTS: usize = 20;

/// Tavily web search source
#[derive(Debug, Clone)]
pub struct TavilySource {
    client: ApiClient,
    search_depth: String,
}

impl TavilySource {
    /// Create a source authenticated with a bearer API key
    pub fn new(http: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        let client = ApiClient::new(http, base_url).with_optional_api_key(api_key.map(ApiKey::bearer));
        Self::with_client(client)
    }

    /// Create with a preconfigured API client (for testing)
    pub fn with_client(client: ApiClient) -> Self {
        Self {
            client,
            search_depth: "advanced".to_string(),
        }
    }

    /// Replace the retry policy used for every request of this source
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    /// Use `basic` or `advanced` search depth
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    fn build_body(&self, query: &SearchQuery) -> Value {
        json!({
            "query": query.query,
            "max_results": query.max_results.clamp(1, MAX_RESULTS),
            "search_depth": self.search_depth,
            "include_raw_content": true,
            "include_images": true,
            "include_image_descriptions": true,
        })
    }

    /// Page results followed by image results, each tagged with `type`
    fn parse_response(response: &Value, max_results: usize) -> Vec<RawRecord> {
        let mut records: Vec<RawRecord> = RawRecord::from_array(response.get("results"))
            .into_iter()
            .take(max_results)
            .map(|record| record.with("type", "page"))
            .collect();

        let images = response
            .get("images")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for image in images {
            let record = match image {
                Value::String(url) => RawRecord::new().with("url", url.clone()),
                Value::Object(_) => match RawRecord::from_value(image.clone()) {
                    Some(record) => record,
                    None => continue,
                },
                _ => continue,
            };
            records.push(record.with("type", "image"));
        }

        records
    }
}

#[async_trait]
impl Source for TavilySource {
    fn id(&self) -> &str {
        "tavily"
    }

    fn name(&self) -> &str {
        "Tavily"
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted results. \
         Useful for when you need to answer questions about current events. \
         Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let request = ApiRequest::post("search").json(self.build_body(query));
        let response = self.client.send(&request).await?;

        let records = Self::parse_response(&response, query.max_results);
        tracing::debug!("Tavily returned {} records", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        if record.text("type").as_deref() == Some("image") {
            return format!(
                "Image: {}\nDescription: {}",
                record.text_or_na("url"),
                record.text_or_na("description")
            );
        }

        format!(
            "Title: {}\nURL: {}\nContent: {}",
            record.text_or_na("title"),
            record.text_or_na("url"),
            record.text_or_na("content")
        )
    }
}
