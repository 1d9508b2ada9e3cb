//! DuckDuckGo web source using the keyless HTML endpoint.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::client::ApiClient;
use crate::models::{ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{collapse_whitespace, HttpClient, RetryPolicy};

/// DuckDuckGo HTML endpoint
pub const DUCKDUCKGO_HTML_BASE: &str = "https://html.duckduckgo.com";

/// DuckDuckGo web source
#[derive(Debug, Clone)]
pub struct DuckDuckGoSource {
    client: ApiClient,
}

impl DuckDuckGoSource {
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

    /// Resolve the `//duckduckgo.com/l/?uddg=<target>` redirect to its target
    fn resolve_link(href: &str) -> String {
        let absolute = if href.starts_with("//") {
            format!("https:{}", href)
        } else {
            href.to_string()
        };

        url::Url::parse(&absolute)
            .ok()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "uddg")
                    .map(|(_, target)| target.into_owned())
            })
            .unwrap_or(absolute)
    }

    /// Parse the results page into `{title, url, snippet}` records
    fn parse_results(html: &str, max_results: usize) -> Result<Vec<RawRecord>, SourceError> {
        let document = Html::parse_document(html);

        let selector = |css: &str| {
            Selector::parse(css)
                .map_err(|e| SourceError::Decode(format!("Invalid selector '{}': {:?}", css, e)))
        };
        let result_selector = selector("div.result")?;
        let link_selector = selector("a.result__a")?;
        let snippet_selector = selector(".result__snippet")?;

        let mut records = Vec::new();

        for result in document.select(&result_selector) {
            if result.value().classes().any(|class| class == "result--ad") {
                continue;
            }

            let Some(link) = result.select(&link_selector).next() else {
                continue;
            };

            let title = collapse_whitespace(&link.text().collect::<String>());
            let url = link
                .value()
                .attr("href")
                .map(Self::resolve_link)
                .unwrap_or_default();
            let snippet = result
                .select(&snippet_selector)
                .next()
                .map(|s| collapse_whitespace(&s.text().collect::<String>()))
                .unwrap_or_default();

            records.push(
                RawRecord::new()
                    .with("title", title)
                    .with("url", url)
                    .with("snippet", snippet),
            );

            if records.len() >= max_results {
                break;
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl Source for DuckDuckGoSource {
    fn id(&self) -> &str {
        "duckduckgo"
    }

    fn name(&self) -> &str {
        "DuckDuckGo"
    }

    fn description(&self) -> &str {
        "A wrapper around DuckDuckGo Search. Useful for when you need to answer questions \
         about current events. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let request = ApiRequest::post("html/").form([("q", query.query.as_str())]);
        let html = self.client.send_text(&request).await?;

        let records = Self::parse_results(&html, query.max_results)?;
        tracing::debug!("DuckDuckGo returned {} results", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        format!(
            "Title: {}\nURL: {}\nSnippet: {}",
            record.text_or_na("title"),
            record.text_or_na("url"),
            record.text_or_na("snippet")
        )
    }
}
