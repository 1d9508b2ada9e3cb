//! Patsnap (Zhihuiya) patent source.
//!
//! Every call carries an OAuth bearer credential obtained with the
//! client-credentials grant plus the `apikey` query parameter. A search
//! returns lightweight hits; the detail flags decide which secondary
//! lookups enrich each hit before it is rendered.

use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;
use serde_json::{json, Value};

use crate::client::{ApiClient, ApiKey, ClientCredentialsExchange, TokenProvider};
use crate::models::{value_text, ApiRequest, RawRecord, SearchQuery, NOT_AVAILABLE};
use crate::sources::{enrich_records, Source, SourceError, DEFAULT_CLAIMS_MAX_CHARS};
use crate::utils::{html_to_text, truncate_chars, HttpClient, RetryPolicy};

/// Patsnap open platform base URL
pub const PATSNAP_API_BASE: &str = "https://connect.zhihuiya.com";

const SEARCH_ENDPOINT: &str = "search/patent/query-search-patent/v2";
const SIMILAR_ENDPOINT: &str = "search/patent/similar-search-patent/v2";
const BIBLIOGRAPHY_ENDPOINT: &str = "basic-patent-data/simple-bibliography";
const CLAIMS_ENDPOINT: &str = "basic-patent-data/claim-data";
const CORE_POINTS_ENDPOINT: &str = "search/patent/patent-core-invention-points";
const LEGAL_STATUS_ENDPOINT: &str = "basic-patent-data/legal-status";

/// Authorities preferred when collapsing patent families
const COLLAPSE_AUTHORITIES: [&str; 5] = ["CN", "US", "EP", "JP", "KR"];

/// Fallback language order for multilingual fields
const LANGUAGE_PREFERENCE: [&str; 3] = ["EN", "CN", "JP"];

/// Fields printed in the fixed header of every block
const HEADER_FIELDS: [&str; 6] = [
    "patent_id",
    "pn",
    "title",
    "inventor",
    "current_assignee",
    "abstract",
];

bitflags! {
    /// Secondary lookups run for every search hit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PatentDetails: u8 {
        const TITLE_ABSTRACT = 1;
        const CLAIMS = 1 << 1;
        const CORE_INVENTION_POINTS = 1 << 2;
        const LEGAL_STATUS = 1 << 3;
    }
}

impl Default for PatentDetails {
    fn default() -> Self {
        PatentDetails::TITLE_ABSTRACT | PatentDetails::CORE_INVENTION_POINTS
    }
}

/// Patsnap patent source
#[derive(Debug, Clone)]
pub struct PatsnapSource {
    client: ApiClient,
    details: PatentDetails,
    lang: String,
    sort: Option<Value>,
    claims_max_chars: usize,
    detail_concurrency: usize,
}

impl PatsnapSource {
    /// Create a source that exchanges `api_key`/`api_secret` for a bearer
    /// credential at `token_url`
    pub fn new(
        http: HttpClient,
        base_url: &str,
        token_url: &str,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        let exchange =
            ClientCredentialsExchange::new(http.clone(), token_url, api_key.clone(), api_secret);
        let provider = Arc::new(TokenProvider::new(Arc::new(exchange)));

        let client = ApiClient::new(http, base_url)
            .with_token_provider(provider)
            .with_optional_api_key(api_key.map(|key| ApiKey::query("apikey", key)));
        Self::with_client(client)
    }

    /// Create with a preconfigured API client (for testing)
    pub fn with_client(client: ApiClient) -> Self {
        Self {
            client,
            details: PatentDetails::default(),
            lang: "en".to_string(),
            sort: None,
            claims_max_chars: DEFAULT_CLAIMS_MAX_CHARS,
            detail_concurrency: 1,
        }
    }

    /// Replace the retry policy used for every request of this source
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    pub fn with_details(mut self, details: PatentDetails) -> Self {
        self.details = details;
        self
    }

    /// Preferred language for titles, abstracts and claims
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Sort order, e.g. `[{"field": "PBDT_YEARMONTHDAY", "order": "desc"}]`;
    /// `None` keeps relevance order
    pub fn with_sort(mut self, sort: Option<Value>) -> Self {
        self.sort = sort;
        self
    }

    /// Character budget of the rendered claims
    pub fn with_claims_max_chars(mut self, max_chars: usize) -> Self {
        self.claims_max_chars = max_chars;
        self
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    /// Unwrap the `{error_code, error_msg, data}` envelope
    fn check_envelope(response: Value) -> Result<Value, SourceError> {
        let code = response
            .get("error_code")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if code != 0 {
            let message = response
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            tracing::error!("Patsnap returned error_code {}: {}", code, message);
            return Err(SourceError::Api { code, message });
        }
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    fn build_search_body(&self, query: &SearchQuery) -> Value {
        json!({
            "sort": self.sort,
            "limit": query.max_results,
            "offset": 0,
            "stemming": 0,
            "query_text": query.query,
            "collapse_type": null,
            "collapse_by": null,
            "collapse_order": null,
            "collapse_order_authority": COLLAPSE_AUTHORITIES,
        })
    }

    /// Patents similar to a known one, most similar first
    pub async fn similar_search(
        &self,
        patent_id: &str,
        patent_number: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let body = json!({
            "limit": limit,
            "offset": 0,
            "apd_from": "*",
            "apd_to": "*",
            "pbd_from": "*",
            "pbd_to": "*",
            "country": null,
            "patent_id": patent_id,
            "patent_number": patent_number,
            "relevancy": "50%",
        });

        let response = self
            .client
            .send(&ApiRequest::post(SIMILAR_ENDPOINT).json(body))
            .await?;
        let data = Self::check_envelope(response)?;
        Ok(RawRecord::from_array(data.get("results")))
    }

    /// GET a `basic-patent-data` endpoint and return the first data item
    async fn fetch_patent_data(
        &self,
        endpoint: &str,
        patent_id: &str,
        patent_number: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Result<RawRecord, SourceError> {
        let mut request = ApiRequest::get(endpoint).param("patent_id", patent_id);
        if let Some(pn) = patent_number {
            request = request.param("patent_number", pn);
        }
        for (key, value) in extra {
            request = request.param(*key, value);
        }

        let data = Self::check_envelope(self.client.send(&request).await?)?;
        first_item(&data)
    }

    async fn fetch_title_abstract(
        &self,
        patent_id: &str,
        patent_number: Option<&str>,
    ) -> Result<RawRecord, SourceError> {
        let item = self
            .fetch_patent_data(BIBLIOGRAPHY_ENDPOINT, patent_id, patent_number, &[])
            .await?;
        let bibliography = item.object("bibliographic_data").unwrap_or_default();

        Ok(RawRecord::new()
            .with(
                "patent_type",
                bibliography.text("patent_type").unwrap_or_default(),
            )
            .with(
                "title",
                text_by_lang(bibliography.list("invention_title"), &self.lang, "text"),
            )
            .with(
                "abstract",
                text_by_lang(bibliography.list("abstracts"), &self.lang, "text"),
            ))
    }

    async fn fetch_claims(
        &self,
        patent_id: &str,
        patent_number: Option<&str>,
    ) -> Result<RawRecord, SourceError> {
        let item = self
            .fetch_patent_data(
                CLAIMS_ENDPOINT,
                patent_id,
                patent_number,
                &[("replace_by_related", "0")],
            )
            .await?;
        let claims_html = text_by_lang(item.list("claims"), &self.lang, "claim_text");

        Ok(RawRecord::new()
            .with("claims", html_to_text(&claims_html))
            .with(
                "claim_count",
                item.get("claim_count").cloned().unwrap_or(json!(0)),
            ))
    }

    async fn fetch_core_invention_points(
        &self,
        patent_id: &str,
        patent_number: Option<&str>,
    ) -> Result<RawRecord, SourceError> {
        let body = json!({
            "patent_id": patent_id,
            "pn": patent_number,
            "lang": self.lang.to_lowercase(),
        });
        let response = self
            .client
            .send(&ApiRequest::post(CORE_POINTS_ENDPOINT).json(body))
            .await?;
        let item = first_item(&Self::check_envelope(response)?)?;

        let sentences = |key: &str| -> Value {
            item.object(key)
                .and_then(|section| section.get("sentence").cloned())
                .unwrap_or_else(|| json!([]))
        };

        Ok(RawRecord::new()
            .with("core_invention_points", sentences("core_invention_points"))
            .with("enhancement_proposals", sentences("enhancement_proposals")))
    }

    async fn fetch_legal_status(
        &self,
        patent_id: &str,
        patent_number: Option<&str>,
    ) -> Result<RawRecord, SourceError> {
        let item = self
            .fetch_patent_data(LEGAL_STATUS_ENDPOINT, patent_id, patent_number, &[])
            .await?;
        let legal = item.object("patent_legal").unwrap_or_default();
        let field = |key: &str| legal.get(key).cloned().unwrap_or_else(|| json!([]));

        Ok(RawRecord::new()
            .with("event_status", field("event_status"))
            .with("legal_status", field("legal_status"))
            .with("simple_legal_status", field("simple_legal_status")))
    }

    /// Run the selected lookups for one hit.
    ///
    /// A successful lookup overwrites the hit's fields; a failed one only
    /// fills the fields the hit is missing with empty values.
    async fn attach_details(&self, mut record: RawRecord) -> RawRecord {
        let Some(patent_id) = record.text("patent_id") else {
            return record;
        };
        let pn = record.text("pn");
        let pn = pn.as_deref();

        if self.details.contains(PatentDetails::TITLE_ABSTRACT) {
            let result = self.fetch_title_abstract(&patent_id, pn).await;
            apply(&mut record, &patent_id, "title/abstract", result, || {
                RawRecord::new()
                    .with("patent_type", "")
                    .with("title", "")
                    .with("abstract", "")
            });
        }

        if self.details.contains(PatentDetails::CLAIMS) {
            let result = self.fetch_claims(&patent_id, pn).await;
            apply(&mut record, &patent_id, "claims", result, || {
                RawRecord::new().with("claims", "").with("claim_count", 0)
            });
        }

        if self.details.contains(PatentDetails::CORE_INVENTION_POINTS) {
            let result = self.fetch_core_invention_points(&patent_id, pn).await;
            apply(&mut record, &patent_id, "core invention points", result, || {
                RawRecord::new()
                    .with("core_invention_points", json!([]))
                    .with("enhancement_proposals", json!([]))
            });
        }

        if self.details.contains(PatentDetails::LEGAL_STATUS) {
            let result = self.fetch_legal_status(&patent_id, pn).await;
            apply(&mut record, &patent_id, "legal status", result, || {
                RawRecord::new()
                    .with("event_status", json!([]))
                    .with("legal_status", json!([]))
                    .with("simple_legal_status", json!([]))
            });
        }

        record
    }
}

/// Merge a lookup result into `record`, degrading to `fallback` on error
fn apply<F>(
    record: &mut RawRecord,
    patent_id: &str,
    what: &str,
    result: Result<RawRecord, SourceError>,
    fallback: F,
) where
    F: FnOnce() -> RawRecord,
{
    match result {
        Ok(details) => record.merge(details),
        Err(e) => {
            tracing::warn!("Failed to fetch {} for patent {}: {}", what, patent_id, e);
            record.merge_missing(fallback());
        }
    }
}

/// First object of a `data` array
fn first_item(data: &Value) -> Result<RawRecord, SourceError> {
    RawRecord::from_array(Some(data))
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Decode("response data is empty".to_string()))
}

/// Pick the text of the preferred language from `[{lang, <key>}, ...]`.
///
/// `lang` is tried first, then EN, CN and JP; otherwise the first entry wins.
fn text_by_lang(content: &[Value], lang: &str, key: &str) -> String {
    let wanted = lang.to_uppercase();
    let preference = std::iter::once(wanted.as_str()).chain(LANGUAGE_PREFERENCE);

    let text_of = |item: &Value| item.get(key).and_then(Value::as_str).map(str::to_string);

    for language in preference {
        if let Some(text) = content
            .iter()
            .find(|item| {
                item.get("lang")
                    .and_then(Value::as_str)
                    .is_some_and(|l| l.eq_ignore_ascii_case(language))
            })
            .and_then(text_of)
        {
            return text;
        }
    }

    content.first().and_then(text_of).unwrap_or_default()
}

/// Render any field value for the trailing `KEY: value` lines
fn render_value(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| value_text(item).unwrap_or_else(|| item.to_string()))
                .filter(|s| !s.trim().is_empty())
                .collect();
            if parts.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                parts.join(", ")
            }
        }
        Value::Object(_) => value.to_string(),
        other => value_text(other).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}

#[async_trait]
impl Source for PatsnapSource {
    fn id(&self) -> &str {
        "patsnap"
    }

    fn name(&self) -> &str {
        "Patsnap"
    }

    fn description(&self) -> &str {
        "A wrapper around Patsnap. Useful for when you need to answer questions about patent \
         topics. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let request = ApiRequest::post(SEARCH_ENDPOINT).json(self.build_search_body(query));
        let data = Self::check_envelope(self.client.send(&request).await?)?;

        let mut patents = RawRecord::from_array(data.get("results"));
        patents.truncate(query.max_results);
        tracing::info!("Patsnap returned {} patents", patents.len());

        if patents.is_empty() || self.details.is_empty() {
            return Ok(patents);
        }

        Ok(
            enrich_records(patents, self.detail_concurrency, |patent| {
                self.attach_details(patent)
            })
            .await,
        )
    }

    fn format_record(&self, record: &RawRecord) -> String {
        let mut lines = vec![
            format!("Patent ID: {}", record.text_or_na("patent_id")),
            format!("Patent Number: {}", record.text_or_na("pn")),
            format!("Title: {}", record.text_or_na("title")),
            format!("Inventor: {}", record.text_or_na("inventor")),
            format!("Current Assignee: {}", record.text_or_na("current_assignee")),
            format!("Abstract: {}", record.text_or_na("abstract")),
        ];

        for (key, value) in record.iter() {
            if HEADER_FIELDS.contains(&key.as_str()) || key == "patent_number" {
                continue;
            }
            let rendered = render_value(value);
            let rendered = match key.as_str() {
                "claims" => truncate_chars(&rendered, self.claims_max_chars),
                _ => &rendered,
            };
            lines.push(format!(
                "{}: {}",
                key.replace('_', " ").to_uppercase(),
                rendered
            ));
        }

        lines.join("\n")
    }
}
