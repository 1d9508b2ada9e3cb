//! PatentsView patent source (USPTO PatentSearch API).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{ApiClient, ApiKey};
use crate::models::{join_or_na, ApiRequest, RawRecord, SearchQuery, NOT_AVAILABLE};
use crate::sources::{enrich_records, Source, SourceError};
use crate::utils::{truncate_chars, HttpClient, RetryPolicy};

/// PatentSearch API base URL
pub const PATENTSVIEW_API_BASE: &str = "https://search.patentsview.org/api/v1";

/// Default character budget for the claims of one patent
pub const DEFAULT_CLAIMS_MAX_CHARS: usize = 1000;

/// Fields requested from the `patent/` endpoint
const PATENT_FIELDS: [&str; 7] = [
    "patent_id",
    "patent_title",
    "patent_date",
    "inventors",
    "patent_abstract",
    "patent_type",
    "assignees",
];

/// PatentsView patent source
#[derive(Debug, Clone)]
pub struct PatentsViewSource {
    client: ApiClient,
    fetch_claims: bool,
    claims_max_chars: usize,
    detail_concurrency: usize,
}

impl PatentsViewSource {
    pub fn new(http: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            tracing::debug!("PatentsView API key not provided, requests will likely be rejected");
        }
        let client = ApiClient::new(http, base_url)
            .with_optional_api_key(api_key.map(|key| ApiKey::header("X-Api-Key", key)));
        Self::with_client(client)
    }

    /// Create with a preconfigured API client (for testing)
    pub fn with_client(client: ApiClient) -> Self {
        Self {
            client,
            fetch_claims: false,
            claims_max_chars: DEFAULT_CLAIMS_MAX_CHARS,
            detail_concurrency: 1,
        }
    }

    /// Replace the retry policy used for every request of this source
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    /// Fetch the claims of every result with one extra call per patent
    pub fn with_claims(mut self, fetch_claims: bool) -> Self {
        self.fetch_claims = fetch_claims;
        self
    }

    pub fn with_claims_max_chars(mut self, max_chars: usize) -> Self {
        self.claims_max_chars = max_chars;
        self
    }

    /// How many claim lookups may be in flight at once
    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    /// Full-text OR over title and abstract, newest first
    fn build_search_body(query: &SearchQuery) -> Value {
        let operator = if query.fuzzy {
            "_text_any"
        } else {
            "_text_phrase"
        };

        json!({
            "q": {
                "_or": [
                    {operator: {"patent_title": query.query}},
                    {operator: {"patent_abstract": query.query}}
                ]
            },
            "f": PATENT_FIELDS,
            "o": {"size": query.max_results},
            "s": [{"patent_date": "desc"}]
        })
    }

    fn build_claims_body(patent_id: &str) -> Value {
        json!({
            "q": {"_eq": {"patent_id": patent_id}},
            "f": ["claim_text", "claim_sequence"]
        })
    }

    /// Merge the patent's claims into the record, or degrade to no claims
    async fn attach_claims(&self, mut record: RawRecord) -> RawRecord {
        let Some(patent_id) = record.text("patent_id") else {
            return record;
        };

        let request = ApiRequest::post("g_claim/").json(Self::build_claims_body(&patent_id));
        match self.client.send(&request).await {
            Ok(response) => {
                record.insert(
                    "g_claims",
                    response.get("g_claims").cloned().unwrap_or(Value::Null),
                );
            }
            Err(e) => {
                tracing::warn!("Failed to fetch claims for patent {}: {}", patent_id, e);
                record.insert("g_claims", "");
            }
        }
        record
    }

    /// Flatten inventors, assignees and claims into display strings
    fn normalize(mut record: RawRecord) -> RawRecord {
        let inventors: Vec<Value> = record
            .list("inventors")
            .iter()
            .map(|inventor| {
                let first = inventor
                    .get("inventor_name_first")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let last = inventor
                    .get("inventor_name_last")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                format!("{} {}", first, last).trim().to_string()
            })
            .filter(|name| !name.is_empty())
            .map(Value::String)
            .collect();

        let assignees: Vec<Value> = record
            .list("assignees")
            .iter()
            .filter_map(|assignee| {
                let organization = assignee
                    .get("assignee_organization")
                    .and_then(Value::as_str)
                    .filter(|org| !org.is_empty())?;
                let city = assignee
                    .get("assignee_city")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let country = assignee
                    .get("assignee_country")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                Some(Value::String(format!("{} {},{}", organization, city, country)))
            })
            .collect();

        if record.contains("inventors") {
            record.insert("inventors", inventors);
        }
        if record.contains("assignees") {
            record.insert("assignees", assignees);
        }

        if let Some(Value::Array(claims)) = record.get("g_claims") {
            let mut claims = claims.clone();
            claims.sort_by_key(|claim| claim.get("claim_sequence").and_then(Value::as_i64).unwrap_or(0));
            let text = claims
                .iter()
                .filter_map(|claim| claim.get("claim_text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            record.insert("g_claims", text);
        }

        record
    }
}

#[async_trait]
impl Source for PatentsViewSource {
    fn id(&self) -> &str {
        "patents_view"
    }

    fn name(&self) -> &str {
        "PatentsView"
    }

    fn description(&self) -> &str {
        "A wrapper around the PatentsView patent search API. Useful for finding US patents by \
         keywords in their title or abstract. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let request = ApiRequest::post("patent/").json(Self::build_search_body(query));
        let response = self.client.send(&request).await?;

        let mut patents = RawRecord::from_array(response.get("patents"));
        patents.truncate(query.max_results);
        tracing::info!("PatentsView returned {} patents", patents.len());

        if self.fetch_claims {
            patents = enrich_records(patents, self.detail_concurrency, |patent| {
                self.attach_claims(patent)
            })
            .await;
        }

        Ok(patents.into_iter().map(Self::normalize).collect())
    }

    fn format_record(&self, record: &RawRecord) -> String {
        let claims = record.text_or_na("g_claims");
        let claims = truncate_chars(&claims, self.claims_max_chars);

        [
            format!("Patent ID: {}", record.text_or_na("patent_id")),
            format!("Title: {}", record.text_or_na("patent_title")),
            format!("Abstract: {}", record.text_or_na("patent_abstract")),
            format!("Publication Date: {}", record.text_or_na("patent_date")),
            format!("Assignees: {}", join_or_na(record.strings("assignees"))),
            format!("Inventors: {}", join_or_na(record.strings("inventors"))),
            "Claims:".to_string(),
            if claims.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                claims.to_string()
            },
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn source() -> PatentsViewSource {
        PatentsViewSource::with_client(ApiClient::new(
            HttpClient::new().unwrap(),
            PATENTSVIEW_API_BASE,
        ))
    }

    #[test]
    fn test_search_body_fuzzy_and_phrase() {
        let fuzzy = PatentsViewSource::build_search_body(&SearchQuery::new("solid state battery").max_results(3));
        assert_eq!(
            fuzzy["q"]["_or"][0],
            json!({"_text_any": {"patent_title": "solid state battery"}})
        );
        assert_eq!(fuzzy["o"], json!({"size": 3}));
        assert_eq!(fuzzy["s"], json!([{"patent_date": "desc"}]));

        let phrase = PatentsViewSource::build_search_body(&SearchQuery::new("x").fuzzy(false));
        assert_eq!(
            phrase["q"]["_or"][1],
            json!({"_text_phrase": {"patent_abstract": "x"}})
        );
    }

    #[test]
    fn test_normalize_assignees_inventors_claims() {
        let record = RawRecord::from_value(json!({
            "patent_id": "11000000",
            "inventors": [
                {"inventor_name_first": "Grace", "inventor_name_last": "Hopper"}
            ],
            "assignees": [
                {"assignee_organization": "Acme Corp", "assignee_city": "Austin", "assignee_country": "US"},
                {"assignee_organization": null, "assignee_city": "Nowhere", "assignee_country": "US"}
            ],
            "g_claims": [
                {"claim_text": "2. The method of claim 1.", "claim_sequence": 1},
                {"claim_text": "1. A method.", "claim_sequence": 0}
            ]
        }))
        .unwrap();

        let record = PatentsViewSource::normalize(record);
        assert_eq!(record.strings("inventors"), vec!["Grace Hopper"]);
        assert_eq!(record.strings("assignees"), vec!["Acme Corp Austin,US"]);
        assert_eq!(
            record.text_or_na("g_claims"),
            "1. A method.\n2. The method of claim 1."
        );
    }

    #[test]
    fn test_missing_fields_render_na() {
        let record = PatentsViewSource::normalize(
            RawRecord::new()
                .with("patent_id", "1")
                .with("patent_title", "Widget")
                .with("assignees", json!([])),
        );

        assert_eq!(
            source().format_record(&record),
            "Patent ID: 1\nTitle: Widget\nAbstract: N/A\nPublication Date: N/A\n\
             Assignees: N/A\nInventors: N/A\nClaims:\nN/A"
        );
    }

    #[test]
    fn test_claims_are_truncated() {
        let record = RawRecord::new().with("g_claims", "c".repeat(5000));
        let text = source().with_claims_max_chars(10).format_record(&record);
        assert!(text.ends_with("Claims:\ncccccccccc"));
    }

    #[tokio::test]
    async fn test_claims_fetch_failure_degrades() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/patent/")
            .with_status(200)
            .with_body(r#"{"error": false, "count": 1, "patents": [{"patent_id": "42", "patent_title": "Gizmo"}]}"#)
            .create_async()
            .await;
        let claims = server
            .mock("POST", "/g_claim/")
            .match_body(Matcher::PartialJson(json!({"q": {"_eq": {"patent_id": "42"}}})))
            .with_status(500)
            .with_body("internal error")
            .expect(1)
            .create_async()
            .await;

        let source = PatentsViewSource::new(
            HttpClient::new().unwrap(),
            &server.url(),
            Some("pv-key".to_string()),
        )
        .with_claims(true);

        let records = source.search(&SearchQuery::new("gizmo")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(source.format_record(&records[0]).ends_with("Claims:\nN/A"));
        claims.assert_async().await;
    }

    #[tokio::test]
    async fn test_claims_fetched_per_patent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/patent/")
            .with_status(200)
            .with_body(
                r#"{"patents": [{"patent_id": "1", "patent_title": "A"}, {"patent_id": "2", "patent_title": "B"}]}"#,
            )
            .create_async()
            .await;
        let claims = server
            .mock("POST", "/g_claim/")
            .with_status(200)
            .with_body(r#"{"g_claims": [{"claim_text": "1. A thing.", "claim_sequence": 0}]}"#)
            .expect(2)
            .create_async()
            .await;

        let source = PatentsViewSource::new(HttpClient::new().unwrap(), &server.url(), None)
            .with_claims(true)
            .with_detail_concurrency(2);

        let records = source.search(&SearchQuery::new("thing")).await.unwrap();
        assert_eq!(records[0].text_or_na("patent_id"), "1");
        assert_eq!(records[1].text_or_na("patent_id"), "2");
        assert_eq!(records[1].text_or_na("g_claims"), "1. A thing.");
        claims.assert_async().await;
    }
}
