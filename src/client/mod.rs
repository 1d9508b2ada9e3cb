//! Authenticated JSON API client.
//!
//! [`ApiClient`] sends [`ApiRequest`]s against a fixed base URL, attaches a
//! static API key and/or a bearer credential from a [`TokenProvider`], and
//! turns the response into JSON or a typed [`SourceError`]. Every call runs
//! inside the client's [`RetryPolicy`].
//!
//! ```rust,no_run
//! use research_tools::client::{ApiClient, ApiKey};
//! use research_tools::models::ApiRequest;
//! use research_tools::utils::HttpClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), research_tools::sources::SourceError> {
//! let client = ApiClient::new(HttpClient::new()?, "https://search.patentsview.org/api/v1/")
//!     .with_api_key(ApiKey::header("X-Api-Key", "my-key"));
//!
//! let body = serde_json::json!({"q": {"_text_any": {"patent_title": "battery"}}});
//! let response = client.send(&ApiRequest::post("patent/").json(body)).await?;
//! # Ok(())
//! # }
//! ```

mod token;

pub use token::{
    ClientCredentialsExchange, Credential, TokenExchange, TokenProvider, DEFAULT_TOKEN_TTL_SECS,
    PATSNAP_TOKEN_URL,
};

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{ApiRequest, RequestBody};
use crate::sources::SourceError;
use crate::utils::{truncate_chars, HttpClient, RetryPolicy};

/// Longest slice of a raw error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Static API key placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKey {
    /// Sent as a request header
    Header { name: String, value: String },
    /// Sent as a query parameter
    Query { name: String, value: String },
}

impl ApiKey {
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        ApiKey::Header {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        ApiKey::Query {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `Authorization: Bearer <key>`
    pub fn bearer(key: impl AsRef<str>) -> Self {
        Self::header("Authorization", format!("Bearer {}", key.as_ref()))
    }
}

/// HTTP client bound to one upstream API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<ApiKey>,
    token_provider: Option<Arc<TokenProvider>>,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Create a client for `base_url` with the default retry policy
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: None,
            token_provider: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Attach a static API key to every request
    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Attach a static API key when one is configured
    pub fn with_optional_api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Attach a bearer credential from `provider` to every request
    pub fn with_token_provider(mut self, provider: Arc<TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Resolve an endpoint against the base URL; absolute URLs pass through
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        if endpoint.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Convenience wrapper around [`ApiClient::send`]
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, SourceError> {
        let mut request = ApiRequest::new(method, endpoint);
        for (key, value) in params {
            request = request.param(*key, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(&request).await
    }

    /// Send `request` and decode the response body as JSON
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, SourceError> {
        let body = self.send_text(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            SourceError::Decode(format!(
                "invalid JSON from {}: {} ({})",
                request.endpoint,
                e,
                truncate_chars(&body, 128)
            ))
        })
    }

    /// Send `request` and return the raw response body
    pub async fn send_text(&self, request: &ApiRequest) -> Result<String, SourceError> {
        self.retry.execute(move || self.dispatch(request)).await
    }

    /// One attempt: build, authenticate, send, check the status
    async fn dispatch(&self, request: &ApiRequest) -> Result<String, SourceError> {
        let url = self.url(&request.endpoint);
        let mut builder = self.http.client().request(request.method.clone(), &url);

        let mut query = request.query.clone();
        match &self.api_key {
            Some(ApiKey::Query { name, value }) => query.push((name.clone(), value.clone())),
            Some(ApiKey::Header { name, value }) => {
                builder = builder.header(name.as_str(), value.as_str());
            }
            None => {}
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        if let Some(provider) = &self.token_provider {
            let credential = provider.get_token().await?;
            builder = builder.bearer_auth(credential.token());
        }

        builder = match &request.body {
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder.header(CONTENT_TYPE, "application/json"),
        };

        tracing::debug!("{} {}", request.method, url);

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let mut message = extract_error_message(&text);
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("no body").to_string();
            }
            tracing::debug!("{} {} failed with {}: {}", request.method, url, status, message);
            return Err(SourceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(text)
    }
}

/// Pull a human-readable message out of an error body.
///
/// JSON bodies are searched for `error_msg`, `message`, `error` and `detail`
/// (strings, or objects carrying `message`/`detail`). Anything else is
/// returned as raw text, cut to 512 characters.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error_msg", "message", "error", "detail"] {
            match value.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(Value::Object(inner)) => {
                    for nested in ["message", "detail"] {
                        if let Some(Value::String(s)) = inner.get(nested) {
                            return s.clone();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS).to_string()
}
