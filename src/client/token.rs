//! Cached bearer credentials obtained through a client-credentials exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::extract_error_message;
use crate::sources::SourceError;
use crate::utils::{truncate_chars, HttpClient};

/// OAuth endpoint of the Patsnap open platform
pub const PATSNAP_TOKEN_URL: &str = "https://connect.zhihuiya.com/oauth/token";

/// Lifetime assigned to a freshly exchanged token, in seconds
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 1500;

/// A bearer token and the instant it stops being usable
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid iff `now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Obtains a new raw token from the authorization server
#[async_trait]
pub trait TokenExchange: Send + Sync + fmt::Debug {
    async fn exchange(&self) -> Result<String, SourceError>;
}

/// Client-credentials grant with HTTP Basic authentication
#[derive(Debug, Clone)]
pub struct ClientCredentialsExchange {
    http: HttpClient,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    status: Option<bool>,
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<String>,
}

impl ClientCredentialsExchange {
    pub fn new(
        http: HttpClient,
        token_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<String, SourceError> {
        let (client_id, client_secret) = match (
            self.client_id.as_deref().filter(|s| !s.is_empty()),
            self.client_secret.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(SourceError::Auth(
                    "API key and API secret are required to request an access token".to_string(),
                ))
            }
        };

        tracing::debug!("Requesting access token from {}", self.token_url);

        let response = self
            .http
            .client()
            .post(&self.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SourceError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            SourceError::Auth(format!(
                "malformed token response ({}): {}",
                e,
                truncate_chars(&body, 512)
            ))
        })?;

        if parsed.status == Some(false) {
            return Err(SourceError::Auth(format!(
                "token request rejected: {}",
                truncate_chars(&body, 512)
            )));
        }

        parsed
            .data
            .and_then(|data| data.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                SourceError::Auth(format!(
                    "token missing from response: {}",
                    truncate_chars(&body, 512)
                ))
            })
    }
}

/// Hands out a valid bearer credential, refreshing it when it has expired.
///
/// The check and the refresh happen under one lock, so concurrent callers
/// share a single exchange and never see a half-written credential.
#[derive(Debug)]
pub struct TokenProvider {
    exchange: Arc<dyn TokenExchange>,
    ttl: Duration,
    cached: Mutex<Option<Credential>>,
}

impl TokenProvider {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            exchange,
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            cached: Mutex::new(None),
        }
    }

    /// Override the lifetime given to new tokens
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Seed the cache with an existing credential
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.cached = Mutex::new(Some(credential));
        self
    }

    /// Return the cached credential, exchanging for a new one if it is
    /// missing or expired.
    pub async fn get_token(&self) -> Result<Credential, SourceError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref().filter(|c| c.is_valid()) {
            return Ok(credential.clone());
        }

        let token = self.exchange.exchange().await?;
        let credential = Credential::new(token, Utc::now() + self.ttl);
        tracing::debug!("Access token refreshed, expires at {}", credential.expires_at());

        *cached = Some(credential.clone());
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingExchange {
        calls: AtomicU32,
        delay_ms: u64,
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self) -> Result<String, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            Ok(format!("token-{}", n))
        }
    }

    #[tokio::test]
    async fn test_expired_credential_triggers_one_refresh() {
        let exchange = Arc::new(CountingExchange::default());
        let provider = TokenProvider::new(exchange.clone()).with_credential(Credential::new(
            "stale",
            Utc::now() - Duration::seconds(1),
        ));

        let credential = provider.get_token().await.unwrap();

        assert_eq!(credential.token(), "token-1");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
        assert!(credential.expires_at() > Utc::now() + Duration::seconds(1400));
    }

    #[tokio::test]
    async fn test_valid_credential_is_reused() {
        let exchange = Arc::new(CountingExchange::default());
        let provider = TokenProvider::new(exchange.clone()).with_credential(Credential::new(
            "fresh",
            Utc::now() + Duration::seconds(600),
        ));

        assert_eq!(provider.get_token().await.unwrap().token(), "fresh");
        assert_eq!(provider.get_token().await.unwrap().token(), "fresh");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_is_cached_after_first_exchange() {
        let exchange = Arc::new(CountingExchange::default());
        let provider = TokenProvider::new(exchange.clone());

        provider.get_token().await.unwrap();
        let second = provider.get_token().await.unwrap();

        assert_eq!(second.token(), "token-1");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicU32::new(0),
            delay_ms: 50,
        });
        let provider = Arc::new(TokenProvider::new(exchange.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().token(), "token-1");
        }
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_credential_validity_boundary() {
        let now = Utc::now();
        let credential = Credential::new("secret-value", now);
        assert!(!credential.is_valid_at(now));
        assert!(credential.is_valid_at(now - Duration::seconds(1)));
        assert!(!format!("{:?}", credential).contains("secret-value"));
    }

    #[tokio::test]
    async fn test_missing_secret_is_auth_error() {
        let exchange = ClientCredentialsExchange::new(
            HttpClient::new().unwrap(),
            "http://127.0.0.1:9/oauth/token",
            Some("key".to_string()),
            None,
        );

        assert!(matches!(exchange.exchange().await, Err(SourceError::Auth(_))));
    }

    #[tokio::test]
    async fn test_exchange_posts_basic_auth_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_header(
                "content-type",
                Matcher::Regex("application/x-www-form-urlencoded".to_string()),
            )
            .match_body(Matcher::UrlEncoded(
                "grant_type".to_string(),
                "client_credentials".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": true, "data": {"token": "abc123", "expires_in": 1799}}"#)
            .expect(1)
            .create_async()
            .await;

        let exchange = ClientCredentialsExchange::new(
            HttpClient::new().unwrap(),
            format!("{}/oauth/token", server.url()),
            Some("key".to_string()),
            Some("secret".to_string()),
        );

        assert_eq!(exchange.exchange().await.unwrap(), "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"error_msg": "invalid client"}"#)
            .create_async()
            .await;

        let exchange = ClientCredentialsExchange::new(
            HttpClient::new().unwrap(),
            format!("{}/oauth/token", server.url()),
            Some("key".to_string()),
            Some("wrong".to_string()),
        );

        match exchange.exchange().await {
            Err(SourceError::Auth(message)) => {
                assert!(message.contains("401"));
                assert!(message.contains("invalid client"));
            }
            other => panic!("expected Auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_false_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"status": false, "error_msg": "disabled"}"#)
            .create_async()
            .await;

        let exchange = ClientCredentialsExchange::new(
            HttpClient::new().unwrap(),
            format!("{}/oauth/token", server.url()),
            Some("key".to_string()),
            Some("secret".to_string()),
        );

        assert!(matches!(exchange.exchange().await, Err(SourceError::Auth(_))));
    }
}
