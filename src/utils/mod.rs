//! Utility modules supporting the request pipeline.
//!
//! - [`HttpClient`]: shared reqwest client with user agent and timeouts
//! - [`RetryPolicy`]: bounded retry with exponential backoff on HTTP 429
//! - [`truncate_chars`], [`html_to_text`], [`collapse_whitespace`]: text helpers
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use research_tools::sources::SourceError;
//! use research_tools::utils::RetryPolicy;
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let policy = RetryPolicy::default();
//! let data = policy.execute(|| fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;
mod text;

pub use http::{HttpClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use retry::RetryPolicy;
pub use text::{collapse_whitespace, html_to_text, truncate_chars};
