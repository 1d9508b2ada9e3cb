//! Core data structures.
//!
//! - [`RawRecord`]: one upstream result item with safe field accessors
//! - [`SearchQuery`]: what a tool asks a provider for
//! - [`ApiRequest`]: one outbound HTTP call

mod record;
mod request;
mod search;

pub use record::{join_or_na, value_text, RawRecord, NOT_AVAILABLE};
pub use request::{ApiRequest, RequestBody};
pub use search::{SearchQuery, DEFAULT_MAX_RESULTS};
