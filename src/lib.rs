//! # Research Tools
//!
//! Web, literature and patent search exposed as agent tools with a single
//! contract: `run(query) -> String`. A tool never fails; upstream errors
//! come back as text.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Raw result records, search queries and outbound requests
//! - [`client`]: Authenticated API client and OAuth token provider
//! - [`sources`]: Provider implementations behind the [`Source`] trait
//! - [`tools`]: Result formatting and the agent-facing [`Tool`] trait
//! - [`utils`]: HTTP client, retry policy and text helpers
//! - [`config`]: Engine selection, API keys and settings

pub mod client;
pub mod config;
pub mod models;
pub mod sources;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use sources::{Source, SourceError, SourceRegistry};
pub use tools::{SearchTool, Tool, ToolRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
