//! Mock source for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};

/// What the next search returns
#[derive(Debug, Clone)]
enum MockResponse {
    Records(Vec<RawRecord>),
    /// Rendered through `SourceError::Api` so the message survives cloning
    Error { code: i64, message: String },
}

/// A source that returns predefined records and renders every field as
/// `key: value` lines.
#[derive(Debug)]
pub struct MockSource {
    name: String,
    response: Mutex<MockResponse>,
    calls: AtomicUsize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Create a mock source that finds nothing
    pub fn new() -> Self {
        Self {
            name: "Mock".to_string(),
            response: Mutex::new(MockResponse::Records(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Name used as the prefix of error text
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Return these records from every search
    pub fn with_records(self, records: Vec<RawRecord>) -> Self {
        self.set_records(records);
        self
    }

    /// Fail every search with an API error
    pub fn with_error(self, code: i64, message: impl Into<String>) -> Self {
        self.set_error(code, message);
        self
    }

    pub fn set_records(&self, records: Vec<RawRecord>) {
        if let Ok(mut guard) = self.response.lock() {
            *guard = MockResponse::Records(records);
        }
    }

    pub fn set_error(&self, code: i64, message: impl Into<String>) {
        if let Ok(mut guard) = self.response.lock() {
            *guard = MockResponse::Error {
                code,
                message: message.into(),
            };
        }
    }

    /// Number of searches run so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns canned results."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let response = self
            .response
            .lock()
            .map_err(|_| SourceError::InvalidRequest("mock state poisoned".to_string()))?
            .clone();

        match response {
            MockResponse::Records(records) => {
                Ok(records.into_iter().take(query.max_results).collect())
            }
            MockResponse::Error { code, message } => Err(SourceError::Api { code, message }),
        }
    }

    fn format_record(&self, record: &RawRecord) -> String {
        record
            .iter()
            .map(|(key, _)| format!("{}: {}", key, record.text_or_na(key)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
