//! Registry of the configured search providers.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ArxivSource, BraveSearchSource, DuckDuckGoSource, PatentsViewSource, PatsnapSource,
    PubMedSource, SemanticScholarSource, Source, SourceError, TavilySource,
};
use crate::config::Config;
use crate::utils::{HttpClient, RetryPolicy};

/// Every provider, keyed by source id
///
/// All sources share one HTTP connection pool and the configured retry
/// policy. A provider without credentials is still registered; its
/// requests fail upstream and surface as tool error text.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider from `config`
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let http = HttpClient::with_timeouts(
            config.search.timeout(),
            config.search.connect_timeout(),
        )?;
        let retry = RetryPolicy::from(&config.retry);
        let keys = &config.api_keys;
        let endpoints = &config.endpoints;
        let concurrency = config.search.detail_concurrency;

        let mut registry = Self::new();

        registry.register(Arc::new(
            TavilySource::new(http.clone(), &endpoints.tavily, keys.tavily.clone())
                .with_retry(retry),
        ));
        registry.register(Arc::new(
            DuckDuckGoSource::new(http.clone(), &endpoints.duckduckgo).with_retry(retry),
        ));
        registry.register(Arc::new(
            BraveSearchSource::new(
                http.clone(),
                &endpoints.brave_search,
                keys.brave_search.clone(),
            )
            .with_retry(retry),
        ));
        registry.register(Arc::new(
            ArxivSource::new(http.clone(), &endpoints.arxiv).with_retry(retry),
        ));
        registry.register(Arc::new(
            PubMedSource::new(http.clone(), &endpoints.pubmed, keys.pubmed.clone())
                .with_retry(retry),
        ));
        registry.register(Arc::new(
            SemanticScholarSource::new(
                http.clone(),
                &endpoints.semantic_scholar,
                keys.semantic_scholar.clone(),
            )
            .with_retry(retry),
        ));
        registry.register(Arc::new(
            PatentsViewSource::new(
                http.clone(),
                &endpoints.patents_view,
                keys.patents_view.clone(),
            )
            .with_retry(retry)
            .with_claims(config.patents.patents_view_claims)
            .with_claims_max_chars(config.patents.claims_max_chars)
            .with_detail_concurrency(concurrency),
        ));
        registry.register(Arc::new(
            PatsnapSource::new(
                http,
                &endpoints.patsnap,
                &endpoints.patsnap_token,
                keys.patsnap_key.clone(),
                keys.patsnap_secret.clone(),
            )
            .with_retry(retry)
            .with_details(config.patents.details())
            .with_lang(config.patents.lang.clone())
            .with_claims_max_chars(config.patents.claims_max_chars)
            .with_detail_concurrency(concurrency),
        ));

        tracing::debug!("Registered {} sources", registry.len());
        Ok(registry)
    }

    /// Register a source, replacing any source with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id)
            .ok_or_else(|| SourceError::InvalidRequest(format!("Source '{}' not found", id)))
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Check if a source is registered
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
