//! Agent-facing tools: one query string in, one bounded text answer out.
//!
//! A [`SearchTool`] wraps a [`Source`] and never fails. Results are rendered
//! through the source's [`ResultFormatter`]; any [`SourceError`] becomes the
//! text `"{Provider} exception: {message}."`. This is the only place errors
//! are turned into text.
//!
//! ```rust,no_run
//! use research_tools::config::Config;
//! use research_tools::tools::{Tool, ToolRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), research_tools::sources::SourceError> {
//! let tools = ToolRegistry::from_config(&Config::default())?;
//! if let Some(tool) = tools.get("patent_search") {
//!     println!("{}", tool.run("solid state battery electrolyte").await);
//! }
//! # Ok(())
//! # }
//! ```

mod format;

pub use format::{ResultFormatter, DEFAULT_MAX_CHARS, NO_RESULTS};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{SearchQuery, DEFAULT_MAX_RESULTS};
use crate::sources::{Source, SourceError, SourceRegistry};
use crate::utils::truncate_chars;

/// A callable tool exposed to an agent framework
#[async_trait]
pub trait Tool: Send + Sync + fmt::Debug {
    /// Tool name the agent calls it by
    fn name(&self) -> &str;

    /// What the tool is good for
    fn description(&self) -> &str;

    /// Answer `query` with text. Never fails.
    async fn run(&self, query: &str) -> String;
}

/// Optional per-call parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolOptions {
    pub max_results: usize,
    pub max_chars: usize,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl From<&Config> for ToolOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_results: config.search.max_results,
            max_chars: config.search.max_chars,
        }
    }
}

/// Tool categories, one tool each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Web,
    Literature,
    Patent,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 3] = [
        ToolCategory::Web,
        ToolCategory::Literature,
        ToolCategory::Patent,
    ];

    /// Name of the tool serving this category
    pub fn tool_name(self) -> &'static str {
        match self {
            ToolCategory::Web => "web_search",
            ToolCategory::Literature => "literature_search",
            ToolCategory::Patent => "patent_search",
        }
    }

    /// Configured engine id for this category
    pub fn engine_id(self, config: &Config) -> &'static str {
        match self {
            ToolCategory::Web => config.engines.web.id(),
            ToolCategory::Literature => config.engines.literature.id(),
            ToolCategory::Patent => config.engines.patent.id(),
        }
    }
}

/// A tool backed by one search source
#[derive(Debug, Clone)]
pub struct SearchTool {
    name: String,
    source: Arc<dyn Source>,
    options: ToolOptions,
}

impl SearchTool {
    pub fn new(name: impl Into<String>, source: Arc<dyn Source>) -> Self {
        Self {
            name: name.into(),
            source,
            options: ToolOptions::default(),
        }
    }

    /// Default options for [`Tool::run`]
    pub fn with_options(mut self, options: ToolOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ToolOptions {
        self.options
    }

    /// Id of the source behind this tool
    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    /// Run `query` with explicit options
    pub async fn run_with(&self, query: &str, options: ToolOptions) -> String {
        tracing::info!(tool = %self.name, source = self.source.id(), "Tool input: {}", query);

        let output = match self.search(query, options).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(tool = %self.name, "{} search failed: {}", self.source.name(), e);
                format!("{} exception: {}.", self.source.name(), e)
            }
        };

        tracing::info!(
            tool = %self.name,
            chars = output.chars().count(),
            "Tool output: {}",
            truncate_chars(&output, 200)
        );
        output
    }

    async fn search(&self, query: &str, options: ToolOptions) -> Result<String, SourceError> {
        let search_query = SearchQuery::new(query).max_results(options.max_results);
        let records = self.source.search(&search_query).await?;

        if records.is_empty() {
            tracing::warn!("{} found no results for '{}'", self.source.name(), query);
        }

        Ok(self
            .source
            .formatter(options.max_chars)
            .format(&records, |record| self.source.format_record(record)))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.source.description()
    }

    async fn run(&self, query: &str) -> String {
        self.run_with(query, self.options).await
    }
}

/// The three configured tools, in category order
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<(ToolCategory, SearchTool)>,
}

impl ToolRegistry {
    /// Build every source, then bind each category to its configured engine
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let sources = SourceRegistry::from_config(config)?;
        Self::from_sources(&sources, config)
    }

    /// Bind each category to the engine `config` selects from `sources`
    pub fn from_sources(sources: &SourceRegistry, config: &Config) -> Result<Self, SourceError> {
        let options = ToolOptions::from(config);

        let tools = ToolCategory::ALL
            .iter()
            .map(|&category| {
                let source = sources.get_required(category.engine_id(config))?;
                tracing::debug!("{} -> {}", category.tool_name(), source.id());
                Ok((
                    category,
                    SearchTool::new(category.tool_name(), Arc::clone(source)).with_options(options),
                ))
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        Ok(Self { tools })
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&SearchTool> {
        self.tools
            .iter()
            .find(|(_, tool)| tool.name == name)
            .map(|(_, tool)| tool)
    }

    pub fn by_category(&self, category: ToolCategory) -> Option<&SearchTool> {
        self.tools
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, tool)| tool)
    }

    pub fn all(&self) -> impl Iterator<Item = &SearchTool> {
        self.tools.iter().map(|(_, tool)| tool)
    }

    pub fn names(&self) -> Vec<&str> {
        self.all().map(|tool| tool.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LiteratureEngine, PatentEngine, WebEngine};
    use crate::models::RawRecord;
    use crate::sources::MockSource;

    fn records(n: usize) -> Vec<RawRecord> {
        (1..=n)
            .map(|i| RawRecord::new().with("title", format!("Result {}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_run_formats_records() {
        let source = Arc::new(MockSource::new().with_records(records(3)));
        let tool = SearchTool::new("web_search", source.clone());

        let text = tool
            .run_with(
                "anything",
                ToolOptions {
                    max_results: 2,
                    max_chars: 4000,
                },
            )
            .await;
        assert_eq!(text, "title: Result 1\n\ntitle: Result 2");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_respects_max_chars() {
        let tool = SearchTool::new("web_search", Arc::new(MockSource::new().with_records(records(5))))
            .with_options(ToolOptions {
                max_results: 5,
                max_chars: 12,
            });

        assert_eq!(tool.run("q").await, "title: Resul");
    }

    #[tokio::test]
    async fn test_run_empty_returns_sentinel() {
        let tool = SearchTool::new("patent_search", Arc::new(MockSource::new()));
        assert_eq!(tool.run("nothing matches").await, NO_RESULTS);
    }

    #[tokio::test]
    async fn test_run_converts_error_to_text() {
        let tool = SearchTool::new(
            "patent_search",
            Arc::new(MockSource::new().with_name("Patsnap").with_error(67200002, "apikey invalid")),
        );

        assert_eq!(
            tool.run("battery").await,
            "Patsnap exception: API error 67200002: apikey invalid."
        );
    }

    #[test]
    fn test_registry_binds_configured_engines() {
        let mut config = Config::default();
        config.engines.web = WebEngine::DuckDuckGo;
        config.engines.literature = LiteratureEngine::SemanticScholar;
        config.engines.patent = PatentEngine::PatentsView;
        config.search.max_chars = 1234;

        let tools = ToolRegistry::from_config(&config).unwrap();
        assert_eq!(
            tools.names(),
            vec!["web_search", "literature_search", "patent_search"]
        );
        assert_eq!(tools.get("web_search").unwrap().source_id(), "duckduckgo");
        assert_eq!(
            tools
                .by_category(ToolCategory::Literature)
                .unwrap()
                .source_id(),
            "semantic_scholar"
        );
        let patent = tools.get("patent_search").unwrap();
        assert_eq!(patent.source_id(), "patents_view");
        assert_eq!(patent.options().max_chars, 1234);
        assert!(tools.get("crawl").is_none());
    }

    #[test]
    fn test_registry_requires_engine_source() {
        let mut sources = SourceRegistry::new();
        sources.register(Arc::new(MockSource::new()));

        let err = ToolRegistry::from_sources(&sources, &Config::default()).unwrap_err();
        assert!(matches!(err, SourceError::InvalidRequest(_)));
    }
}
