//! Configuration management.
//!
//! Every setting has a default, and most defaults come from the environment,
//! so a bare `Config::default()` is enough to run the tools:
//!
//! | variable | meaning |
//! |----------|---------|
//! | `SEARCH_API` | web engine: `tavily` (default), `duckduckgo`, `brave_search`, `arxiv` |
//! | `LITERATURE_SEARCH_API` | literature engine: `pubmed` (default), `semantic_scholar`, `arxiv` |
//! | `PATENT_SEARCH_API` | patent engine: `patsnap` (default), `patents_view` |
//! | `TAVILY_API_KEY`, `BRAVE_SEARCH_API_KEY`, `PUBMED_SEARCH_API_KEY`, `SEMANTIC_SCHOLAR_API_KEY`, `PATENTSVIEW_API_KEY`, `PATSNAP_API_KEY`, `PATSNAP_API_SECRET` | provider credentials |
//!
//! A config file (TOML, YAML or JSON) can override any field, and
//! `RESEARCH_TOOLS__<SECTION>__<FIELD>` variables override the file:
//!
//! ```toml
//! [engines]
//! patent = "patents_view"
//!
//! [search]
//! max_results = 3
//! max_chars = 2000
//!
//! [retry]
//! max_retries = 5
//! initial_backoff_ms = 500
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::client::PATSNAP_TOKEN_URL;
use crate::models::DEFAULT_MAX_RESULTS;
use crate::sources::{
    PatentDetails, ARXIV_API_BASE, BRAVE_API_BASE, DEFAULT_CLAIMS_MAX_CHARS,
    DUCKDUCKGO_HTML_BASE, PATENTSVIEW_API_BASE, PATSNAP_API_BASE, PUBMED_API_BASE,
    SEMANTIC_API_BASE, TAVILY_API_BASE,
};
use crate::tools::DEFAULT_MAX_CHARS;
use crate::utils::{RetryPolicy, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};

/// Prefix of the environment variables that override config file values
pub const ENV_PREFIX: &str = "RESEARCH_TOOLS";

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "research-tools.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider behind each tool
    #[serde(default)]
    pub engines: EngineConfig,

    /// API keys for the providers
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Result and HTTP settings shared by every tool
    #[serde(default)]
    pub search: SearchSettings,

    /// Rate-limit retry settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Provider base URLs
    #[serde(default)]
    pub endpoints: Endpoints,

    /// Patent detail settings
    #[serde(default)]
    pub patents: PatentSettings,
}

/// Error for an engine name no provider answers to
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown engine '{0}'")]
pub struct UnknownEngine(pub String);

/// Engine for the `web_search` tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebEngine {
    #[default]
    #[serde(rename = "tavily")]
    Tavily,
    #[serde(rename = "duckduckgo")]
    DuckDuckGo,
    #[serde(rename = "brave_search")]
    BraveSearch,
    #[serde(rename = "arxiv")]
    Arxiv,
}

impl WebEngine {
    /// Id of the source behind this engine
    pub fn id(self) -> &'static str {
        match self {
            WebEngine::Tavily => "tavily",
            WebEngine::DuckDuckGo => "duckduckgo",
            WebEngine::BraveSearch => "brave_search",
            WebEngine::Arxiv => "arxiv",
        }
    }
}

impl FromStr for WebEngine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tavily" => Ok(WebEngine::Tavily),
            "duckduckgo" => Ok(WebEngine::DuckDuckGo),
            "brave_search" => Ok(WebEngine::BraveSearch),
            "arxiv" => Ok(WebEngine::Arxiv),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

/// Engine for the `literature_search` tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteratureEngine {
    #[default]
    #[serde(rename = "pubmed")]
    PubMed,
    #[serde(rename = "semantic_scholar")]
    SemanticScholar,
    #[serde(rename = "arxiv")]
    Arxiv,
}

impl LiteratureEngine {
    pub fn id(self) -> &'static str {
        match self {
            LiteratureEngine::PubMed => "pubmed",
            LiteratureEngine::SemanticScholar => "semantic_scholar",
            LiteratureEngine::Arxiv => "arxiv",
        }
    }
}

impl FromStr for LiteratureEngine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pubmed" => Ok(LiteratureEngine::PubMed),
            "semantic_scholar" => Ok(LiteratureEngine::SemanticScholar),
            "arxiv" => Ok(LiteratureEngine::Arxiv),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

/// Engine for the `patent_search` tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatentEngine {
    #[default]
    #[serde(rename = "patsnap")]
    Patsnap,
    #[serde(rename = "patents_view")]
    PatentsView,
}

impl PatentEngine {
    pub fn id(self) -> &'static str {
        match self {
            PatentEngine::Patsnap => "patsnap",
            PatentEngine::PatentsView => "patents_view",
        }
    }
}

impl FromStr for PatentEngine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "patsnap" => Ok(PatentEngine::Patsnap),
            "patents_view" => Ok(PatentEngine::PatentsView),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

macro_rules! impl_engine_display {
    ($($engine:ty),*) => {
        $(impl fmt::Display for $engine {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.id())
            }
        })*
    };
}

impl_engine_display!(WebEngine, LiteratureEngine, PatentEngine);

/// Parse an engine name, falling back to the default on unknown input
pub fn parse_engine<E>(var: &str, value: Option<&str>) -> E
where
    E: FromStr<Err = UnknownEngine> + Default + fmt::Display,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => E::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e: UnknownEngine| {
            let fallback = E::default();
            tracing::warn!("{} has {}, using '{}'", var, e, fallback);
            fallback
        }),
    }
}

fn engine_from_env<E>(var: &str) -> E
where
    E: FromStr<Err = UnknownEngine> + Default + fmt::Display,
{
    parse_engine(var, std::env::var(var).ok().as_deref())
}

/// Provider chosen for each tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "web_engine_from_env")]
    pub web: WebEngine,

    #[serde(default = "literature_engine_from_env")]
    pub literature: LiteratureEngine,

    #[serde(default = "patent_engine_from_env")]
    pub patent: PatentEngine,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            web: web_engine_from_env(),
            literature: literature_engine_from_env(),
            patent: patent_engine_from_env(),
        }
    }
}

fn web_engine_from_env() -> WebEngine {
    engine_from_env("SEARCH_API")
}

fn literature_engine_from_env() -> LiteratureEngine {
    engine_from_env("LITERATURE_SEARCH_API")
}

fn patent_engine_from_env() -> PatentEngine {
    engine_from_env("PATENT_SEARCH_API")
}

/// API keys for external services
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub tavily: Option<String>,

    #[serde(default)]
    pub brave_search: Option<String>,

    /// PubMed E-utilities key (optional, for higher rate limits)
    #[serde(default)]
    pub pubmed: Option<String>,

    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default)]
    pub semantic_scholar: Option<String>,

    #[serde(default)]
    pub patents_view: Option<String>,

    /// Patsnap client id, also sent as the `apikey` parameter
    #[serde(default)]
    pub patsnap_key: Option<String>,

    #[serde(default)]
    pub patsnap_secret: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            tavily: var("TAVILY_API_KEY"),
            brave_search: var("BRAVE_SEARCH_API_KEY"),
            pubmed: var("PUBMED_SEARCH_API_KEY"),
            semantic_scholar: var("SEMANTIC_SCHOLAR_API_KEY"),
            patents_view: var("PATENTSVIEW_API_KEY"),
            patsnap_key: var("PATSNAP_API_KEY"),
            patsnap_secret: var("PATSNAP_API_SECRET"),
        }
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "***");
        f.debug_struct("ApiKeys")
            .field("tavily", &mask(&self.tavily))
            .field("brave_search", &mask(&self.brave_search))
            .field("pubmed", &mask(&self.pubmed))
            .field("semantic_scholar", &mask(&self.semantic_scholar))
            .field("patents_view", &mask(&self.patents_view))
            .field("patsnap_key", &mask(&self.patsnap_key))
            .field("patsnap_secret", &mask(&self.patsnap_secret))
            .finish()
    }
}

/// Result and HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Results requested per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Character budget of one tool answer
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Secondary lookups in flight at once; 1 runs them one by one
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_chars: default_max_chars(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            detail_concurrency: default_detail_concurrency(),
        }
    }
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_detail_concurrency() -> usize {
    1
}

/// Retry settings for rate-limited (HTTP 429) responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the second attempt; doubles after every rate-limited attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(
            settings.max_retries,
            Duration::from_millis(settings.initial_backoff_ms),
        )
    }
}

/// Provider base URLs, overridable for proxies and tests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub tavily: String,
    pub duckduckgo: String,
    pub brave_search: String,
    pub arxiv: String,
    pub pubmed: String,
    pub semantic_scholar: String,
    pub patents_view: String,
    pub patsnap: String,
    pub patsnap_token: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            tavily: TAVILY_API_BASE.to_string(),
            duckduckgo: DUCKDUCKGO_HTML_BASE.to_string(),
            brave_search: BRAVE_API_BASE.to_string(),
            arxiv: ARXIV_API_BASE.to_string(),
            pubmed: PUBMED_API_BASE.to_string(),
            semantic_scholar: SEMANTIC_API_BASE.to_string(),
            patents_view: PATENTSVIEW_API_BASE.to_string(),
            patsnap: PATSNAP_API_BASE.to_string(),
            patsnap_token: PATSNAP_TOKEN_URL.to_string(),
        }
    }
}

/// Patent detail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatentSettings {
    /// Character budget for the claims of one patent
    pub claims_max_chars: usize,

    /// Fetch PatentsView claims (one extra call per patent)
    pub patents_view_claims: bool,

    /// Preferred language for Patsnap text
    pub lang: String,

    pub title_abstract: bool,
    pub claims: bool,
    pub core_invention_points: bool,
    pub legal_status: bool,
}

impl Default for PatentSettings {
    fn default() -> Self {
        Self {
            claims_max_chars: DEFAULT_CLAIMS_MAX_CHARS,
            patents_view_claims: false,
            lang: "en".to_string(),
            title_abstract: true,
            claims: false,
            core_invention_points: true,
            legal_status: false,
        }
    }
}

impl PatentSettings {
    /// Patsnap lookups selected by these settings
    pub fn details(&self) -> PatentDetails {
        let mut details = PatentDetails::empty();
        details.set(PatentDetails::TITLE_ABSTRACT, self.title_abstract);
        details.set(PatentDetails::CLAIMS, self.claims);
        details.set(
            PatentDetails::CORE_INVENTION_POINTS,
            self.core_invention_points,
        );
        details.set(PatentDetails::LEGAL_STATUS, self.legal_status);
        details
    }
}

/// Load configuration from a file, with `RESEARCH_TOOLS__*` overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

/// Look for a config file in the working directory, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("research-tools").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

/// Configuration from `path`, else a discovered file, else the environment
pub fn get_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    match path.map(Path::to_path_buf).or_else(find_config_file) {
        Some(path) => {
            tracing::debug!("Loading configuration from {}", path.display());
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let config = Config::default();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.max_chars, 4000);
        assert_eq!(config.search.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.patents.claims_max_chars, 1000);
        assert_eq!(config.endpoints.patsnap_token, PATSNAP_TOKEN_URL);
    }

    #[test]
    fn test_parse_engine_falls_back() {
        let web: WebEngine = parse_engine("SEARCH_API", Some("brave_search"));
        assert_eq!(web, WebEngine::BraveSearch);

        let web: WebEngine = parse_engine("SEARCH_API", Some("altavista"));
        assert_eq!(web, WebEngine::Tavily);

        let patent: PatentEngine = parse_engine("PATENT_SEARCH_API", Some(" Patents_View "));
        assert_eq!(patent, PatentEngine::PatentsView);

        let literature: LiteratureEngine = parse_engine("LITERATURE_SEARCH_API", None);
        assert_eq!(literature, LiteratureEngine::PubMed);
    }

    #[test]
    fn test_engine_ids_round_trip() {
        for engine in [
            WebEngine::Tavily,
            WebEngine::DuckDuckGo,
            WebEngine::BraveSearch,
            WebEngine::Arxiv,
        ] {
            assert_eq!(engine.to_string().parse::<WebEngine>(), Ok(engine));
        }
        assert_eq!(
            "semantic_scholar".parse::<LiteratureEngine>(),
            Ok(LiteratureEngine::SemanticScholar)
        );
        assert!("google".parse::<PatentEngine>().is_err());
    }

    #[test]
    fn test_patent_details_from_settings() {
        let mut settings = PatentSettings::default();
        assert_eq!(settings.details(), PatentDetails::default());

        settings.claims = true;
        settings.core_invention_points = false;
        assert_eq!(
            settings.details(),
            PatentDetails::TITLE_ABSTRACT | PatentDetails::CLAIMS
        );
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = RetrySettings {
            max_retries: 5,
            initial_backoff_ms: 250,
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_api_keys_debug_is_masked() {
        let keys = ApiKeys {
            tavily: Some("tvly-secret".to_string()),
            brave_search: None,
            pubmed: None,
            semantic_scholar: None,
            patents_view: None,
            patsnap_key: None,
            patsnap_secret: Some("very-secret".to_string()),
        };
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("tvly-secret"));
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engines]
web = "duckduckgo"
literature = "arxiv"
patent = "patents_view"

[search]
max_results = 2
max_chars = 1500

[retry]
initial_backoff_ms = 10

[endpoints]
patents_view = "http://localhost:9999/api/v1"

[patents]
patents_view_claims = true
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.engines.web, WebEngine::DuckDuckGo);
        assert_eq!(config.engines.literature, LiteratureEngine::Arxiv);
        assert_eq!(config.engines.patent, PatentEngine::PatentsView);
        assert_eq!(config.search.max_results, 2);
        assert_eq!(config.search.max_chars, 1500);
        assert_eq!(config.search.connect_timeout_secs, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff_ms, 10);
        assert_eq!(config.endpoints.patents_view, "http://localhost:9999/api/v1");
        assert_eq!(config.endpoints.pubmed, PUBMED_API_BASE);
        assert!(config.patents.patents_view_claims);
        assert!(!config.patents.claims);
    }

    #[test]
    fn test_get_config_with_explicit_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[search]\nmax_chars = 123").unwrap();

        let config = get_config(Some(file.path())).unwrap();
        assert_eq!(config.search.max_chars, 123);
    }
}
