use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use research_tools::config::{get_config, Config, LiteratureEngine, PatentEngine, WebEngine};
use research_tools::tools::{Tool, ToolCategory, ToolOptions, ToolRegistry};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Tools - web, literature and patent search with plain-text answers
#[derive(Parser, Debug)]
#[command(name = "research-tools")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Web, literature and patent search with plain-text answers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress everything but errors in the log
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every search command
#[derive(clap::Args, Debug, Clone)]
struct SearchArgs {
    /// Search query string
    query: String,

    /// Maximum number of results
    #[arg(long, short)]
    max_results: Option<usize>,

    /// Character budget of the answer
    #[arg(long)]
    max_chars: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the web
    #[command(alias = "w")]
    Web {
        #[command(flatten)]
        args: SearchArgs,

        /// Engine (tavily, duckduckgo, brave_search, arxiv)
        #[arg(long, short)]
        engine: Option<WebEngine>,
    },

    /// Search scientific literature
    #[command(alias = "l")]
    Literature {
        #[command(flatten)]
        args: SearchArgs,

        /// Engine (pubmed, semantic_scholar, arxiv)
        #[arg(long, short)]
        engine: Option<LiteratureEngine>,
    },

    /// Search patents
    #[command(alias = "p")]
    Patent {
        #[command(flatten)]
        args: SearchArgs,

        /// Engine (patsnap, patents_view)
        #[arg(long, short)]
        engine: Option<PatentEngine>,

        /// Also fetch the claims of every patent
        #[arg(long)]
        claims: bool,
    },

    /// List the configured tools
    Tools,
}

/// Print all available environment variables
fn print_env_vars() {
    println!("Research Tools - Environment Variables");
    println!();
    println!("Engine Selection:");
    println!("  SEARCH_API                  Web engine: tavily (default), duckduckgo, brave_search, arxiv");
    println!("  LITERATURE_SEARCH_API       Literature engine: pubmed (default), semantic_scholar, arxiv");
    println!("  PATENT_SEARCH_API           Patent engine: patsnap (default), patents_view");
    println!();
    println!("API Keys:");
    println!("  TAVILY_API_KEY              API key for Tavily");
    println!("  BRAVE_SEARCH_API_KEY        Subscription token for Brave Search");
    println!("  PUBMED_SEARCH_API_KEY       API key for PubMed E-utilities (higher rate limits)");
    println!("  SEMANTIC_SCHOLAR_API_KEY    API key for Semantic Scholar (higher rate limits)");
    println!("  PATENTSVIEW_API_KEY         API key for PatentsView");
    println!("  PATSNAP_API_KEY             Patsnap client id");
    println!("  PATSNAP_API_SECRET          Patsnap client secret");
    println!();
    println!("Config Overrides (take precedence over the config file):");
    println!("  RESEARCH_TOOLS__SEARCH__MAX_RESULTS          Results per query (default: 5)");
    println!("  RESEARCH_TOOLS__SEARCH__MAX_CHARS            Answer character budget (default: 4000)");
    println!("  RESEARCH_TOOLS__SEARCH__DETAIL_CONCURRENCY   Secondary lookups in flight (default: 1)");
    println!("  RESEARCH_TOOLS__RETRY__MAX_RETRIES           Attempts on HTTP 429 (default: 3)");
    println!("  RESEARCH_TOOLS__RETRY__INITIAL_BACKOFF_MS    First backoff in ms (default: 1000)");
    println!("  RESEARCH_TOOLS__PATENTS__CLAIMS_MAX_CHARS    Claims character budget (default: 1000)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Example:");
    println!("  export PATENT_SEARCH_API=\"patents_view\"");
    println!("  export PATENTSVIEW_API_KEY=\"your-key-here\"");
    println!("  research-tools patent \"solid state battery\" --max-results 3");
}

fn init_tracing(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("research_tools={}", level)),
    );

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Tool options from the config, overridden by command-line flags
fn tool_options(config: &Config, args: &SearchArgs) -> ToolOptions {
    let defaults = ToolOptions::from(config);
    ToolOptions {
        max_results: args.max_results.unwrap_or(defaults.max_results),
        max_chars: args.max_chars.unwrap_or(defaults.max_chars),
    }
}

async fn run_search(config: &Config, category: ToolCategory, args: &SearchArgs) -> Result<()> {
    let tools = ToolRegistry::from_config(config).context("failed to build tools")?;
    let tool = tools
        .by_category(category)
        .with_context(|| format!("tool '{}' is not configured", category.tool_name()))?;

    let output = tool.run_with(&args.query, tool_options(config, args)).await;
    println!("{}", output);
    Ok(())
}

fn print_tools(config: &Config) -> Result<()> {
    let tools = ToolRegistry::from_config(config).context("failed to build tools")?;

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Tool", "Engine", "Max Results", "Max Chars", "Description"]);

    for tool in tools.all() {
        let options = tool.options();
        table.add_row(vec![
            Cell::new(tool.name()).add_attribute(Attribute::Bold),
            Cell::new(tool.source_id()),
            Cell::new(options.max_results),
            Cell::new(options.max_chars),
            Cell::new(tool.description()),
        ]);
    }

    println!("{table}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
        return Ok(());
    }

    init_tracing(&cli);

    let mut config = get_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(timeout) = cli.timeout {
        config.search.timeout_secs = timeout;
    }

    match cli.command {
        Some(Commands::Web { args, engine }) => {
            if let Some(engine) = engine {
                config.engines.web = engine;
            }
            run_search(&config, ToolCategory::Web, &args).await
        }
        Some(Commands::Literature { args, engine }) => {
            if let Some(engine) = engine {
                config.engines.literature = engine;
            }
            run_search(&config, ToolCategory::Literature, &args).await
        }
        Some(Commands::Patent {
            args,
            engine,
            claims,
        }) => {
            if let Some(engine) = engine {
                config.engines.patent = engine;
            }
            if claims {
                config.patents.claims = true;
                config.patents.patents_view_claims = true;
            }
            run_search(&config, ToolCategory::Patent, &args).await
        }
        Some(Commands::Tools) | None => print_tools(&config),
    }
}
