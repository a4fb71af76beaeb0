//! # Trend Harness CLI (`trend`)
//!
//! ## Usage
//!
//! ```bash
//! trend --config ./config/trend.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trend analyze <topic>` | Fetch, index and summarize posts about a topic |
//! | `trend chat <topic>` | Analyze, then answer questions read from stdin |
//! | `trend cache key <topic>` | Print the cache key for a request |
//! | `trend cache clear` | Delete every cached analysis |
//!
//! Without a config file the built-in defaults apply (Reddit source, OpenAI
//! models, DuckDuckGo fallback). Credentials are read from the environment,
//! and from a `.env` file when one is present.

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use trend_harness::commands::{self, Window};
use trend_harness::{config, logging};

const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Trend Harness CLI: retrieval-augmented trend analysis over social-media
/// posts.
#[derive(Parser)]
#[command(
    name = "trend",
    about = "Trend Harness: summarize what people are saying about a topic, then ask follow-up questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/trend.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/trend.toml")]
    config: PathBuf,

    /// Enable debug logging for this crate. `RUST_LOG` overrides it.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a topic and print the key insights.
    ///
    /// Fetches posts from the configured source, indexes them, extracts
    /// key insights with source links, and lists representative posts.
    /// Results are cached per (topic, source, date window).
    Analyze(RunArgs),

    /// Analyze a topic, then answer questions line by line from stdin.
    ///
    /// Answers are grounded in the retrieved posts; uncertain answers are
    /// replaced by a web search result.
    Chat(RunArgs),

    /// Inspect or clear the analysis cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// The topic or keyword to analyze.
    topic: String,

    #[command(flatten)]
    window: WindowArgs,

    /// Skip the cache for both lookup and storage.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct WindowArgs {
    /// First day of the window (YYYY-MM-DD). Defaults to 7 days before `--end`.
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,
}

impl WindowArgs {
    fn resolve(&self) -> Window {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let default = Window::ending(end, DEFAULT_WINDOW_DAYS);
        Window {
            start: self.start.unwrap_or(default.start),
            end,
        }
    }
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache key for a request.
    Key {
        topic: String,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Delete every cache file.
    Clear,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "could not read .env file");
        }
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Analyze(args) => {
            commands::run_analyze(&cfg, &args.topic, args.window.resolve(), args.no_cache).await?;
        }
        Commands::Chat(args) => {
            commands::run_chat(&cfg, &args.topic, args.window.resolve(), args.no_cache).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Key { topic, window } => {
                commands::run_cache_key(&cfg, &topic, window.resolve())?;
            }
            CacheAction::Clear => {
                commands::run_cache_clear(&cfg)?;
            }
        },
    }

    Ok(())
}
