use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            enabled: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/.cache")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_provider")]
    pub provider: String,
    /// Display name, recorded in document metadata and in the cache key.
    #[serde(default = "default_source_name")]
    pub name: String,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// JSON file read by the `file` provider.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: default_source_provider(),
            name: default_source_name(),
            max_posts: default_max_posts(),
            subreddit: default_subreddit(),
            user_agent: default_user_agent(),
            path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_source_provider() -> String {
    "reddit".to_string()
}
fn default_source_name() -> String {
    "Reddit".to_string()
}
fn default_max_posts() -> usize {
    100
}
fn default_subreddit() -> String {
    "all".to_string()
}
fn default_user_agent() -> String {
    "TrendAnalyzer/1.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_openai")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for self-hosted providers (Ollama).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_openai() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_openai")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_openai(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            url: None,
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Documents retrieved per chat turn.
    #[serde(default = "default_chat_k")]
    pub chat_k: usize,
    /// Representative posts reported after an analysis run.
    #[serde(default = "default_highlight_k")]
    pub highlight_k: usize,
    #[serde(default = "default_insight_count")]
    pub insight_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chat_k: default_chat_k(),
            highlight_k: default_highlight_k(),
            insight_count: default_insight_count(),
        }
    }
}

fn default_chat_k() -> usize {
    4
}
fn default_highlight_k() -> usize {
    5
}
fn default_insight_count() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_true")]
    pub condense_question: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            condense_question: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_search_results(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_provider() -> String {
    "duckduckgo".to_string()
}
fn default_search_results() -> usize {
    5
}

impl Config {
    /// Built-in defaults, used when no config file is present.
    pub fn minimal() -> Self {
        Self {
            cache: CacheConfig::default(),
            source: SourceConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatConfig::default(),
            search: SearchConfig::default(),
        }
    }

    /// Environment variables the configured providers cannot work without.
    pub fn required_env(&self) -> Vec<&'static str> {
        let mut vars = Vec::new();
        if self.llm.provider == "openai" || self.embedding.provider == "openai" {
            vars.push("OPENAI_API_KEY");
        }
        if self.source.provider == "reddit" {
            vars.push("REDDIT_CLIENT_ID");
            vars.push("REDDIT_CLIENT_SECRET");
        }
        vars
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate source
    match config.source.provider.as_str() {
        "reddit" => {}
        "file" => {
            if config.source.path.is_none() {
                anyhow::bail!("source.path must be set when provider is 'file'");
            }
        }
        other => anyhow::bail!(
            "Unknown source provider: '{}'. Must be reddit or file.",
            other
        ),
    }
    if config.source.max_posts == 0 {
        anyhow::bail!("source.max_posts must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Validate retrieval
    if config.retrieval.chat_k == 0 {
        anyhow::bail!("retrieval.chat_k must be >= 1");
    }
    if config.retrieval.insight_count == 0 {
        anyhow::bail!("retrieval.insight_count must be >= 1");
    }

    match config.search.provider.as_str() {
        "duckduckgo" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown search provider: '{}'. Must be duckduckgo or disabled.",
            other
        ),
    }

    Ok(())
}

/// Verify that every credential the configured providers need is present.
///
/// # Errors
///
/// [`PipelineError::Configuration`] naming all missing variables.
pub fn check_credentials(config: &Config) -> Result<(), PipelineError> {
    check_credentials_with(config, |name| std::env::var(name).ok())
}

fn check_credentials_with<F>(config: &Config, lookup: F) -> Result<(), PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<String> = config
        .required_env()
        .into_iter()
        .filter(|name| lookup(name).map_or(true, |v| v.trim().is_empty()))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Configuration(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("").unwrap();
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.dir, PathBuf::from("data/.cache"));
        assert_eq!(cfg.source.max_posts, 100);
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.retrieval.chat_k, 4);
        assert_eq!(cfg.retrieval.insight_count, 5);
    }

    #[test]
    fn example_config_matches_defaults() {
        let cfg = parse(include_str!("../config/trend.example.toml")).unwrap();
        let defaults = Config::minimal();
        assert_eq!(cfg.source.name, defaults.source.name);
        assert_eq!(cfg.embedding.dims, defaults.embedding.dims);
        assert_eq!(cfg.llm.temperature, defaults.llm.temperature);
        assert_eq!(cfg.retrieval.highlight_k, defaults.retrieval.highlight_k);
        assert_eq!(cfg.search.provider, defaults.search.provider);
    }

    #[test]
    fn file_source_requires_path() {
        let err = parse("[source]\nprovider = \"file\"\n").unwrap_err();
        assert!(err.to_string().contains("source.path"));
        assert!(parse("[source]\nprovider = \"file\"\npath = \"posts.json\"\n").is_ok());
    }

    #[test]
    fn rejects_unknown_providers() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[search]\nprovider = \"altavista\"\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(parse("[llm]\ntemperature = 3.5\n").is_err());
    }

    #[test]
    fn missing_credentials_are_all_reported() {
        let cfg = Config::minimal();
        let err = check_credentials_with(&cfg, |_| None).unwrap_err();
        match err {
            PipelineError::Configuration(vars) => assert_eq!(
                vars,
                vec!["OPENAI_API_KEY", "REDDIT_CLIENT_ID", "REDDIT_CLIENT_SECRET"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ollama_and_file_need_no_credentials() {
        let cfg = parse(
            "[source]\nprovider = \"file\"\npath = \"p.json\"\n\
             [embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n\
             [llm]\nprovider = \"ollama\"\nmodel = \"llama3\"\n",
        )
        .unwrap();
        assert!(check_credentials_with(&cfg, |_| None).is_ok());
    }
}
