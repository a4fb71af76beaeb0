//! Open-web fallback search.
//!
//! Used by the conversation engine when a retrieval-grounded answer looks
//! uncertain. [`fallback_search`] never fails: any provider error turns
//! into [`SEARCH_APOLOGY`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::SearchConfig;
use crate::error::PipelineError;
use crate::http;

pub const SEARCH_APOLOGY: &str = "Sorry, I couldn't perform a web search at this time.";
pub const NO_RESULTS: &str = "No good DuckDuckGo Search Result was found";

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web and return a plain-text digest of the results.
    async fn search(&self, query: &str) -> Result<String>;
}

/// Run `query` through `search`, reporting provider failures as
/// [`PipelineError::Search`].
pub async fn search_web(search: &dyn WebSearch, query: &str) -> Result<String, PipelineError> {
    search
        .search(query)
        .await
        .map_err(|e| PipelineError::Search(e.to_string()))
}

/// Like [`search_web`], but degrades any failure to an apology.
pub async fn fallback_search(search: &dyn WebSearch, query: &str) -> String {
    match search_web(search, query).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "error performing web search");
            SEARCH_APOLOGY.to_string()
        }
    }
}

/// DuckDuckGo Instant Answer API.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            max_results: config.max_results,
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            bail!("DuckDuckGo search failed: {}", response.status());
        }

        let payload: Value = response.json().await?;
        let snippets = collect_snippets(&payload, self.max_results);
        if snippets.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }
        Ok(snippets.join("\n"))
    }
}

/// Pull the abstract and topic texts out of an Instant Answer payload.
fn collect_snippets(payload: &Value, limit: usize) -> Vec<String> {
    let mut snippets = Vec::new();

    if let Some(text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            snippets.push(text.to_string());
        }
    }
    if let Some(answer) = payload.get("Answer").and_then(|v| v.as_str()) {
        if !answer.is_empty() {
            snippets.push(answer.to_string());
        }
    }
    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = payload.get(key).and_then(|v| v.as_array()) {
            extract_topics(items, &mut snippets);
        }
    }

    snippets.truncate(limit);
    snippets
}

fn extract_topics(items: &[Value], out: &mut Vec<String>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, out);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        if !text.is_empty() {
            out.push(text.to_string());
        }
    }
}

/// Search provider used when `search.provider = "disabled"`.
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<String> {
        bail!("web search is disabled")
    }
}

pub fn create_search(config: &SearchConfig) -> Result<Box<dyn WebSearch>> {
    match config.provider.as_str() {
        "duckduckgo" => Ok(Box::new(DuckDuckGoSearch::new(config)?)),
        "disabled" => Ok(Box::new(DisabledSearch)),
        other => bail!("Unknown search provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn failures_become_apology() {
        assert_eq!(fallback_search(&DisabledSearch, "anything").await, SEARCH_APOLOGY);
    }

    #[tokio::test]
    async fn provider_errors_are_search_failures() {
        match search_web(&DisabledSearch, "anything").await {
            Err(PipelineError::Search(reason)) => assert!(reason.contains("disabled")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn collects_abstract_and_nested_topics() {
        let payload = json!({
            "AbstractText": "Rust is a systems language.",
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://a"},
                {"Name": "group", "Topics": [{"Text": "Crates.io registry"}]},
                {"Text": ""}
            ]
        });
        assert_eq!(
            collect_snippets(&payload, 10),
            vec![
                "Rust is a systems language.",
                "Cargo - package manager",
                "Crates.io registry"
            ]
        );
    }

    #[test]
    fn snippet_limit_applies() {
        let payload = json!({"RelatedTopics": [{"Text": "a"}, {"Text": "b"}, {"Text": "c"}]});
        assert_eq!(collect_snippets(&payload, 2).len(), 2);
    }
}
