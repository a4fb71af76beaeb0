//! Run-level error taxonomy.
//!
//! Provider internals report failures through `anyhow`; the pipeline maps
//! them onto [`PipelineError`] at the stage boundary. Only the mandatory
//! stages (configuration, ingestion, indexing) surface these errors to the
//! caller. Insight extraction, web search, and caching absorb theirs into
//! explicit degraded outcomes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required external credentials are missing. Fatal at startup.
    #[error("missing required environment variables: {}", .0.join(", "))]
    Configuration(Vec<String>),

    /// Raw input is not a list of text-like items.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The content source returned nothing to index.
    #[error("no content found for '{topic}'")]
    EmptyInput { topic: String },

    /// Every document was rejected by the final shape check.
    #[error("no valid documents after filtering ({rejected} rejected)")]
    NoValidDocuments { rejected: usize },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("chat completion failed: {0}")]
    Completion(String),

    #[error("insight extraction failed: {0}")]
    Extraction(String),

    #[error("corrupt cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("web search failed: {0}")]
    Search(String),
}

impl PipelineError {
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        PipelineError::Embedding(err.to_string())
    }

    /// True for errors that mean "there was nothing to analyze".
    pub fn is_no_content(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyInput { .. } | PipelineError::NoValidDocuments { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_lists_every_variable() {
        let err = PipelineError::Configuration(vec![
            "OPENAI_API_KEY".to_string(),
            "REDDIT_CLIENT_ID".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "missing required environment variables: OPENAI_API_KEY, REDDIT_CLIENT_ID"
        );
    }

    #[test]
    fn no_content_classification() {
        assert!(PipelineError::EmptyInput {
            topic: "rust".into()
        }
        .is_no_content());
        assert!(PipelineError::NoValidDocuments { rejected: 3 }.is_no_content());
        assert!(!PipelineError::Embedding("boom".into()).is_no_content());
    }
}
