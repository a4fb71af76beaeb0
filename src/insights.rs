//! Insight extraction with source attribution.
//!
//! The whole corpus is handed to the chat model with a request for a fixed
//! number of dash-prefixed bullet insights. Each parsed insight is then
//! attributed to the single most similar document in the index (k = 1).
//!
//! Extraction is optional enrichment: a failure is reported as
//! [`ExtractionOutcome::Failed`], never as an error, and renders as the
//! single placeholder insight [`PLACEHOLDER`].

use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::llm::{complete_prompt, ChatModel};
use crate::models::Insight;

/// Text shown in place of insights when extraction fails.
pub const PLACEHOLDER: &str = "Error generating insights.";

/// Build the summarization prompt for `text`.
pub fn insights_prompt(text: &str, count: usize) -> String {
    format!(
        "Analyze the following text and provide {count} key insights about the topic. \
         Each insight should be concise, meaningful, and highlight important trends or patterns:\n\
         {text}\n\n\
         Format the response as a list of bullet points, with each point on a new line starting \
         with a dash (-). Focus on extracting meaningful insights rather than just summarizing \
         the content."
    )
}

/// Split a bullet-list response into insight texts.
///
/// Leading/trailing dashes and spaces are stripped from every line and
/// empty lines are dropped. Fewer insights than requested is not an error.
pub fn parse_insights(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| line.trim().trim_matches(|c| c == '-' || c == ' ').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(Vec<Insight>),
    Failed { reason: String },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Extracted(_))
    }

    /// Insights for display; the placeholder when extraction failed.
    pub fn insights(&self) -> Vec<Insight> {
        match self {
            ExtractionOutcome::Extracted(insights) => insights.clone(),
            ExtractionOutcome::Failed { .. } => vec![Insight {
                text: PLACEHOLDER.to_string(),
                source_url: None,
            }],
        }
    }

    /// Attributed source URLs, one per insight. Empty when extraction failed.
    pub fn sources(&self) -> Vec<Option<String>> {
        match self {
            ExtractionOutcome::Extracted(insights) => {
                insights.iter().map(|i| i.source_url.clone()).collect()
            }
            ExtractionOutcome::Failed { .. } => Vec::new(),
        }
    }
}

/// Extract `count` insights from everything in `index`.
pub async fn extract(index: &VectorIndex, model: &dyn ChatModel, count: usize) -> ExtractionOutcome {
    match try_extract(index, model, count).await {
        Ok(insights) => {
            tracing::info!(insights = insights.len(), "extracted insights");
            ExtractionOutcome::Extracted(insights)
        }
        Err(e) => {
            tracing::warn!(error = %e, "error generating insights");
            ExtractionOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn try_extract(
    index: &VectorIndex,
    model: &dyn ChatModel,
    count: usize,
) -> Result<Vec<Insight>, PipelineError> {
    let combined = index
        .documents()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let response = complete_prompt(model, &insights_prompt(&combined, count))
        .await
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;

    let mut insights = Vec::new();
    for text in parse_insights(&response) {
        let source_url = index
            .search(&text, 1)
            .await?
            .first()
            .and_then(|hit| hit.document.url());
        insights.push(Insight { text, source_url });
    }
    Ok(insights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bullets_and_blank_lines() {
        let parsed = parse_insights("- First trend\n\n-   Second trend  \n  - Third -\n---\n");
        assert_eq!(parsed, vec!["First trend", "Second trend", "Third"]);
    }

    #[test]
    fn keeps_inner_dashes() {
        assert_eq!(
            parse_insights("- Self-hosting is up"),
            vec!["Self-hosting is up"]
        );
    }

    #[test]
    fn under_production_is_not_an_error() {
        assert_eq!(parse_insights("- only one").len(), 1);
        assert!(parse_insights("").is_empty());
    }

    #[test]
    fn failed_outcome_renders_placeholder() {
        let outcome = ExtractionOutcome::Failed {
            reason: "timeout".into(),
        };
        let insights = outcome.insights();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].text, PLACEHOLDER);
        assert!(outcome.sources().is_empty());
        assert!(!outcome.is_success());
    }

    #[test]
    fn prompt_requests_count_and_dashes() {
        let p = insights_prompt("post one\npost two", 5);
        assert!(p.contains("provide 5 key insights"));
        assert!(p.contains("starting with a dash (-)"));
        assert!(p.contains("post one\npost two"));
    }
}
