//! Command implementations behind the `trend` binary.
//!
//! Each `run_*` function loads what it needs from the [`Config`], performs
//! the command, and prints human-readable output to stdout.

use anyhow::Result;
use chrono::NaiveDate;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cache::{cache_key, CacheStore};
use crate::chat::Answer;
use crate::config::{check_credentials, Config};
use crate::models::{Document, Insight};
use crate::pipeline::{analyze, Analysis, AnalysisRequest, Services};

const PREVIEW_CHARS: usize = 160;

/// Date window arguments shared by `analyze`, `chat`, and `cache key`.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    /// The last `days` days, ending on `today`.
    pub fn ending(today: NaiveDate, days: i64) -> Self {
        Self {
            start: today - chrono::Duration::days(days),
            end: today,
        }
    }
}

pub async fn run_analyze(config: &Config, topic: &str, window: Window, no_cache: bool) -> Result<()> {
    let analysis = run_pipeline(config, topic, window, no_cache).await?;
    print_analysis(topic, &analysis);
    Ok(())
}

pub async fn run_chat(config: &Config, topic: &str, window: Window, no_cache: bool) -> Result<()> {
    let analysis = run_pipeline(config, topic, window, no_cache).await?;
    print_analysis(topic, &analysis);

    let mut session = analysis.into_session();
    if !session.is_ready() {
        println!("\nChat is unavailable for this run.");
    }
    println!("\nAsk a question (Ctrl-D to quit):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        let answer = session.ask(question).await;
        print_answer(&answer);
    }
    tracing::debug!(turns = session.transcript().len(), "chat session ended");
    Ok(())
}

pub fn run_cache_key(config: &Config, topic: &str, window: Window) -> Result<()> {
    let key = cache_key(topic.trim(), &config.source.name, window.start, window.end);
    println!("{}", key);
    Ok(())
}

pub fn run_cache_clear(config: &Config) -> Result<()> {
    let store = CacheStore::new(config.cache.dir.clone());
    let removed = store.clear()?;
    println!("Removed {} cache file(s) from {}", removed, store.dir().display());
    Ok(())
}

async fn run_pipeline(
    config: &Config,
    topic: &str,
    window: Window,
    no_cache: bool,
) -> Result<Analysis> {
    check_credentials(config)?;
    let services = Services::from_config(config)?;
    let request = AnalysisRequest {
        use_cache: !no_cache,
        ..AnalysisRequest::new(topic, window.start, window.end)
    };

    match analyze(&services, &request).await {
        Ok(analysis) => Ok(analysis),
        Err(e) if e.is_no_content() => {
            anyhow::bail!("No content found for '{}' between {} and {}", topic, window.start, window.end)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_analysis(topic: &str, analysis: &Analysis) {
    let origin = if analysis.from_cache { " (cached)" } else { "" };
    println!("Key insights for \"{}\"{}:", topic, origin);
    for line in format_insights(&analysis.insights()) {
        println!("{}", line);
    }

    if !analysis.highlights.is_empty() {
        println!("\nRepresentative posts:");
        for doc in &analysis.highlights {
            println!("{}", format_highlight(doc));
        }
    }
    println!("\n{} posts indexed.", analysis.index.len());
}

fn print_answer(answer: &Answer) {
    println!("\n{}", answer.answer);
    for source in &answer.sources {
        let who = if source.username.is_empty() {
            String::new()
        } else {
            format!(" u/{}", source.username)
        };
        println!("  [{} #{}{}] {}", source.source, source.index, who, preview(&source.content));
    }
    println!();
}

/// One line per insight, with a `[source]` link when attributed.
pub fn format_insights(insights: &[Insight]) -> Vec<String> {
    insights
        .iter()
        .map(|insight| match &insight.source_url {
            Some(url) => format!("- {} [source] {}", insight.text, url),
            None => format!("- {}", insight.text),
        })
        .collect()
}

fn format_highlight(doc: &Document) -> String {
    match doc.url() {
        Some(url) => format!("- {}\n  {}", preview(&doc.content), url),
        None => format!("- {}", preview(&doc.content)),
    }
}

/// First line of `text`, cut to a fixed number of characters.
fn preview(text: &str) -> String {
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() <= PREVIEW_CHARS {
        first.to_string()
    } else {
        let cut: String = first.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insights_render_source_links() {
        let lines = format_insights(&[
            Insight {
                text: "Rust 2024 edition discussion".into(),
                source_url: Some("https://www.reddit.com/r/rust/1".into()),
            },
            Insight {
                text: "Async traits".into(),
                source_url: None,
            },
        ]);
        assert_eq!(
            lines,
            vec![
                "- Rust 2024 edition discussion [source] https://www.reddit.com/r/rust/1",
                "- Async traits",
            ]
        );
    }

    #[test]
    fn preview_takes_first_line_and_truncates() {
        assert_eq!(preview("title\nbody"), "title");
        let long = "x".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn default_window_is_last_week() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let w = Window::ending(today, 7);
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(w.end, today);
    }
}
