//! Content sources.
//!
//! A [`ContentSource`] fetches raw `(text, metadata)` pairs for a topic
//! within an inclusive date window. Sources fail soft: missing credentials
//! or a provider error produce an empty list and a warning, and the
//! pipeline reports that as "no content found".
//!
//! | Provider | Type | Notes |
//! |----------|------|-------|
//! | `reddit` | [`RedditSource`] | application-only OAuth, `/r/<sub>/search` |
//! | `file` | [`FileSource`] | JSON array on disk, for offline runs and tests |

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::PipelineError;
use crate::http;
use crate::models::{RawItem, RawValue};
use crate::normalize::parse_raw_items;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Display name, recorded in document metadata and in the cache key.
    fn name(&self) -> &str;

    /// Fetch at most the configured number of items about `topic` created
    /// between `start` and `end` (both inclusive, UTC dates).
    async fn fetch(&self, topic: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawItem>;
}

fn in_window(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    date >= start && date <= end
}

// ─── Reddit ──────────────────────────────────────────────────────────────

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

pub struct RedditSource {
    client: reqwest::Client,
    name: String,
    subreddit: String,
    user_agent: String,
    max_posts: usize,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Clone, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    author: Option<String>,
    created_utc: f64,
}

impl RedditSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            name: config.name.clone(),
            subreddit: config.subreddit.clone(),
            user_agent: config.user_agent.clone(),
            max_posts: config.max_posts,
        })
    }

    async fn access_token(&self) -> Result<String> {
        let client_id = std::env::var("REDDIT_CLIENT_ID")
            .context("REDDIT_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("REDDIT_CLIENT_SECRET")
            .context("REDDIT_CLIENT_SECRET environment variable not set")?;

        let response = self
            .client
            .post(TOKEN_URL)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Reddit token request failed: {}", response.status());
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn search(&self, topic: &str) -> Result<Vec<Post>> {
        let token = self.access_token().await?;
        let url = format!(
            "https://oauth.reddit.com/r/{}/search?q={}&limit={}&raw_json=1",
            self.subreddit,
            urlencoding::encode(topic),
            self.max_posts
        );

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Reddit search failed: {}", response.status());
        }
        let listing: Listing = response.json().await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    fn to_items(&self, posts: Vec<Post>, start: NaiveDate, end: NaiveDate) -> Vec<RawItem> {
        let mut items = Vec::new();
        for post in posts {
            if items.len() >= self.max_posts {
                break;
            }
            let created = match Utc.timestamp_opt(post.created_utc as i64, 0).single() {
                Some(ts) => ts,
                None => continue,
            };
            if !in_window(created.date_naive(), start, end) {
                continue;
            }

            let mut content = post.title;
            if !post.selftext.is_empty() {
                content.push('\n');
                content.push_str(&post.selftext);
            }
            let metadata = RawValue::map()
                .with("url", format!("https://www.reddit.com{}", post.permalink))
                .with("source", self.name.as_str())
                .with("username", post.author)
                .with("timestamp", created)
                .with("source_index", items.len() as i64);
            items.push(RawItem::new(content, metadata));
        }
        items
    }
}

#[async_trait]
impl ContentSource for RedditSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, topic: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawItem> {
        match self.search(topic).await {
            Ok(posts) => {
                let items = self.to_items(posts, start, end);
                tracing::info!(topic, posts = items.len(), "fetched Reddit posts");
                items
            }
            Err(e) => {
                tracing::warn!(topic, error = %e, "error searching Reddit");
                Vec::new()
            }
        }
    }
}

// ─── File ────────────────────────────────────────────────────────────────

/// Reads posts from a JSON file.
///
/// Items may carry a `timestamp` or `created_at` metadata field (RFC 3339,
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD`, or unix seconds). Items with a
/// readable date outside the window are skipped; undated items are kept.
pub struct FileSource {
    path: PathBuf,
    name: String,
    max_posts: usize,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, max_posts: usize) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            max_posts,
        }
    }

    /// Read and parse the whole file.
    pub fn load(&self) -> Result<Vec<RawItem>, PipelineError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Validation(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Validation(format!("{}: {}", self.path.display(), e)))?;
        parse_raw_items(&value)
    }
}

#[async_trait]
impl ContentSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, topic: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawItem> {
        let items = match self.load() {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "error reading posts file");
                return Vec::new();
            }
        };

        let items: Vec<RawItem> = items
            .into_iter()
            .filter(|item| item_date(item).map_or(true, |d| in_window(d, start, end)))
            .take(self.max_posts)
            .collect();
        tracing::info!(topic, posts = items.len(), "loaded posts from file");
        items
    }
}

fn item_date(item: &RawItem) -> Option<NaiveDate> {
    let value = item
        .metadata
        .get("timestamp")
        .or_else(|| item.metadata.get("created_at"))?;
    match value {
        RawValue::Text(s) => parse_date(s),
        RawValue::Int(n) => Utc.timestamp_opt(*n, 0).single().map(|t| t.date_naive()),
        RawValue::Float(f) => Utc
            .timestamp_opt(*f as i64, 0)
            .single()
            .map(|t| t.date_naive()),
        RawValue::Date(d) => Some(*d),
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Timestamp(ts) => Some(ts.date_naive()),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn create_source(config: &SourceConfig) -> Result<Box<dyn ContentSource>> {
    match config.provider.as_str() {
        "reddit" => Ok(Box::new(RedditSource::new(config)?)),
        "file" => {
            let path = config
                .path
                .clone()
                .context("source.path must be set when provider is 'file'")?;
            Ok(Box::new(FileSource::new(
                path,
                config.name.clone(),
                config.max_posts,
            )))
        }
        other => bail!("Unknown source provider: {}", other),
    }
}
