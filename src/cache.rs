//! Durable analysis cache.
//!
//! One JSON file per [`CacheKey`] under the configured cache directory:
//!
//! ```text
//! <dir>/<key>.json      { "documents": [{content, metadata}], "summary": [...],
//!                         "insight_sources": [...], "conversation_chain": null }
//! <dir>/<key>.tmp       transient, only while a write is in progress
//! ```
//!
//! Writes go to the `.tmp` sibling first and are renamed into place, so
//! [`CacheStore::load`] never observes a half-written file. A file that is
//! empty or structurally invalid is treated as a miss and deleted.
//! Caching is an optimization only: every failure is logged and absorbed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::models::{Document, RawValue};
use crate::normalize::clean_metadata;

/// Fixed-length (64 hex chars) identifier of one analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for `(topic, source, start, end)`.
///
/// Fields are joined with the ASCII unit separator before hashing, so
/// `("a_b", "c")` and `("a", "b_c")` stay distinct.
pub fn cache_key(topic: &str, source: &str, start: NaiveDate, end: NaiveDate) -> CacheKey {
    let key_str = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", topic, source, start, end);
    let mut hasher = Sha256::new();
    hasher.update(key_str.as_bytes());
    CacheKey(format!("{:x}", hasher.finalize()))
}

/// Persisted result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub documents: Vec<Document>,
    #[serde(rename = "summary")]
    pub insights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_sources: Option<Vec<Option<String>>>,
    /// Opaque conversation state. Written as `null` by this crate and never
    /// required on load.
    pub conversation_chain: Option<Value>,
}

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn temp_path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.tmp", key))
    }

    /// Read the entry for `key`.
    ///
    /// Returns `None` on a miss. A present but corrupt file is also a miss,
    /// and is deleted so the next run starts clean.
    pub fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        match read_entry(key, &path) {
            Ok(entry) => {
                tracing::debug!(%key, documents = entry.documents.len(), "cache hit");
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding cache file");
                if let Err(rm) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %rm, "could not delete cache file");
                }
                None
            }
        }
    }

    /// Atomically write `entry` under `key`.
    ///
    /// Returns `true` if the entry was stored. An entry without documents is
    /// silently skipped; write failures are logged and the temp file removed.
    pub fn save(&self, key: &CacheKey, entry: &CacheEntry) -> bool {
        if entry.documents.is_empty() {
            tracing::debug!(%key, "nothing to cache");
            return false;
        }

        let tmp = self.temp_path_for(key);
        match self.write_atomic(key, &tmp, entry) {
            Ok(()) => {
                tracing::debug!(%key, "cached analysis");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "error caching results");
                let _ = fs::remove_file(&tmp);
                false
            }
        }
    }

    fn write_atomic(&self, key: &CacheKey, tmp: &Path, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(entry)?;
        fs::write(tmp, bytes)?;
        fs::rename(tmp, self.path_for(key))?;
        Ok(())
    }

    /// Remove every cache and temp file. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_cache_file = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("tmp")
            );
            if is_cache_file && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn read_entry(key: &CacheKey, path: &Path) -> Result<CacheEntry, PipelineError> {
    let corrupt = |reason: String| PipelineError::CacheCorruption {
        key: key.to_string(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    if content.trim().is_empty() {
        return Err(corrupt("empty file".to_string()));
    }

    let data: Value = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
    let obj = data
        .as_object()
        .ok_or_else(|| corrupt("not a JSON object".to_string()))?;
    let raw_docs = obj
        .get("documents")
        .and_then(|d| d.as_array())
        .ok_or_else(|| corrupt("missing documents".to_string()))?;

    let documents: Vec<Document> = raw_docs.iter().filter_map(parse_document).collect();
    if documents.is_empty() {
        return Err(corrupt("no usable documents".to_string()));
    }

    Ok(CacheEntry {
        documents,
        insights: parse_summary(obj.get("summary")),
        insight_sources: obj.get("insight_sources").and_then(parse_sources),
        conversation_chain: obj.get("conversation_chain").filter(|v| !v.is_null()).cloned(),
    })
}

fn parse_document(value: &Value) -> Option<Document> {
    let obj = value.as_object()?;
    let content = obj.get("content")?.as_str()?;
    let metadata = obj
        .get("metadata")
        .cloned()
        .map(RawValue::from)
        .unwrap_or(RawValue::Null);
    Some(Document::new(content, clean_metadata(&metadata)))
}

/// The summary is a list of insights; older files may hold one string.
fn parse_summary(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_sources(value: &Value) -> Option<Vec<Option<String>>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, MetadataValue};
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn entry() -> CacheEntry {
        let mut meta = Metadata::new();
        meta.insert("url".into(), "https://www.reddit.com/r/rust/1".into());
        meta.insert("score".into(), MetadataValue::Int(42));
        meta.insert("ratio".into(), MetadataValue::Float(0.5));
        meta.insert("nsfw".into(), MetadataValue::Bool(false));
        CacheEntry {
            documents: vec![
                Document::new("first post", meta),
                Document::new("second post", Metadata::new()),
            ],
            insights: vec!["Trend one".into(), "Trend two".into()],
            insight_sources: Some(vec![Some("https://www.reddit.com/r/rust/1".into()), None]),
            conversation_chain: None,
        }
    }

    #[test]
    fn key_is_deterministic_and_fixed_length() {
        let a = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        let b = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_changes_with_every_parameter() {
        let base = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        let variants = [
            cache_key("rustlang", "Reddit", d(2024, 1, 1), d(2024, 1, 7)),
            cache_key("rust", "HackerNews", d(2024, 1, 1), d(2024, 1, 7)),
            cache_key("rust", "Reddit", d(2024, 1, 2), d(2024, 1, 7)),
            cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 8)),
        ];
        for v in &variants {
            assert_ne!(&base, v);
        }
    }

    #[test]
    fn key_separator_prevents_shifted_collisions() {
        let a = cache_key("a_b", "c", d(2024, 1, 1), d(2024, 1, 2));
        let b = cache_key("a", "b_c", d(2024, 1, 1), d(2024, 1, 2));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_file_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("x", "y", d(2024, 1, 1), d(2024, 1, 2));
        assert!(store.load(&key).is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path().join("nested/cache"));
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        let original = entry();

        assert!(store.save(&key, &original));
        assert!(!tmp.path().join("nested/cache").join(format!("{}.tmp", key)).exists());

        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn normalized_non_finite_metadata_survives_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        let documents = crate::normalize::normalize(&[crate::models::RawItem::new(
            "post",
            RawValue::map().with("score", f64::NAN).with("url", "u"),
        )]);
        let original = CacheEntry {
            documents,
            insights: vec!["x".into()],
            insight_sources: Some(vec![None]),
            conversation_chain: None,
        };

        assert!(store.save(&key, &original));
        let loaded = store.load(&key).unwrap();
        assert_eq!(
            loaded.documents[0].metadata["score"],
            MetadataValue::Text("NaN".into())
        );
        assert_eq!(loaded, original);
    }

    #[test]
    fn save_into_unwritable_dir_reports_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "occupied").unwrap();
        let store = CacheStore::new(&blocker);
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));

        assert!(!store.save(&key, &entry()));
        assert!(!store.temp_path_for(&key).exists());
        assert!(!store.path_for(&key).exists());
        assert!(store.load(&key).is_none());
    }

    #[test]
    fn file_layout_uses_summary_and_conversation_chain() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        store.save(&key, &entry());

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(store.path_for(&key)).unwrap()).unwrap();
        assert!(raw["documents"].is_array());
        assert_eq!(raw["summary"][0], "Trend one");
        assert!(raw.get("conversation_chain").unwrap().is_null());
        assert_eq!(raw["documents"][0]["content"], "first post");
    }

    #[test]
    fn empty_entry_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        let empty = CacheEntry {
            documents: Vec::new(),
            insights: vec!["x".into()],
            insight_sources: None,
            conversation_chain: None,
        };
        assert!(!store.save(&key, &empty));
        assert!(!store.path_for(&key).exists());
    }

    #[test]
    fn corrupt_files_self_heal() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));

        for garbage in [
            "\u{0}\u{1}garbage{{",
            "",
            "   \n",
            "[1, 2, 3]",
            r#"{"summary": []}"#,
            r#"{"documents": "nope"}"#,
            r#"{"documents": [{"metadata": {}}, 7]}"#,
        ] {
            fs::write(store.path_for(&key), garbage).unwrap();
            assert!(store.load(&key).is_none(), "accepted {:?}", garbage);
            assert!(!store.path_for(&key).exists(), "kept {:?}", garbage);
        }
    }

    #[test]
    fn loaded_metadata_is_sanitized() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        fs::write(
            store.path_for(&key),
            r#"{"documents": [{"content": "p", "metadata": {"a": null, "b": [1], "c": 2}}],
                "summary": "- one\n- two", "conversation_chain": {"opaque": true}}"#,
        )
        .unwrap();

        let loaded = store.load(&key).unwrap();
        let meta = &loaded.documents[0].metadata;
        assert!(!meta.contains_key("a"));
        assert_eq!(meta["b"], MetadataValue::Text("[1]".into()));
        assert_eq!(meta["c"], MetadataValue::Int(2));
        assert_eq!(loaded.insights, vec!["- one", "- two"]);
        assert!(loaded.insight_sources.is_none());
        assert!(loaded.conversation_chain.is_some());
    }

    #[test]
    fn clear_removes_cache_files_only() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let key = cache_key("rust", "Reddit", d(2024, 1, 1), d(2024, 1, 7));
        store.save(&key, &entry());
        fs::write(tmp.path().join("stale.tmp"), "x").unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(tmp.path().join("notes.txt").exists());
    }
}
