//! Core data models used throughout Trend Harness.
//!
//! These types represent the raw posts, normalized documents, insights, and
//! chat turns that flow through the analysis and conversation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// An untyped metadata value as produced by a content source.
///
/// Sources may hand over anything, including nested structures and
/// date-times; the normalizer reduces these to [`MetadataValue`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// An empty mapping.
    pub fn map() -> Self {
        RawValue::Map(BTreeMap::new())
    }

    /// Builder-style insert; has no effect on non-mapping values.
    pub fn with(mut self, key: &str, value: impl Into<RawValue>) -> Self {
        if let RawValue::Map(ref mut map) = self {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            RawValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// JSON rendering, used when a structured value has to be stringified.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            RawValue::Null => Value::Null,
            RawValue::Bool(b) => Value::Bool(*b),
            RawValue::Int(n) => Value::from(*n),
            RawValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            RawValue::Text(s) => Value::String(s.clone()),
            RawValue::Date(_) | RawValue::DateTime(_) | RawValue::Timestamp(_) => {
                Value::String(iso_8601(self).unwrap_or_default())
            }
            RawValue::List(items) => Value::Array(items.iter().map(RawValue::to_json).collect()),
            RawValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// ISO-8601 rendering of date/time values; `None` for anything else.
///
/// Naive date-times render without an offset (`2024-01-01T00:00:00`);
/// fractional seconds appear only when non-zero.
pub fn iso_8601(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        RawValue::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        RawValue::Timestamp(ts) => Some(ts.format("%Y-%m-%dT%H:%M:%S%.f+00:00").to_string()),
        _ => None,
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Int(n)
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Float(f)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(d: NaiveDate) -> Self {
        RawValue::Date(d)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(dt: NaiveDateTime) -> Self {
        RawValue::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(ts: DateTime<Utc>) -> Self {
        RawValue::Timestamp(ts)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => RawValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => RawValue::Text(s),
            Value::Array(items) => RawValue::List(items.into_iter().map(RawValue::from).collect()),
            Value::Object(map) => RawValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Raw `(text, metadata)` pair produced by a content source before
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub text: String,
    pub metadata: RawValue,
}

impl RawItem {
    pub fn new(text: impl Into<String>, metadata: RawValue) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

impl From<Document> for RawItem {
    fn from(doc: Document) -> Self {
        let metadata = RawValue::Map(
            doc.metadata
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
        );
        Self {
            text: doc.content,
            metadata,
        }
    }
}

/// A primitive metadata scalar. The only kind of value a [`Document`] may
/// carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(n) => write!(f, "{}", n),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<MetadataValue> for RawValue {
    fn from(v: MetadataValue) -> Self {
        match v {
            MetadataValue::Bool(b) => RawValue::Bool(b),
            MetadataValue::Int(n) => RawValue::Int(n),
            MetadataValue::Float(x) => RawValue::Float(x),
            MetadataValue::Text(s) => RawValue::Text(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Int(n)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Normalized document, as embedded into the vector index and persisted in
/// the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// String rendering of a metadata field, if present.
    pub fn meta_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(|v| v.to_string())
    }

    /// The post URL, if the source recorded a non-empty one.
    pub fn url(&self) -> Option<String> {
        self.meta_str("url").filter(|u| !u.is_empty())
    }
}

/// A single extracted bullet-point insight with its attributed source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub text: String,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Attribution for one retrieved document that fed an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub username: String,
    pub timestamp: String,
    pub content: String,
    pub index: i64,
}

impl From<&Document> for SourceRef {
    fn from(doc: &Document) -> Self {
        let index = match doc.metadata.get("source_index") {
            Some(MetadataValue::Int(n)) => *n,
            Some(MetadataValue::Float(x)) => *x as i64,
            Some(MetadataValue::Text(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };
        Self {
            source: doc
                .meta_str("source")
                .unwrap_or_else(|| "Unknown".to_string()),
            username: doc.meta_str("username").unwrap_or_default(),
            timestamp: doc.meta_str("timestamp").unwrap_or_default(),
            content: doc.content.clone(),
            index,
        }
    }
}

/// One entry of the append-only conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_8601_matches_naive_isoformat() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            iso_8601(&RawValue::DateTime(dt)).as_deref(),
            Some("2024-01-01T00:00:00")
        );
        assert_eq!(iso_8601(&RawValue::Int(3)), None);
    }

    #[test]
    fn metadata_value_untagged_json() {
        let meta: Metadata =
            serde_json::from_str(r#"{"a": true, "b": 5, "c": 1.5, "d": "x"}"#).unwrap();
        assert_eq!(meta["a"], MetadataValue::Bool(true));
        assert_eq!(meta["b"], MetadataValue::Int(5));
        assert_eq!(meta["c"], MetadataValue::Float(1.5));
        assert_eq!(meta["d"], MetadataValue::Text("x".into()));
    }

    #[test]
    fn source_ref_defaults() {
        let doc = Document::new("post body", Metadata::new());
        let r = SourceRef::from(&doc);
        assert_eq!(r.source, "Unknown");
        assert_eq!(r.username, "");
        assert_eq!(r.timestamp, "");
        assert_eq!(r.content, "post body");
        assert_eq!(r.index, 0);
    }

    #[test]
    fn source_ref_reads_metadata() {
        let mut meta = Metadata::new();
        meta.insert("source".into(), "Reddit".into());
        meta.insert("username".into(), "alice".into());
        meta.insert("source_index".into(), MetadataValue::Int(7));
        let r = SourceRef::from(&Document::new("x", meta));
        assert_eq!(r.source, "Reddit");
        assert_eq!(r.username, "alice");
        assert_eq!(r.index, 7);
    }

    #[test]
    fn empty_url_is_absent() {
        let mut meta = Metadata::new();
        meta.insert("url".into(), "".into());
        assert_eq!(Document::new("x", meta).url(), None);
    }
}
