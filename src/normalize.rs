//! Raw item → [`Document`] normalization.
//!
//! Metadata is sanitized field by field so that every document carries only
//! primitive scalars:
//!
//! | Raw value | Result |
//! |-----------|--------|
//! | bool / integer / finite float / string | unchanged |
//! | NaN, infinity | string (`"NaN"`, `"inf"`, `"-inf"`) |
//! | date, date-time | ISO-8601 string |
//! | list, mapping | JSON string |
//! | null | field dropped |
//!
//! A metadata argument that is not a mapping degrades to an empty mapping.
//! Normalization never fails for individual items; structurally malformed
//! input is rejected earlier, by [`parse_raw_items`].

use serde_json::Value;

use crate::error::PipelineError;
use crate::models::{iso_8601, Document, Metadata, MetadataValue, RawItem, RawValue};

/// Normalize a batch of raw items, preserving order.
pub fn normalize(items: &[RawItem]) -> Vec<Document> {
    items
        .iter()
        .map(|item| Document::new(item.text.clone(), clean_metadata(&item.metadata)))
        .collect()
}

/// Normalize texts with positional metadata. Texts without a matching
/// metadata entry get an empty mapping.
pub fn normalize_texts(texts: &[String], metadatas: &[RawValue]) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let metadata = metadatas.get(i).map(clean_metadata).unwrap_or_default();
            Document::new(text.clone(), metadata)
        })
        .collect()
}

/// Normalize texts that all share one metadata mapping.
pub fn normalize_shared(texts: &[String], metadata: &RawValue) -> Vec<Document> {
    let cleaned = clean_metadata(metadata);
    texts
        .iter()
        .map(|text| Document::new(text.clone(), cleaned.clone()))
        .collect()
}

/// Sanitize one metadata mapping to primitive-only fields.
pub fn clean_metadata(metadata: &RawValue) -> Metadata {
    let map = match metadata {
        RawValue::Map(map) => map,
        _ => return Metadata::new(),
    };

    let mut cleaned = Metadata::new();
    for (key, value) in map {
        if let Some(v) = clean_value(value) {
            cleaned.insert(key.clone(), v);
        }
    }
    cleaned
}

fn clean_value(value: &RawValue) -> Option<MetadataValue> {
    match value {
        RawValue::Null => None,
        RawValue::Bool(b) => Some(MetadataValue::Bool(*b)),
        RawValue::Int(n) => Some(MetadataValue::Int(*n)),
        // JSON has no NaN or infinity; keep them readable instead of lossy.
        RawValue::Float(f) if !f.is_finite() => Some(MetadataValue::Text(f.to_string())),
        RawValue::Float(f) => Some(MetadataValue::Float(*f)),
        RawValue::Text(s) => Some(MetadataValue::Text(s.clone())),
        RawValue::Date(_) | RawValue::DateTime(_) | RawValue::Timestamp(_) => {
            iso_8601(value).map(MetadataValue::Text)
        }
        RawValue::List(_) | RawValue::Map(_) => Some(MetadataValue::Text(value.to_json().to_string())),
    }
}

/// Parse raw items from JSON.
///
/// Accepts an array whose elements are either bare strings or objects with
/// a string `text` (or `content`) field and an optional `metadata` value.
///
/// # Errors
///
/// [`PipelineError::Validation`] if the value is not an array, or if any
/// element is not text-like.
pub fn parse_raw_items(value: &Value) -> Result<Vec<RawItem>, PipelineError> {
    let array = value
        .as_array()
        .ok_or_else(|| PipelineError::Validation("expected a list of items".to_string()))?;

    array
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::String(s) => Ok(RawItem::new(s.clone(), RawValue::map())),
            Value::Object(obj) => {
                let text = obj
                    .get("text")
                    .or_else(|| obj.get("content"))
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| {
                        PipelineError::Validation(format!("item {} has no text field", i))
                    })?;
                let metadata = obj
                    .get("metadata")
                    .cloned()
                    .map(RawValue::from)
                    .unwrap_or_else(RawValue::map);
                Ok(RawItem::new(text, metadata))
            }
            other => Err(PipelineError::Validation(format!(
                "item {} is not text-like: {}",
                i, other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn jan_first() -> RawValue {
        RawValue::DateTime(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn drops_nulls_and_formats_datetimes() {
        let meta = RawValue::map()
            .with("a", RawValue::Null)
            .with("b", 5i64)
            .with("c", jan_first());
        let cleaned = clean_metadata(&meta);

        assert_eq!(cleaned.len(), 2);
        assert!(!cleaned.contains_key("a"));
        assert_eq!(cleaned["b"], MetadataValue::Int(5));
        assert_eq!(
            cleaned["c"],
            MetadataValue::Text("2024-01-01T00:00:00".to_string())
        );
    }

    #[test]
    fn non_finite_floats_become_text() {
        let meta = RawValue::map()
            .with("nan", f64::NAN)
            .with("up", f64::INFINITY)
            .with("down", f64::NEG_INFINITY)
            .with("ok", 0.5);
        let cleaned = clean_metadata(&meta);
        assert_eq!(cleaned["nan"], MetadataValue::Text("NaN".into()));
        assert_eq!(cleaned["up"], MetadataValue::Text("inf".into()));
        assert_eq!(cleaned["down"], MetadataValue::Text("-inf".into()));
        assert_eq!(cleaned["ok"], MetadataValue::Float(0.5));
    }

    #[test]
    fn structured_values_are_stringified() {
        let meta = RawValue::map().with(
            "tags",
            RawValue::List(vec!["rust".into(), RawValue::Int(2)]),
        );
        let cleaned = clean_metadata(&meta);
        assert_eq!(cleaned["tags"], MetadataValue::Text(r#"["rust",2]"#.to_string()));
    }

    #[test]
    fn non_mapping_metadata_becomes_empty() {
        let docs = normalize(&[
            RawItem::new("one", RawValue::Text("not a map".into())),
            RawItem::new("two", RawValue::Null),
        ]);
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.metadata.is_empty()));
    }

    #[test]
    fn normalization_is_idempotent() {
        let items = vec![
            RawItem::new(
                "post",
                RawValue::map()
                    .with("url", "https://example.com/p/1")
                    .with("when", jan_first())
                    .with("score", 1.25)
                    .with("ratio", f64::NAN)
                    .with("gone", RawValue::Null),
            ),
            RawItem::new("bare", RawValue::Null),
        ];
        let once = normalize(&items);
        let again_input: Vec<RawItem> = once.iter().cloned().map(RawItem::from).collect();
        let twice = normalize(&again_input);
        assert_eq!(once, twice);
    }

    #[test]
    fn positional_metadata_shorter_than_texts() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let docs = normalize_texts(&texts, &[RawValue::map().with("k", "v")]);
        assert_eq!(docs[0].metadata["k"], MetadataValue::Text("v".into()));
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn shared_metadata_applies_to_all() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let docs = normalize_shared(&texts, &RawValue::map().with("source", "Reddit"));
        assert!(docs
            .iter()
            .all(|d| d.meta_str("source").as_deref() == Some("Reddit")));
    }

    #[test]
    fn parses_strings_and_objects() {
        let items = parse_raw_items(&json!([
            "plain text",
            {"text": "with meta", "metadata": {"url": "https://x", "n": null}},
            {"content": "alt field"}
        ]))
        .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].metadata.get("url"), Some(&RawValue::Text("https://x".into())));
        assert_eq!(items[2].text, "alt field");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse_raw_items(&json!({"text": "x"})),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            parse_raw_items(&json!(["ok", 42])),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            parse_raw_items(&json!([{"metadata": {}}])),
            Err(PipelineError::Validation(_))
        ));
    }
}
