//! In-memory vector index over normalized documents.
//!
//! A [`VectorIndex`] is built once from a document set and is read-only
//! afterwards; refreshing the data means building a new index. Search is
//! brute-force cosine similarity over every stored vector, which is the
//! right shape for the few hundred posts a single analysis run ingests.

use std::sync::Arc;

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::error::PipelineError;
use crate::models::Document;

struct Entry {
    doc: Document,
    vector: Vec<f32>,
}

/// A scored search hit borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    pub document: &'a Document,
    pub score: f32,
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Embed `documents` and build an index over them.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::EmptyInput`] if `documents` is empty.
    /// - [`PipelineError::NoValidDocuments`] if every document fails the
    ///   final shape check (blank content).
    /// - [`PipelineError::Embedding`] if the provider fails or returns the
    ///   wrong number of vectors.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        documents: Vec<Document>,
    ) -> Result<Self, PipelineError> {
        if documents.is_empty() {
            return Err(PipelineError::EmptyInput {
                topic: String::new(),
            });
        }

        let total = documents.len();
        let valid: Vec<Document> = documents.into_iter().filter(is_indexable).collect();
        let rejected = total - valid.len();
        if valid.is_empty() {
            return Err(PipelineError::NoValidDocuments { rejected });
        }
        if rejected > 0 {
            tracing::warn!(rejected, "skipped documents with blank content");
        }

        let texts: Vec<String> = valid.iter().map(|d| d.content.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .map_err(PipelineError::embedding)?;

        if vectors.len() != valid.len() {
            return Err(PipelineError::Embedding(format!(
                "expected {} vectors, got {}",
                valid.len(),
                vectors.len()
            )));
        }

        tracing::debug!(
            documents = valid.len(),
            model = embedder.model_name(),
            "built vector index"
        );

        let entries = valid
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| Entry { doc, vector })
            .collect();

        Ok(Self { embedder, entries })
    }

    /// The `k` documents most similar to `text`, by decreasing similarity.
    ///
    /// `k` larger than the index returns every document.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<Hit<'_>>, PipelineError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), text)
            .await
            .map_err(PipelineError::embedding)?;

        let mut hits: Vec<Hit<'_>> = self
            .entries
            .iter()
            .map(|e| Hit {
                document: &e.doc,
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Like [`search`](Self::search) but returns owned documents.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>, PipelineError> {
        Ok(self
            .search(text, k)
            .await?
            .into_iter()
            .map(|h| h.document.clone())
            .collect())
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| &e.doc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_indexable(doc: &Document) -> bool {
    !doc.content.trim().is_empty()
}
