//! End-to-end analysis run.
//!
//! ```text
//! cache key ─▶ cache lookup ─hit──▶ rebuild index from cached documents
//!                  │ miss
//!                  ▼
//!              fetch ─▶ normalize ─▶ build index ─▶ extract insights ─▶ save
//!                                                                        │
//!                         highlights ◀───────────────────────────────────┘
//! ```
//!
//! No content and no valid documents are fatal and leave nothing behind.
//! Extraction failures degrade to the placeholder insight with no engine,
//! and are never cached.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::{cache_key, CacheEntry, CacheKey, CacheStore};
use crate::chat::{ChatSession, ConversationEngine, EngineOptions};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::insights::{extract, ExtractionOutcome};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{Document, Insight};
use crate::normalize::normalize;
use crate::source::{create_source, ContentSource};
use crate::web_search::{create_search, WebSearch};

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub cache_enabled: bool,
    pub insight_count: usize,
    pub highlight_k: usize,
    pub engine: EngineOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            insight_count: 5,
            highlight_k: 5,
            engine: EngineOptions::default(),
        }
    }
}

/// Capabilities shared by every analysis run.
pub struct Services {
    pub source: Arc<dyn ContentSource>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn ChatModel>,
    pub search: Arc<dyn WebSearch>,
    pub cache: CacheStore,
    pub options: AnalysisOptions,
}

impl Services {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            source: Arc::from(create_source(&config.source)?),
            embedder: Arc::from(create_embedder(&config.embedding)?),
            model: Arc::from(create_chat_model(&config.llm)?),
            search: Arc::from(create_search(&config.search)?),
            cache: CacheStore::new(config.cache.dir.clone()),
            options: AnalysisOptions {
                cache_enabled: config.cache.enabled,
                insight_count: config.retrieval.insight_count,
                highlight_k: config.retrieval.highlight_k,
                engine: EngineOptions {
                    k: config.retrieval.chat_k,
                    condense_question: config.chat.condense_question,
                },
            },
        })
    }

    /// Cache key for `request` against the configured source. Surrounding
    /// whitespace in the topic does not change the key.
    pub fn key_for(&self, request: &AnalysisRequest) -> CacheKey {
        cache_key(request.topic.trim(), self.source.name(), request.start, request.end)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub topic: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Per-request opt-out; caching also needs `cache_enabled`.
    pub use_cache: bool,
}

impl AnalysisRequest {
    pub fn new(topic: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            topic: topic.into(),
            start,
            end,
            use_cache: true,
        }
    }
}

pub struct Analysis {
    pub key: CacheKey,
    pub index: Arc<VectorIndex>,
    pub extraction: ExtractionOutcome,
    /// Absent when extraction failed; chat must not be offered then.
    pub engine: Option<ConversationEngine>,
    pub from_cache: bool,
    /// Posts most similar to the topic.
    pub highlights: Vec<Document>,
}

impl Analysis {
    pub fn insights(&self) -> Vec<Insight> {
        self.extraction.insights()
    }

    pub fn sources(&self) -> Vec<Option<String>> {
        self.extraction.sources()
    }

    pub fn into_session(self) -> ChatSession {
        ChatSession::new(self.engine)
    }
}

/// Run one analysis.
///
/// # Errors
///
/// - [`PipelineError::Validation`] for a blank topic or an inverted window.
/// - [`PipelineError::EmptyInput`] when the source returned nothing.
/// - [`PipelineError::NoValidDocuments`] / [`PipelineError::Embedding`]
///   when the index cannot be built.
pub async fn analyze(
    services: &Services,
    request: &AnalysisRequest,
) -> Result<Analysis, PipelineError> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(PipelineError::Validation("topic must not be empty".to_string()));
    }
    if request.start > request.end {
        return Err(PipelineError::Validation(format!(
            "start date {} is after end date {}",
            request.start, request.end
        )));
    }

    let key = services.key_for(request);
    let use_cache = request.use_cache && services.options.cache_enabled;

    if use_cache {
        if let Some(entry) = services.cache.load(&key) {
            match from_cache(services, topic, &key, entry).await {
                Ok(analysis) => return Ok(analysis),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "could not restore cached analysis, running fresh")
                }
            }
        }
    }

    let items = services.source.fetch(topic, request.start, request.end).await;
    if items.is_empty() {
        return Err(PipelineError::EmptyInput {
            topic: topic.to_string(),
        });
    }
    let documents = normalize(&items);
    tracing::info!(topic, documents = documents.len(), "normalized posts");

    let index = Arc::new(build_index(services, topic, documents).await?);
    let extraction = extract(&index, services.model.as_ref(), services.options.insight_count).await;

    if use_cache && extraction.is_success() {
        let entry = CacheEntry {
            documents: index.documents().cloned().collect(),
            insights: extraction.insights().into_iter().map(|i| i.text).collect(),
            insight_sources: Some(extraction.sources()),
            conversation_chain: None,
        };
        services.cache.save(&key, &entry);
    }

    Ok(finish(services, topic, key, index, extraction, false).await)
}

async fn from_cache(
    services: &Services,
    topic: &str,
    key: &CacheKey,
    entry: CacheEntry,
) -> Result<Analysis, PipelineError> {
    if entry.conversation_chain.is_some() {
        tracing::debug!(%key, "ignoring persisted conversation state");
    }

    let sources = entry.insight_sources.unwrap_or_default();
    let insights = entry
        .insights
        .into_iter()
        .enumerate()
        .map(|(i, text)| Insight {
            text,
            source_url: sources.get(i).cloned().flatten(),
        })
        .collect();

    let index = Arc::new(build_index(services, topic, entry.documents).await?);
    tracing::info!(%key, documents = index.len(), "loaded analysis from cache");
    Ok(finish(services, topic, key.clone(), index, ExtractionOutcome::Extracted(insights), true).await)
}

async fn build_index(
    services: &Services,
    topic: &str,
    documents: Vec<Document>,
) -> Result<VectorIndex, PipelineError> {
    VectorIndex::build(services.embedder.clone(), documents)
        .await
        .map_err(|e| match e {
            PipelineError::EmptyInput { .. } => PipelineError::EmptyInput {
                topic: topic.to_string(),
            },
            other => other,
        })
}

async fn finish(
    services: &Services,
    topic: &str,
    key: CacheKey,
    index: Arc<VectorIndex>,
    extraction: ExtractionOutcome,
    from_cache: bool,
) -> Analysis {
    let highlights = match index.query(topic, services.options.highlight_k).await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(error = %e, "could not select highlighted posts");
            Vec::new()
        }
    };

    let engine = extraction.is_success().then(|| {
        ConversationEngine::new(
            index.clone(),
            services.model.clone(),
            services.search.clone(),
            services.options.engine,
        )
    });

    Analysis {
        key,
        index,
        extraction,
        engine,
        from_cache,
        highlights,
    }
}
