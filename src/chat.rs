//! Conversational retrieval over an analysis run.
//!
//! [`ConversationEngine`] answers follow-up questions by retrieving the
//! most similar posts from the run's [`VectorIndex`], conditioning the chat
//! model on them plus the conversation so far, and falling back to an open
//! web search when the answer reads as uncertain.
//!
//! [`ChatSession`] is the per-session context object the caller owns: the
//! append-only transcript shown to the user, plus the engine (absent when
//! the analysis run could not initialize one).

use std::sync::Arc;

use serde::Serialize;

use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{ChatTurn, Document, SourceRef};
use crate::web_search::{fallback_search, WebSearch};

pub const SYSTEM_FRAMING: &str = "You are a helpful AI assistant analyzing social media trends. \
Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Lower-case phrases that mark an answer as uncertain.
///
/// This is a plain substring heuristic. An answer that legitimately quotes
/// one of these phrases from the retrieved posts also triggers the web
/// fallback.
pub const UNCERTAINTY_PHRASES: [&str; 6] = [
    "i don't know",
    "not sure",
    "don't have enough information",
    "cannot answer",
    "unable to find",
    "no information available",
];

pub const WEB_ANSWER_PREFIX: &str = "Based on web search:\n\n";
pub const NOT_INITIALIZED: &str =
    "Sorry, the conversation chain is not initialized. Please run analysis again.";
pub const ANSWER_APOLOGY: &str = "Sorry, I couldn't answer that question right now.";

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

pub fn is_uncertain(answer: &str) -> bool {
    let lower = answer.trim().to_lowercase();
    UNCERTAINTY_PHRASES.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub used_web_search: bool,
}

impl Answer {
    fn plain(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            used_web_search: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Documents retrieved per question.
    pub k: usize,
    pub condense_question: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            k: 4,
            condense_question: true,
        }
    }
}

pub struct ConversationEngine {
    index: Arc<VectorIndex>,
    model: Arc<dyn ChatModel>,
    search: Arc<dyn WebSearch>,
    options: EngineOptions,
    memory: Vec<ChatMessage>,
}

impl ConversationEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        model: Arc<dyn ChatModel>,
        search: Arc<dyn WebSearch>,
        options: EngineOptions,
    ) -> Self {
        Self {
            index,
            model,
            search,
            options,
            memory: Vec::new(),
        }
    }

    /// Model-facing history: alternating user and assistant messages.
    pub fn memory(&self) -> &[ChatMessage] {
        &self.memory
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Answer `question`.
    ///
    /// Never fails: a retrieval or completion error yields
    /// [`ANSWER_APOLOGY`] with no sources, and leaves memory untouched.
    pub async fn ask(&mut self, question: &str) -> Answer {
        let (raw, docs) = match self.generate(question).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "error answering question");
                return Answer::plain(ANSWER_APOLOGY);
            }
        };

        let answer = if is_uncertain(&raw) {
            tracing::info!("answer is uncertain, falling back to web search");
            let web = fallback_search(self.search.as_ref(), question).await;
            Answer {
                answer: format!("{}{}", WEB_ANSWER_PREFIX, web),
                sources: Vec::new(),
                used_web_search: true,
            }
        } else {
            Answer {
                answer: raw,
                sources: docs.iter().map(SourceRef::from).collect(),
                used_web_search: false,
            }
        };

        self.memory.push(ChatMessage::user(question));
        self.memory.push(ChatMessage::assistant(answer.answer.clone()));
        answer
    }

    async fn generate(&self, question: &str) -> Result<(String, Vec<Document>), PipelineError> {
        let standalone = self.standalone_question(question).await;
        let docs = self.index.query(&standalone, self.options.k).await?;
        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(self.memory.len() + 2);
        messages.push(ChatMessage::system(format!(
            "{}\n\nContext: {}",
            SYSTEM_FRAMING, context
        )));
        messages.extend(self.memory.iter().cloned());
        messages.push(ChatMessage::user(standalone));

        let raw = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| PipelineError::Completion(e.to_string()))?;
        Ok((raw, docs))
    }

    /// Rewrite a follow-up into a standalone question when there is history
    /// to resolve it against.
    async fn standalone_question(&self, question: &str) -> String {
        if !self.options.condense_question || self.memory.is_empty() {
            return question.to_string();
        }

        let history = self
            .memory
            .iter()
            .map(|m| {
                let speaker = if m.role == "user" { "Human" } else { "Assistant" };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{}\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
            CONDENSE_PROMPT, history, question
        );

        match self.model.complete(&[ChatMessage::user(prompt)]).await {
            Ok(condensed) if !condensed.trim().is_empty() => condensed.trim().to_string(),
            Ok(_) => question.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "could not condense follow-up question");
                question.to_string()
            }
        }
    }
}

/// Per-session conversation context.
pub struct ChatSession {
    transcript: Vec<ChatTurn>,
    engine: Option<ConversationEngine>,
}

impl ChatSession {
    pub fn new(engine: Option<ConversationEngine>) -> Self {
        Self {
            transcript: Vec::new(),
            engine,
        }
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&ConversationEngine> {
        self.engine.as_ref()
    }

    /// Ask a question, appending the user turn and the reply to the
    /// transcript.
    pub async fn ask(&mut self, question: &str) -> Answer {
        self.transcript.push(ChatTurn::user(question));

        let answer = match self.engine.as_mut() {
            Some(engine) => engine.ask(question).await,
            None => Answer::plain(NOT_INITIALIZED),
        };

        self.transcript.push(ChatTurn::assistant(
            answer.answer.clone(),
            answer.sources.clone(),
        ));
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncertainty_is_case_insensitive() {
        assert!(is_uncertain("I Don't Know the answer to that."));
        assert!(is_uncertain("  There is NO INFORMATION AVAILABLE here "));
        assert!(is_uncertain("I'm not sure, honestly"));
        assert!(!is_uncertain("Rust adoption grew sharply this week."));
    }

    #[test]
    fn every_phrase_triggers() {
        for phrase in UNCERTAINTY_PHRASES {
            assert!(is_uncertain(&format!("Well, {}.", phrase.to_uppercase())));
        }
    }

    #[tokio::test]
    async fn uninitialized_session_replies_statically() {
        let mut session = ChatSession::new(None);
        assert!(!session.is_ready());

        let answer = session.ask("what is trending?").await;
        assert_eq!(answer.answer, NOT_INITIALIZED);
        assert!(answer.sources.is_empty());

        let turns = session.transcript();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("what is trending?"));
        assert_eq!(turns[1].content, NOT_INITIALIZED);
    }
}
