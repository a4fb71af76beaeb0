//! # Trend Harness
//!
//! A retrieval-augmented trend analysis assistant.
//!
//! Trend Harness collects social-media posts on a topic, embeds them into an
//! in-memory vector index, summarizes them into attributed key insights, and
//! answers follow-up questions through a retrieval-augmented chat that falls
//! back to open web search when the local posts are not enough. Completed
//! runs are cached on disk keyed by their query parameters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────┐   ┌──────────┐
//! │  Source  │──▶│ Normalize │──▶│ VectorIndex │──▶│ Insights │
//! │ Reddit/  │   │           │   │  (cosine)   │   │  (LLM)   │
//! │  File    │   └───────────┘   └──────┬──────┘   └────┬─────┘
//! └──────────┘                          │               │
//!                                       ▼               ▼
//!                              ┌──────────────┐   ┌──────────┐
//!                              │ Conversation │   │  Cache   │
//!                              │    Engine    │   │  (JSON)  │
//!                              └──────┬───────┘   └──────────┘
//!                                     │ uncertain
//!                                     ▼
//!                              ┌──────────────┐
//!                              │  Web search  │
//!                              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! trend analyze "rust 2024"                 # insights for the last 7 days
//! trend chat "rust 2024" --start 2024-01-01 # analyze, then ask questions
//! trend cache clear
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and credential checks |
//! | [`models`] | Core data types |
//! | [`source`] | Content sources (Reddit, JSON file) |
//! | [`normalize`] | Raw item → document normalization |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`llm`] | Chat model abstraction |
//! | [`insights`] | Insight extraction with source attribution |
//! | [`chat`] | Conversational retrieval and chat sessions |
//! | [`web_search`] | Web fallback search |
//! | [`cache`] | Durable analysis cache |
//! | [`pipeline`] | End-to-end analysis run |
//! | [`commands`] | CLI command implementations |

pub mod cache;
pub mod chat;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod http;
pub mod index;
pub mod insights;
pub mod llm;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod web_search;
