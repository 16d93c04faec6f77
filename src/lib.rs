//! # policy-search
//!
//! Retrieval and re-ranking service for youth housing policies. Policies
//! are normalised, chunked by section, embedded, and stored in a flat vector
//! index; queries are answered with eligibility filtering, text
//! de-duplication and intent-weighted re-ranking.
//!
//! ## Architecture
//!
//! ```text
//!   Offline build (POST /api/index)
//!   ───────────────────────────────
//!   policies ──► normalize ──► chunking ──► embeddings ──► vector index
//!                    │                                     + manifest
//!                    └──► eligibility struct ──► policy metadata
//!
//!   Search (POST /api/search)
//!   ─────────────────────────
//!                      ┌──────────────────────┐
//!                      │ query, or profile ──►│ auto query
//!                      └──────────┬───────────┘
//!               ┌─────────────────┼─────────────────┐
//!               ▼                 ▼                 ▼
//!      ┌────────────────┐ ┌───────────────┐ ┌────────────────┐
//!      │ intent weights │ │ query embed + │ │ eligibility    │
//!      │ section/categ. │ │ flat search   │ │ filter (age,   │
//!      │                │ │ (search_k)    │ │ region, income)│
//!      └───────┬────────┘ └──────┬────────┘ └───────┬────────┘
//!              │                 ▼                  │
//!              │        manifest lookup ◄───────────┘
//!              │        chunk id + text dedup
//!              │                 │
//!              └────────►  rank_score = base × section_w × category_w
//!                                │
//!                                ▼
//!                        top_k hits + debug + summary
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, embedding provider, ranking and chunking
//! - [`models`] - Shared data types: `Policy`, `Chunk`, `ManifestRow`, `RetrievalHit`, request/response types
//! - [`normalize`] - Line re-bucketing between sections and regex eligibility extraction
//! - [`chunking`] - Per-section chunking with paragraph/line/window splitting
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs, with retry
//! - [`search::vector`] - Flat cosine/l2 index with disk persistence
//! - [`search::intent`] - Keyword intent detection driving section and category weights
//! - [`search::filter`] - Policy-level age, region and income filter
//! - [`search::retriever`] - Candidate walk, de-duplication and re-ranking
//! - [`profile`] - User profile and automatic query composition
//! - [`corpus`] - Build, save and load a searchable corpus
//! - [`api`] - Axum HTTP handlers for search and index management
//! - [`state`] - Shared application state holding the loaded corpus and build status

pub mod api;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod profile;
pub mod search;
pub mod state;
