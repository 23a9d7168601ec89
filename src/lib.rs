//! # Kancha
//!
//! Register-aware query routing for a Nepali/English assistant.
//!
//! A query is classified into one of three registers (English, Devanagari
//! Nepali, Romanized Nepali), answered from a semantic FAQ cache when
//! possible, and otherwise sent to a rate-governed language model, with
//! fresh web search results attached when the question depends on current
//! events. Every model answer is sanitized before it is returned.
//!
//! ## Architecture
//!
//! ```text
//!  query ─▶ classifier ─▶ FAQ ──── hit ─────────────────────────────────▶ answer
//!                          │
//!                         miss ─▶ needs retrieval? ─┬─ yes ─▶ web cascade ─┐
//!                                                   └─ no ─────────────────┤
//!                                                                          ▼
//!                                      answer ◀─ sanitizer ◀─ model ◀─ governor
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kancha faq build --seed config/faq.seed.json   # embed the FAQ corpus
//! kancha classify "timro naam k ho?"              # → np
//! kancha ask "who is the current prime minister"
//! kancha serve                                    # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`governor`] | Sliding-window admission control |
//! | [`classifier`] | Register classification |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`faq`] | Semantic FAQ matcher and corpus builder |
//! | [`retrieval`] | Cascading web search |
//! | [`sanitizer`] | Model output post-processing |
//! | [`model`] | Language model clients and fault classification |
//! | [`router`] | Per-request orchestration |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI subcommand implementations |

pub mod classifier;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod faq;
pub mod governor;
pub mod model;
pub mod models;
pub mod retrieval;
pub mod router;
pub mod sanitizer;
pub mod server;
