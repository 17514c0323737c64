//! # recall
//!
//! Retrieval-augmented search backend for personal study notes.
//!
//! recall consumes "note content changed" events from the owning
//! application, segments each note into semantically bounded chunks, embeds
//! them, and answers natural-language queries against the result with
//! vector, lexical, and hybrid (RRF-fused) search.
//!
//! ```text
//! note changed ──▶ dispatch ──▶ indexer ──▶ chunker ──▶ embedding ──▶ store
//!                                                                      │
//! query ──▶ retrieval (vector ∥ lexical) ──▶ RRF fusion ──▶ answer ◀───┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`token`] | Token estimation for chunk sizing |
//! | [`chunker`] | Markdown section chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Chunk/embedding storage (SQLite + in-memory) |
//! | [`indexer`] | Re-index workflow with retry |
//! | [`dispatch`] | Fire-and-forget change dispatch |
//! | [`retrieval`] | Vector, lexical, and hybrid search |
//! | [`answer`] | Grounded answer assembly |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunker;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod store;
pub mod token;
