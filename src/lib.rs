//! # docqa
//!
//! Document question answering over a local vector index.
//!
//! docqa ingests documents (plain text, Markdown, PDF, DOCX), chunks them
//! with overlap, embeds the chunks, and stores the vectors in SQLite.
//! Questions are answered from the most similar chunks when similarity
//! clears a threshold, and fall back to the bare generation model
//! otherwise. A bounded conversation memory persists across restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────┐
//! │  Store    │──▶│   Ingest      │──▶│  SQLite    │
//! │ files/dir │   │ Extract+Chunk │   │ vectors    │
//! └──────────┘   │    +Embed     │   └─────┬─────┘
//!                └───────────────┘         │
//!                                          ▼
//!                ┌───────────────┐   ┌───────────┐
//!                │   QaEngine    │◀──│  search    │
//!                │ retrieve/fall │   └───────────┘
//!                │ back+memory   │
//!                └──────┬────────┘
//!                       │
//!              ┌────────┴────────┐
//!              ▼                 ▼
//!         ┌─────────┐      ┌──────────┐
//!         │   CLI   │      │   HTTP   │
//!         │  (dqa)  │      │  (axum)  │
//!         └─────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa init                          # create the index
//! dqa ingest ./docs                 # chunk + embed a directory
//! dqa ask "What does the contract say about renewal?"
//! dqa serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text cleaning and overlapping chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | SQLite-backed vector index |
//! | [`memory`] | Persisted conversation memory |
//! | [`generation`] | Generation provider abstraction |
//! | [`engine`] | Question-answering orchestration |
//! | [`extract`] | File-type text extraction |
//! | [`store`] | Filesystem document store |
//! | [`ingest`] | Ingestion pipeline |
//! | [`server`] | JSON HTTP API |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod server;
pub mod store;
