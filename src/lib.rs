//! # docqa
//!
//! A local question-answering assistant over PDF document collections.
//!
//! docqa ingests a directory of PDFs into a persisted similarity index and
//! answers natural-language questions by retrieving the most relevant
//! chunks and prompting a locally running language model, which must ground
//! its answer in the retrieved text alone and cite the source file and page
//! of every chunk used.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────────┐
//! │  PDF loader  │──▶│   Pipeline     │──▶│  Vector index    │
//! │   (lopdf)    │   │  Chunk+Embed  │   │ vectors.bin      │
//! └──────────────┘   └───────────────┘   │ chunks.json      │
//!                                        └───────┬─────────┘
//!                                                │
//!                     ┌──────────────────────────┤
//!                     ▼                          ▼
//!               ┌───────────┐             ┌────────────┐
//!               │  QaChain  │────────────▶│  Backend    │
//!               │ retrieve+ │             │ GPU or CPU  │
//!               │  prompt   │             │ (mistralrs) │
//!               └───────────┘             └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa ingest                # build the index from ./data
//! dqa ask "What is RLHF?"   # one-shot question
//! dqa chat                  # interactive session
//! dqa stats                 # index overview
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF directory scanning and page extraction |
//! | [`chunk`] | Fixed-size overlapping text splitting |
//! | [`embedding`] | Embedding provider abstraction (fastembed) |
//! | [`index`] | Persisted vector index and similarity search |
//! | [`backend`] | Hardware-conditioned generation backends |
//! | [`chain`] | Retrieval-augmented answering chain |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`session`] | Interactive chat session and transcript |
//! | [`stats`] | Index statistics |

pub mod backend;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod session;
pub mod stats;
