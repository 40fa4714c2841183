//! Core data models shared by the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One source PDF, loaded into pages.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the documents directory.
    pub path: PathBuf,
    /// Pages in physical order; blank pages are dropped at load time.
    pub pages: Vec<Page>,
}

/// One physical page of a document.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// A bounded-length span of a page's text, the unit of retrieval.
///
/// Identity is deterministic: the same source, page, position, and text
/// always produce the same `id`. Chunks are never mutated after creation;
/// re-running ingestion regenerates them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Source document path, relative to the documents directory.
    pub source: String,
    /// 1-based page number the chunk was cut from.
    pub page: u32,
    /// Position of the chunk within its page.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of the chunk text.
    pub hash: String,
}

/// Where an answer's supporting text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// Source document file name (no directory components).
    pub file: String,
    pub page: u32,
}

/// A generated answer plus its supporting sources, in retrieval order.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
}

/// A chunk scored against a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
