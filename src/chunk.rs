//! Fixed-size overlapping text splitter.
//!
//! Splits a page's text into [`Chunk`]s of at most `chunk_size` characters,
//! each sharing `chunk_overlap` characters with its predecessor so that
//! context spanning a chunk boundary survives retrieval.
//!
//! Splitting is deterministic: the same page text always produces the same
//! chunk texts and ids. Each chunk's id is a UUIDv5 derived from its source
//! path, page number, position, and a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Page};

/// Split one page into overlapping chunks.
///
/// Operates on character boundaries, so multi-byte text is never cut inside
/// a code point. A page shorter than `chunk_size` yields exactly one chunk;
/// empty text yields none. Callers must validate `chunk_overlap < chunk_size`
/// (enforced at config load).
pub fn split_page(source: &str, page: &Page, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    debug_assert!(chunk_overlap < chunk_size);

    let chars: Vec<char> = page.text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0usize;

    loop {
        let end = (start + chunk_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(source, page.number, chunk_index, &text));

        if end == chars.len() {
            break;
        }
        start += stride;
        chunk_index += 1;
    }

    chunks
}

fn make_chunk(source: &str, page: u32, chunk_index: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}:{}:{}:{}", source, page, chunk_index, hash);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

    Chunk {
        id,
        source: source.to_string(),
        page,
        chunk_index,
        text: text.to_string(),
        hash,
    }
}
