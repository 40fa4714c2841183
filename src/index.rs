//! Persisted vector index.
//!
//! The index lives in one directory as exactly two files:
//!
//! - `vectors.bin` — packed embedding vectors: an 8-byte magic, dims (u32 LE),
//!   count (u64 LE), then `count × dims` little-endian f32 values.
//! - `chunks.json` — the embedding model name, dimensionality, build
//!   timestamp, and every chunk in vector order.
//!
//! It is created wholesale by ingestion and loaded read-only by the query
//! pipeline; there is no incremental update path. Persisting writes both
//! files into a temp directory and swaps it into place, so an interrupted
//! run can never leave a half-written index behind.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.json";

const VECTORS_MAGIC: &[u8; 8] = b"DQAIDX01";
const VECTORS_HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Serialize)]
struct MetaOut<'a> {
    model: &'a str,
    dims: usize,
    created_at: DateTime<Utc>,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct MetaIn {
    model: String,
    dims: usize,
    created_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
}

/// An in-memory similarity index over (chunk, vector) pairs.
pub struct VectorIndex {
    model: String,
    dims: usize,
    created_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Assemble an index from parallel chunk/vector lists.
    pub fn build(
        model: &str,
        dims: usize,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dims {
                bail!(
                    "vector {} has {} dims, expected {}",
                    i,
                    vector.len(),
                    dims
                );
            }
        }

        Ok(Self {
            model: model.to_string(),
            dims,
            created_at: Utc::now(),
            chunks,
            vectors,
        })
    }

    /// Whether a persisted index is present at `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(VECTORS_FILE).is_file() && dir.join(CHUNKS_FILE).is_file()
    }

    /// Write the index to `dir`, replacing any prior index. Both files are
    /// written into a sibling temp directory first and swapped in with a
    /// rename.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        if let Some(parent) = dir.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = tmp_dir_for(dir);
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;

        let mut buf =
            Vec::with_capacity(VECTORS_HEADER_LEN + self.vectors.len() * self.dims * 4);
        buf.extend_from_slice(VECTORS_MAGIC);
        buf.extend_from_slice(&(self.dims as u32).to_le_bytes());
        buf.extend_from_slice(&(self.vectors.len() as u64).to_le_bytes());
        for vector in &self.vectors {
            for &value in vector {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        std::fs::write(tmp.join(VECTORS_FILE), &buf)
            .with_context(|| format!("Failed to write {}", VECTORS_FILE))?;

        let meta = MetaOut {
            model: &self.model,
            dims: self.dims,
            created_at: self.created_at,
            chunks: &self.chunks,
        };
        std::fs::write(tmp.join(CHUNKS_FILE), serde_json::to_vec(&meta)?)
            .with_context(|| format!("Failed to write {}", CHUNKS_FILE))?;

        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::rename(&tmp, dir)
            .with_context(|| format!("Failed to move index into place at {}", dir.display()))?;

        Ok(())
    }

    /// Load a persisted index read-only.
    pub fn load(dir: &Path) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let bytes = std::fs::read(&vectors_path)
            .with_context(|| format!("Failed to read {}", vectors_path.display()))?;

        if bytes.len() < VECTORS_HEADER_LEN || &bytes[..8] != VECTORS_MAGIC {
            bail!("{} is not a docqa vector file", vectors_path.display());
        }

        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let count = u64::from_le_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18],
            bytes[19],
        ]) as usize;

        let expected = VECTORS_HEADER_LEN + count * dims * 4;
        if bytes.len() != expected {
            bail!(
                "{} is truncated: {} bytes, expected {}",
                vectors_path.display(),
                bytes.len(),
                expected
            );
        }

        let mut vectors = Vec::with_capacity(count);
        let mut offset = VECTORS_HEADER_LEN;
        for _ in 0..count {
            let vector: Vec<f32> = bytes[offset..offset + dims * 4]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            vectors.push(vector);
            offset += dims * 4;
        }

        let chunks_path = dir.join(CHUNKS_FILE);
        let meta_bytes = std::fs::read(&chunks_path)
            .with_context(|| format!("Failed to read {}", chunks_path.display()))?;
        let meta: MetaIn = serde_json::from_slice(&meta_bytes)
            .with_context(|| format!("Failed to parse {}", chunks_path.display()))?;

        if meta.dims != dims {
            bail!(
                "index metadata disagrees on dims: {} vs {}",
                meta.dims,
                dims
            );
        }
        if meta.chunks.len() != count {
            bail!(
                "index metadata has {} chunks but vector file has {}",
                meta.chunks.len(),
                count
            );
        }

        Ok(Self {
            model: meta.model,
            dims,
            created_at: meta.created_at,
            chunks: meta.chunks,
            vectors,
        })
    }

    /// Nearest chunks to `query` by cosine similarity, most similar first.
    /// Returns fewer than `k` when the index holds fewer chunks. Ties break
    /// toward the earlier chunk for deterministic ordering.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_similarity(query, vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

fn tmp_dir_for(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source: "doc.pdf".to_string(),
            page: 1,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            "test-model",
            3,
            vec![chunk("a", "alpha"), chunk("b", "beta"), chunk("c", "gamma")],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.7, 0.7, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn build_rejects_mismatched_counts() {
        let result = VectorIndex::build("m", 3, vec![chunk("a", "x")], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_wrong_dims() {
        let result = VectorIndex::build("m", 3, vec![chunk("a", "x")], vec![vec![1.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn search_orders_by_similarity() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.1, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.id, "a");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[test]
    fn search_returns_available_when_k_exceeds_len() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.0, 0.0], 5);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn search_tie_breaks_toward_earlier_chunk() {
        let index = VectorIndex::build(
            "m",
            2,
            vec![chunk("first", "x"), chunk("second", "y")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].chunk.id, "first");
        assert_eq!(hits[1].chunk.id, "second");
    }

    #[test]
    fn persist_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore");

        let index = sample_index();
        index.persist(&dir).unwrap();

        assert!(VectorIndex::exists(&dir));
        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model_name(), "test-model");
        assert_eq!(loaded.dims(), 3);
        assert_eq!(loaded.chunks()[1].id, "b");

        let hits = loaded.search(&[0.0, 1.0, 0.0], 1);
        assert_eq!(hits[0].chunk.id, "b");
    }

    #[test]
    fn persist_leaves_no_temp_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore");

        sample_index().persist(&dir).unwrap();
        assert!(!tmp_dir_for(&dir).exists());
    }

    #[test]
    fn persist_overwrites_prior_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore");

        sample_index().persist(&dir).unwrap();

        let smaller =
            VectorIndex::build("test-model", 2, vec![chunk("only", "x")], vec![vec![0.5, 0.5]])
                .unwrap();
        smaller.persist(&dir).unwrap();

        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dims(), 2);
    }

    #[test]
    fn load_missing_index_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nothing-here");
        assert!(!VectorIndex::exists(&dir));
        assert!(VectorIndex::load(&dir).is_err());
    }

    #[test]
    fn load_rejects_foreign_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(VECTORS_FILE), b"garbage").unwrap();
        std::fs::write(dir.join(CHUNKS_FILE), b"{}").unwrap();

        assert!(VectorIndex::load(&dir).is_err());
    }
}
