//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: directory scan -> page extraction -> chunking
//! -> embedding -> atomic index persist. Any document that fails to load
//! aborts the run; a partial index is never written.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::chunk::split_page;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider, LocalEmbedder};
use crate::index::VectorIndex;
use crate::loader;
use crate::models::Chunk;

pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let paths = loader::scan_documents(&config.documents)?;
    info!(
        count = paths.len(),
        dir = %config.documents.dir.display(),
        "found documents"
    );

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        let document = loader::load_document(&config.documents.dir, path)?;
        info!(path = %path.display(), pages = document.pages.len(), "loaded");
        documents.push(document);
    }

    let total_pages: usize = documents.iter().map(|d| d.pages.len()).sum();

    let mut chunks: Vec<Chunk> = Vec::new();
    for document in &documents {
        let source = document.path.to_string_lossy();
        for page in &document.pages {
            chunks.extend(split_page(
                &source,
                page,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ));
        }
    }

    if chunks.is_empty() {
        bail!(
            "No text could be extracted from {} document(s) under {}",
            documents.len(),
            config.documents.dir.display()
        );
    }

    if dry_run {
        println!("ingest {} (dry-run)", config.documents.dir.display());
        println!("  documents: {}", documents.len());
        println!("  pages: {}", total_pages);
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let embedder = LocalEmbedder::load(&config.embedding).await?;
    let provider: Arc<dyn EmbeddingProvider> = embedder.clone();

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = embedding::embed_texts(provider, texts).await?;

    let index = VectorIndex::build(embedder.model_name(), embedder.dims(), chunks, vectors)?;
    index.persist(&config.index.dir).with_context(|| {
        format!(
            "Failed to persist index at {}",
            config.index.dir.display()
        )
    })?;

    println!("ingest {}", config.documents.dir.display());
    println!("  documents: {}", documents.len());
    println!("  pages: {}", total_pages);
    println!("  chunks: {}", index.len());
    println!(
        "  embedding model: {} ({} dims)",
        embedder.model_name(),
        embedder.dims()
    );
    println!("  index: {}", config.index.dir.display());
    println!("ok");

    Ok(())
}
