//! Index statistics and health overview.
//!
//! A quick summary of what's indexed: document and chunk counts, the
//! embedding model the index was built with, and on-disk sizes. Used by
//! `dqa stats` to confirm an ingestion run did what was expected.

use anyhow::{bail, Result};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::index::{VectorIndex, CHUNKS_FILE, VECTORS_FILE};

pub fn run_stats(config: &Config) -> Result<()> {
    let dir = &config.index.dir;
    if !VectorIndex::exists(dir) {
        bail!(
            "No index found at {}. Run `dqa ingest` to build it first.",
            dir.display()
        );
    }

    let index = VectorIndex::load(dir)?;

    let on_disk: u64 = [VECTORS_FILE, CHUNKS_FILE]
        .into_iter()
        .filter_map(|name| std::fs::metadata(dir.join(name)).ok())
        .map(|meta| meta.len())
        .sum();

    let mut per_document: BTreeMap<&str, usize> = BTreeMap::new();
    for chunk in index.chunks() {
        *per_document.entry(chunk.source.as_str()).or_default() += 1;
    }

    println!("docqa — Index Stats");
    println!("===================");
    println!();
    println!("  Index:       {}", dir.display());
    println!("  Size:        {}", format_bytes(on_disk));
    println!(
        "  Built:       {}",
        index.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Model:       {} ({} dims)",
        index.model_name(),
        index.dims()
    );
    println!();
    println!("  Documents:   {}", per_document.len());
    println!("  Chunks:      {}", index.len());

    if !per_document.is_empty() {
        println!();
        println!("  Per document:");
        for (source, count) in &per_document {
            println!("    {:<48} {} chunks", source, count);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
