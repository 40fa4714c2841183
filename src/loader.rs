//! PDF directory loader.
//!
//! Scans the configured documents directory for PDFs (walkdir + globs,
//! sorted by relative path for deterministic ordering) and extracts one
//! [`Page`] per physical page with lopdf. Pages whose extracted text is
//! blank are dropped.
//!
//! A file that fails to parse aborts the whole run rather than being
//! skipped, so an index is only ever built from the complete document set.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::models::{Document, Page};

#[derive(Debug)]
pub enum LoadError {
    DirectoryMissing(PathBuf),
    NoDocuments(PathBuf),
    Scan(String),
    Pdf { path: PathBuf, message: String },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::DirectoryMissing(dir) => {
                write!(f, "documents directory does not exist: {}", dir.display())
            }
            LoadError::NoDocuments(dir) => {
                write!(f, "no matching documents found under {}", dir.display())
            }
            LoadError::Scan(e) => write!(f, "failed to scan documents directory: {}", e),
            LoadError::Pdf { path, message } => {
                write!(f, "failed to load {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// List document paths (relative to the documents dir) matching the
/// configured globs, sorted for deterministic ingestion order.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<PathBuf>, LoadError> {
    let root = &config.dir;
    if !root.is_dir() {
        return Err(LoadError::DirectoryMissing(root.clone()));
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut paths = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(|e| LoadError::Scan(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push(relative.to_path_buf());
    }

    if paths.is_empty() {
        return Err(LoadError::NoDocuments(root.clone()));
    }

    paths.sort();
    Ok(paths)
}

/// Load one PDF into pages. `relative` is the path under the documents dir,
/// kept as the chunk source identifier.
pub fn load_document(root: &Path, relative: &Path) -> Result<Document, LoadError> {
    let path = root.join(relative);
    let doc = lopdf::Document::load(&path).map_err(|e| LoadError::Pdf {
        path: path.clone(),
        message: e.to_string(),
    })?;

    if doc.is_encrypted() {
        return Err(LoadError::Pdf {
            path,
            message: "document is encrypted".to_string(),
        });
    }

    let mut pages = Vec::new();
    for (page_num, _page_id) in doc.get_pages() {
        let text = doc.extract_text(&[page_num]).map_err(|e| LoadError::Pdf {
            path: path.clone(),
            message: format!("page {}: {}", page_num, e),
        })?;

        let text = normalize_page_text(&text);
        if text.is_empty() {
            debug!(page = page_num, path = %path.display(), "dropping blank page");
            continue;
        }

        pages.push(Page {
            number: page_num,
            text,
        });
    }

    Ok(Document {
        path: relative.to_path_buf(),
        pages,
    })
}

/// Trim trailing whitespace per line and drop empty lines, preserving order.
fn normalize_page_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| LoadError::Scan(e.to_string()))?);
    }
    builder.build().map_err(|e| LoadError::Scan(e.to_string()))
}
