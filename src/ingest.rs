//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow from stored files to indexed chunks:
//! extract → clean → chunk → embed → index. One failing document is
//! reported and skipped; it never aborts the rest of the batch. A
//! document whose chunk hashes are unchanged since the last run is
//! skipped without re-embedding.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{chunk_text, clean_text};
use crate::config::{ChunkingConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document};
use crate::store::DocumentStore;

/// Counters reported by a batch ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents_indexed: u64,
    pub chunks_indexed: u64,
    pub skipped_up_to_date: u64,
    pub failures: u64,
}

/// Result of ingesting one document.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunks were (re)indexed; carries the chunk count.
    Indexed(usize),
    /// The indexed chunks already match this document's content.
    UpToDate,
}

/// Chunk and index a single document.
pub async fn ingest_document(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    doc: &Document,
    full: bool,
) -> Result<IngestOutcome> {
    let cleaned = clean_text(&doc.raw_text);
    if cleaned.is_empty() {
        return Err(Error::InvalidInput(format!(
            "document '{}' contains no text",
            doc.name
        )));
    }

    let pieces = chunk_text(&cleaned, chunking.chunk_size, chunking.overlap)?;
    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .enumerate()
        .map(|(i, text)| make_chunk(&doc.id, &doc.name, i as i64, text))
        .collect();

    if chunks.is_empty() {
        return Err(Error::InvalidInput(format!(
            "document '{}' produced no chunks",
            doc.name
        )));
    }

    if !full {
        let existing = index.document_hashes(&doc.id).await?;
        if !existing.is_empty()
            && existing.len() == chunks.len()
            && existing
                .iter()
                .zip(chunks.iter())
                .all(|(old, new)| *old == new.hash)
        {
            return Ok(IngestOutcome::UpToDate);
        }
    }

    index.remove_document(&doc.id).await?;
    let count = index.add(&chunks).await?;
    Ok(IngestOutcome::Indexed(count))
}

/// Ingest every document in the store.
pub async fn ingest_store(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    store: &DocumentStore,
    full: bool,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for file in store.list()? {
        let doc = match extract::extract_text(&file.path) {
            Ok(raw_text) => Document {
                id: file.id.clone(),
                name: file.name.clone(),
                raw_text,
            },
            Err(e) => {
                warn!(document = %file.name, error = %e, "skipping document");
                report.failures += 1;
                continue;
            }
        };
        record_outcome(
            ingest_document(index, chunking, &doc, full).await,
            &doc.name,
            &mut report,
        );
    }

    Ok(report)
}

/// Ingest a single file, or every supported file under a directory.
///
/// Directory walks honor the configured include/exclude globs; document
/// ids are the paths relative to the directory root, so re-running over
/// the same tree updates in place.
pub async fn ingest_path(
    index: &VectorIndex,
    chunking: &ChunkingConfig,
    storage: &StorageConfig,
    path: &Path,
    full: bool,
) -> Result<IngestReport> {
    if path.is_file() {
        let mut report = IngestReport::default();
        let doc = document_from_file(path, &path.to_string_lossy())?;
        record_outcome(
            ingest_document(index, chunking, &doc, full).await,
            &doc.name,
            &mut report,
        );
        return Ok(report);
    }

    if !path.is_dir() {
        return Err(Error::InvalidInput(format!(
            "no such file or directory: {}",
            path.display()
        )));
    }

    let include_set = build_globset(&storage.include_globs)?;
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(storage.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files: Vec<(std::path::PathBuf, String)> = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| Error::Persistence(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_path = entry.path();
        let relative = file_path.strip_prefix(path).unwrap_or(file_path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((file_path.to_path_buf(), rel_str));
    }
    // Deterministic ingest order.
    files.sort_by(|a, b| a.1.cmp(&b.1));

    let mut report = IngestReport::default();
    for (file_path, rel_str) in files {
        let doc = match document_from_file(&file_path, &rel_str) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(document = %rel_str, error = %e, "skipping document");
                report.failures += 1;
                continue;
            }
        };
        record_outcome(
            ingest_document(index, chunking, &doc, full).await,
            &doc.name,
            &mut report,
        );
    }

    Ok(report)
}

fn record_outcome(outcome: Result<IngestOutcome>, name: &str, report: &mut IngestReport) {
    match outcome {
        Ok(IngestOutcome::Indexed(count)) => {
            report.documents_indexed += 1;
            report.chunks_indexed += count as u64;
        }
        Ok(IngestOutcome::UpToDate) => report.skipped_up_to_date += 1,
        Err(e) => {
            warn!(document = %name, error = %e, "skipping document");
            report.failures += 1;
        }
    }
}

fn document_from_file(path: &Path, id: &str) -> Result<Document> {
    let raw_text = extract::extract_text(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| id.to_string());
    Ok(Document {
        id: id.to_string(),
        name,
        raw_text,
    })
}

fn make_chunk(document_id: &str, source_name: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
        source_name: source_name.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| Error::InvalidInput(e.to_string()))?);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidInput(e.to_string()))
}
