//! End-to-end pipeline tests: ingest → index → ask, with deterministic
//! stub providers instead of network calls. Generated text is never
//! compared for equality — only the structured fields and source
//! passages are.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use docqa::config::{ChunkingConfig, RetrievalConfig, StorageConfig};
use docqa::embedding::Embedder;
use docqa::engine::QaEngine;
use docqa::error::Result;
use docqa::generation::Generator;
use docqa::index::VectorIndex;
use docqa::ingest::{ingest_document, ingest_path, IngestOutcome};
use docqa::memory::ConversationMemory;
use docqa::models::{ConversationTurn, Document};

const STUB_DIMS: usize = 32;

/// Deterministic word-bucket embedder: texts sharing words land close
/// together, disjoint texts stay near-orthogonal.
struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        STUB_DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| stub_vector(t)).collect())
    }
}

fn stub_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; STUB_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % STUB_DIMS;
        v[bucket] += 1.0;
    }
    v
}

/// Echoes the final user turn, tagged by whether passages were given.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, turns: &[ConversationTurn], passages: &[String]) -> Result<String> {
        let question = turns.last().map(|t| t.content.as_str()).unwrap_or("");
        if passages.is_empty() {
            Ok(format!("direct answer to: {}", question))
        } else {
            Ok(format!("grounded answer to: {}", question))
        }
    }
}

async fn open_index(dir: &TempDir) -> VectorIndex {
    VectorIndex::open(&dir.path().join("index.sqlite"), Arc::new(StubEmbedder), 64)
        .await
        .unwrap()
}

fn memory_path(dir: &TempDir) -> PathBuf {
    dir.path().join("memory.json")
}

fn engine_over(dir: &TempDir, index: VectorIndex) -> QaEngine {
    QaEngine::new(
        Some(index),
        Box::new(EchoGenerator),
        ConversationMemory::load(&memory_path(dir)),
        RetrievalConfig::default(),
    )
}

fn paris_document() -> Document {
    Document {
        id: "doc-paris".to_string(),
        name: "facts.txt".to_string(),
        raw_text: "Paris is the capital of France.".to_string(),
    }
}

#[tokio::test]
async fn ingest_then_ask_answers_from_knowledge_base() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir).await;

    let outcome = ingest_document(&index, &ChunkingConfig::default(), &paris_document(), false)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Indexed(1));

    let mut engine = engine_over(&dir, index);
    let result = engine
        .answer_question("What is the capital of France?")
        .await;

    assert!(result.from_knowledge_base);
    assert!(result
        .sources
        .iter()
        .any(|s| s.contains("Paris is the capital of France")));
    assert!(!result.answer.trim().is_empty());

    // One answered question = one user turn + one assistant turn, persisted.
    let reloaded = ConversationMemory::load(&memory_path(&dir));
    assert_eq!(reloaded.len(), 2);
}

#[tokio::test]
async fn empty_index_always_falls_back() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir).await;
    let mut engine = engine_over(&dir, index);

    let result = engine.answer_question("What is the capital of France?").await;
    assert!(!result.from_knowledge_base);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn irrelevant_question_falls_back_but_still_remembers() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir).await;
    ingest_document(&index, &ChunkingConfig::default(), &paris_document(), false)
        .await
        .unwrap();

    let mut engine = engine_over(&dir, index);
    let result = engine
        .answer_question("Will it rain tomorrow in Tokyo?")
        .await;

    assert!(!result.from_knowledge_base);
    assert!(result.sources.is_empty());
    assert_eq!(engine.memory().len(), 2);
}

#[tokio::test]
async fn unchanged_document_is_not_reembedded() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir).await;
    let chunking = ChunkingConfig::default();

    let doc = paris_document();
    assert_eq!(
        ingest_document(&index, &chunking, &doc, false).await.unwrap(),
        IngestOutcome::Indexed(1)
    );
    assert_eq!(
        ingest_document(&index, &chunking, &doc, false).await.unwrap(),
        IngestOutcome::UpToDate
    );
    assert_eq!(index.len().await.unwrap(), 1);

    // Changed content replaces the old chunks.
    let changed = Document {
        raw_text: "Paris is the capital of France. Lyon is another large city.".to_string(),
        ..doc.clone()
    };
    assert!(matches!(
        ingest_document(&index, &chunking, &changed, false).await.unwrap(),
        IngestOutcome::Indexed(_)
    ));

    // --full forces a reindex even when nothing changed.
    assert!(matches!(
        ingest_document(&index, &chunking, &changed, true).await.unwrap(),
        IngestOutcome::Indexed(_)
    ));
}

#[tokio::test]
async fn directory_ingest_isolates_bad_documents() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("alpha.md"),
        "The alpha document covers Rust programming. It mentions cargo and crates in detail.",
    )
    .unwrap();
    std::fs::write(
        docs.join("gamma.txt"),
        "Gamma notes describe deployment infrastructure. Kubernetes and Docker are mentioned.",
    )
    .unwrap();
    // A PDF that is not a PDF: extraction fails, the rest must still index.
    std::fs::write(docs.join("broken.pdf"), "definitely not a pdf").unwrap();
    // Not covered by the include globs at all.
    std::fs::write(docs.join("photo.png"), [0u8; 16]).unwrap();

    let index = open_index(&dir).await;
    let report = ingest_path(
        &index,
        &ChunkingConfig::default(),
        &StorageConfig::default(),
        &docs,
        false,
    )
    .await
    .unwrap();

    assert_eq!(report.documents_indexed, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(index.len().await.unwrap(), 2);

    let results = index
        .search("Which document talks about Rust and cargo?", 2)
        .await
        .unwrap();
    assert!(results[0].text.contains("Rust programming"));
    assert_eq!(results[0].metadata.source, "alpha.md");
}

#[tokio::test]
async fn clear_memory_drops_prior_turns_everywhere() {
    let dir = TempDir::new().unwrap();
    let index = open_index(&dir).await;
    let mut engine = engine_over(&dir, index);

    engine.answer_question("first question").await;
    engine.answer_question("second question").await;
    assert_eq!(engine.memory().len(), 4);

    engine.clear_memory().unwrap();
    assert!(engine.memory().recent(100).is_empty());

    // The cleared log is what a restarted process sees.
    let reloaded = ConversationMemory::load(&memory_path(&dir));
    assert!(reloaded.is_empty());

    engine.answer_question("a fresh start").await;
    assert_eq!(engine.memory().len(), 2);
}

#[tokio::test]
async fn memory_accumulates_across_engine_restarts() {
    let dir = TempDir::new().unwrap();

    for round in 0..3 {
        let index = open_index(&dir).await;
        let mut engine = engine_over(&dir, index);
        engine
            .answer_question(&format!("question in round {}", round))
            .await;
    }

    let reloaded = ConversationMemory::load(&memory_path(&dir));
    assert_eq!(reloaded.len(), 6);
}
