//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, search results, and
//! conversation turns that flow through the ingestion and answering
//! pipeline.

use serde::{Deserialize, Serialize};

/// A document handed to the ingestion pipeline: extracted, cleaned text
/// plus the identity it was stored under. Immutable once chunked.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub raw_text: String,
}

/// A chunk of a document's cleaned text, the unit of retrieval.
///
/// `hash` is a SHA-256 of `text`, used to detect unchanged documents on
/// re-ingestion. `source_name` travels into search-result metadata.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub source_name: String,
}

/// Metadata carried by every indexed chunk and returned with each hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Display name of the originating document.
    pub source: String,
    /// Stable id of the originating document.
    pub file_id: String,
}

/// A hit returned from the vector index.
///
/// `score` is cosine similarity: higher means more relevant, in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub text: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The structured answer produced for every question.
///
/// `sources` holds the retrieved chunk texts in score order; it is empty
/// whenever the answer did not come from the knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<String>,
    #[serde(rename = "from_kb")]
    pub from_knowledge_base: bool,
}
