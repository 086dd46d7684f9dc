//! Conversational memory: an ordered, persisted log of question/answer turns.
//!
//! The log is serialized as a versioned JSON document so reload never
//! depends on internal object layout:
//!
//! ```json
//! { "version": 1, "turns": [{ "role": "user", "content": "..." }] }
//! ```
//!
//! Reload is fail-soft: a missing, unreadable, or corrupt file starts an
//! empty memory with a warning, never an error. Saves are synchronous and
//! write the whole log.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::ConversationTurn;

const MEMORY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MemoryFile {
    version: u32,
    turns: Vec<ConversationTurn>,
}

#[derive(Debug)]
pub struct ConversationMemory {
    path: PathBuf,
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    /// Load the memory log at `path`, or start empty when it is missing
    /// or cannot be understood.
    pub fn load(path: &Path) -> Self {
        let turns = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<MemoryFile>(&content) {
                Ok(file) if file.version == MEMORY_FORMAT_VERSION => file.turns,
                Ok(file) => {
                    warn!(
                        path = %path.display(),
                        version = file.version,
                        "unsupported memory log version, starting empty"
                    );
                    Vec::new()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt memory log, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read memory log, starting empty");
                Vec::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            turns,
        }
    }

    /// Append one answered question: a user turn then an assistant turn,
    /// then persist the whole log.
    pub fn append(&mut self, question: &str, answer: &str) -> Result<()> {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant(answer));
        self.save()
    }

    /// The most recent `max_turns` turns whose content is non-empty after
    /// trimming. Stored turns are not modified; filtering happens on read.
    pub fn recent(&self, max_turns: usize) -> Vec<ConversationTurn> {
        let valid: Vec<&ConversationTurn> = self
            .turns
            .iter()
            .filter(|t| !t.content.trim().is_empty())
            .collect();
        let skip = valid.len().saturating_sub(max_turns);
        valid.into_iter().skip(skip).cloned().collect()
    }

    /// Total stored turns, including any with empty content.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Replace the log with an empty one and persist immediately.
    pub fn clear(&mut self) -> Result<()> {
        self.turns.clear();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Persistence(format!("create memory dir: {}", e)))?;
        }
        let file = MemoryFile {
            version: MEMORY_FORMAT_VERSION,
            turns: self.turns.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Persistence(format!("write memory log: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn memory_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("memory.json")
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let memory = ConversationMemory::load(&memory_path(&dir));
        assert!(memory.is_empty());
        assert!(memory.recent(10).is_empty());
    }

    #[test]
    fn append_persists_user_then_assistant() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = memory_path(&dir);

        let mut memory = ConversationMemory::load(&path);
        memory.append("What is Rust?", "A systems language.").unwrap();
        memory.append("Who makes it?", "The Rust project.").unwrap();
        assert_eq!(memory.len(), 4);

        let reloaded = ConversationMemory::load(&path);
        assert_eq!(reloaded.len(), 4);
        let turns = reloaded.recent(10);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "What is Rust?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[3].content, "The Rust project.");
    }

    #[test]
    fn recent_bounds_and_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut memory = ConversationMemory::load(&memory_path(&dir));
        for i in 0..5 {
            memory
                .append(&format!("question {}", i), &format!("answer {}", i))
                .unwrap();
        }
        memory.append("   ", "a real answer").unwrap();

        let recent = memory.recent(3);
        assert_eq!(recent.len(), 3);
        // The whitespace-only user turn is filtered from the view...
        assert_eq!(recent[0].content, "question 4");
        assert_eq!(recent[1].content, "answer 4");
        assert_eq!(recent[2].content, "a real answer");
        // ...but still stored.
        assert_eq!(memory.len(), 12);
    }

    #[test]
    fn clear_empties_and_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = memory_path(&dir);

        let mut memory = ConversationMemory::load(&path);
        memory.append("a question", "an answer").unwrap();
        memory.clear().unwrap();
        assert!(memory.recent(10).is_empty());

        let reloaded = ConversationMemory::load(&path);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = memory_path(&dir);
        std::fs::write(&path, "not json {{{").unwrap();

        let memory = ConversationMemory::load(&path);
        assert!(memory.is_empty());
    }

    #[test]
    fn unknown_version_starts_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = memory_path(&dir);
        std::fs::write(
            &path,
            r#"{ "version": 99, "turns": [{ "role": "user", "content": "old" }] }"#,
        )
        .unwrap();

        let memory = ConversationMemory::load(&path);
        assert!(memory.is_empty());
    }
}
