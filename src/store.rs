//! Filesystem-backed document store.
//!
//! Uploaded documents are kept under a root directory, one subdirectory
//! per document id, holding the original file under its original name.
//! The store only promises persist-and-reload; it is the local stand-in
//! for whatever object storage a deployment puts behind it.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A document as listed by the store.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist `bytes` under `name` and return the new document id.
    pub fn store(&self, bytes: &[u8], name: &str) -> Result<String> {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("invalid document name: {:?}", name)))?;

        let id = Uuid::new_v4().to_string();
        let dir = self.root.join(&id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Persistence(format!("create document dir: {}", e)))?;
        std::fs::write(dir.join(&file_name), bytes)
            .map_err(|e| Error::Persistence(format!("write document: {}", e)))?;

        Ok(id)
    }

    /// All stored documents, ordered by id. A missing root is an empty
    /// store, not an error.
    pub fn list(&self) -> Result<Vec<StoredFile>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Persistence(format!("list documents: {}", e))),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Persistence(e.to_string()))?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            if let Some(file) = self.first_file(&entry.path(), &id)? {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    /// Look up a single document by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredFile>> {
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Ok(None);
        }
        self.first_file(&dir, id)
    }

    fn first_file(&self, dir: &Path, id: &str) -> Result<Option<StoredFile>> {
        let mut names: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| Error::Persistence(e.to_string()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        names.sort();

        Ok(names.into_iter().next().map(|path| StoredFile {
            id: id.to_string(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path,
        }))
    }
}
