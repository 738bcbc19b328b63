//! Where documents come from and go back to.
//!
//! The patch engine never touches the filesystem itself. A [`DocumentStore`]
//! supplies the document and persists the result, so the same pipeline runs
//! against real files or entirely in memory.

use crate::document::Document;
use crate::engine::{PatchError, PatchReport, Patcher};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8: {source}")]
    Utf8 {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("{0} has no document to load")]
    Empty(String),
}

/// Source and sink of one document.
pub trait DocumentStore {
    fn load(&self) -> Result<Document, StoreError>;
    fn save(&mut self, document: &Document) -> Result<(), StoreError>;
    /// Human-readable location for diagnostics.
    fn describe(&self) -> String;
}

/// A document backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileStore {
    fn load(&self) -> Result<Document, StoreError> {
        let bytes = fs::read(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|source| StoreError::Utf8 {
            path: self.path.clone(),
            source,
        })?;
        Ok(Document::from(text))
    }

    fn save(&mut self, document: &Document) -> Result<(), StoreError> {
        atomic_write(&self.path, document.as_str().as_bytes()).map_err(|source| {
            StoreError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        // Keep mtime-based tooling (hot reload, incremental builds) in step.
        filetime::set_file_mtime(&self.path, filetime::FileTime::now()).map_err(|source| {
            StoreError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is left as it was.
/// An existing target keeps its permissions.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// In-memory store, mainly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    content: Option<String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            writes: 0,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Number of times `save` was called.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<Document, StoreError> {
        self.content
            .as_deref()
            .map(Document::new)
            .ok_or_else(|| StoreError::Empty(self.describe()))
    }

    fn save(&mut self, document: &Document) -> Result<(), StoreError> {
        self.content = Some(document.as_str().to_string());
        self.writes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Write,
    DryRun,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Result of a read-transform-write cycle.
#[derive(Debug, Clone)]
#[must_use = "RunSummary reports whether the target was written"]
pub struct RunSummary {
    pub original: Document,
    pub report: PatchReport,
    pub written: bool,
}

/// Load the document, apply every rule, then save.
///
/// Nothing is saved when a rule fails, in dry-run mode, or when the rules
/// left the text unchanged.
pub fn run(
    store: &mut dyn DocumentStore,
    patcher: &Patcher,
    mode: RunMode,
) -> Result<RunSummary, RunError> {
    let original = store.load()?;
    tracing::debug!(store = %store.describe(), bytes = original.len(), "loaded");

    let report = patcher.apply(original.clone())?;

    let written = match mode {
        RunMode::DryRun => false,
        RunMode::Write if report.is_unchanged() => false,
        RunMode::Write => {
            store.save(&report.document)?;
            tracing::info!(store = %store.describe(), fingerprint = %report.after, "written");
            true
        }
    };

    Ok(RunSummary {
        original,
        report,
        written,
    })
}
