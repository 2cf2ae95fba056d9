//! Durable batch cursor: the offset into the universe where the next cycle starts.
//!
//! The on-disk form is a single plain-text integer, rewritten wholesale each
//! cycle (write to `.tmp`, rename into place).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to persist cursor to {path}: {source}")]
pub struct CursorError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Persistence for the batch cursor.
pub trait CursorStore: Send + Sync {
    /// Last persisted cursor; 0 when absent or unparsable. Never fails.
    fn read(&self) -> usize;

    /// Persist the cursor so that a later `read` (in any process) returns it.
    fn write(&self, cursor: usize) -> Result<(), CursorError>;
}

/// Cursor stored as a text file.
#[derive(Debug, Clone)]
pub struct FileCursor {
    path: PathBuf,
}

impl FileCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cursor: usize) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, cursor.to_string())?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            e
        })
    }
}

impl CursorStore for FileCursor {
    fn read(&self) -> usize {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    fn write(&self, cursor: usize) -> Result<(), CursorError> {
        self.persist(cursor).map_err(|source| CursorError {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-process cursor for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    value: AtomicUsize,
}

impl MemoryCursor {
    pub fn new(initial: usize) -> Self {
        Self {
            value: AtomicUsize::new(initial),
        }
    }
}

impl CursorStore for MemoryCursor {
    fn read(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }

    fn write(&self, cursor: usize) -> Result<(), CursorError> {
        self.value.store(cursor, Ordering::SeqCst);
        Ok(())
    }
}
