//! Sandboxed storage for fetched bytes
//!
//! All writes for a job land beneath one root directory. Paths are
//! validated lexically before any I/O: absolute paths and parent-directory
//! components are refused outright, and the joined path must remain under
//! the root. The aggregate size ceiling is enforced on every write.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::fs;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path '{0}' escapes the storage sandbox")]
    Traversal(String),
    #[error("write of {attempted} bytes would exceed the total size ceiling of {limit} bytes")]
    CapacityExceeded { attempted: u64, limit: u64 },
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only snapshot of storage usage.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct StorageStats {
    pub files_written: u64,
    pub total_bytes: u64,
    pub directories: u64,
}

/// Per-job sandboxed directory tree with an aggregate size ceiling.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    max_total_size: u64,
    total_bytes: AtomicU64,
    files_written: AtomicU64,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, max_total_size: u64) -> Self {
        Self {
            root: root.into(),
            max_total_size,
            total_bytes: AtomicU64::new(0),
            files_written: AtomicU64::new(0),
        }
    }

    /// Create the sandbox root.
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sandbox-relative path, rejecting anything that would land
    /// outside the root.
    fn resolve(&self, rel_path: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(rel_path);
        let mut resolved = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::Traversal(rel_path.to_string()));
                }
            }
        }
        if !resolved.starts_with(&self.root) {
            return Err(StorageError::Traversal(rel_path.to_string()));
        }
        Ok(resolved)
    }

    /// Write bytes under the sandbox, creating missing parent directories.
    /// Writing the same path twice replaces the previous content (the path
    /// registry guarantees one path per canonical URL, so the last writer
    /// winning is well-defined).
    pub async fn write(&self, rel_path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(rel_path)?;

        // Re-writing a path replaces its bytes, not adds to the total
        let previous = match fs::metadata(&full).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let new_len = bytes.len() as u64;
        let current = self.total_bytes.load(Ordering::SeqCst);
        let projected = current - previous.min(current) + new_len;
        if projected > self.max_total_size {
            return Err(StorageError::CapacityExceeded {
                attempted: new_len,
                limit: self.max_total_size,
            });
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, bytes).await?;

        self.total_bytes.store(projected, Ordering::SeqCst);
        if previous == 0 {
            self.files_written.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Read bytes back from the sandbox.
    pub async fn read(&self, rel_path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(rel_path)?;
        Ok(fs::read(&full).await?)
    }

    /// All stored files as sandbox-relative forward-slash paths.
    pub fn list_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        files.sort();
        files
    }

    /// Usage snapshot. Directory count is taken from the tree on disk.
    pub fn stats(&self) -> StorageStats {
        let directories = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .count() as u64;
        StorageStats {
            files_written: self.files_written.load(Ordering::SeqCst),
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            directories,
        }
    }

    /// Remove the entire sandbox.
    pub async fn cleanup(&self) -> Result<(), StorageError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).await?;
        }
        Ok(())
    }
}
