//! Where asset bytes come from

use super::LoadError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Read-only byte store the loader worker pulls from
///
/// Implementations are moved onto the worker thread.
pub trait AssetSource: Send + 'static {
    /// Bytes stored under `path`
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Assets held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: add a file
    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), contents.into());
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.files.len())
    }
}

/// Assets under a root directory
///
/// Paths are relative to the root; absolute paths and `..` are rejected.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, LoadError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.is_empty() {
            return Err(LoadError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_string()),
            _ => LoadError::Io {
                path: path.to_string(),
                reason: e.to_string(),
            },
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}
