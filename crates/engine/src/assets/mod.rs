//! Asset loading
//!
//! Meshes and materials are RON files deserialized straight into
//! [`MeshData`](crate::render::MeshData) and
//! [`MaterialData`](crate::render::MaterialData). Scripts are plain Lua text.

pub mod loader;
pub mod source;

pub use loader::{DrainReport, ResourceLoader, ScriptSource, ScriptSourceId};
pub use source::{AssetSource, DirectorySource, MemorySource};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No asset at the path
    #[error("asset '{0}' not found")]
    NotFound(String),

    /// Path is absolute or leaves the asset root
    #[error("asset path '{0}' is not allowed")]
    InvalidPath(String),

    /// Reading failed
    #[error("failed to read '{path}': {reason}")]
    Io {
        /// Asset path
        path: String,
        /// OS error
        reason: String,
    },

    /// Contents could not be decoded
    #[error("failed to parse '{path}': {reason}")]
    Parse {
        /// Asset path
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Decoded but unusable
    #[error("invalid asset '{path}': {reason}")]
    Invalid {
        /// Asset path
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// The loader thread is not running
    #[error("resource loader worker is not running")]
    WorkerUnavailable,
}
