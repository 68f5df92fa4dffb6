//! Script bridge errors

use crate::ecs::components::ScriptHandle;
use crate::ecs::{EcsError, Entity};
use super::fields::FieldError;
use thiserror::Error;

/// Errors raised at the script boundary
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    /// Compiling or running the chunk failed, or its bindings are invalid
    #[error("failed to load script '{script}': {reason}")]
    Load {
        /// Script name
        script: String,
        /// What went wrong
        reason: String,
    },

    /// A callback raised an error
    #[error("script '{script}' ({handle:?}) on {entity} failed: {message}")]
    Runtime {
        /// Faulting instance
        handle: ScriptHandle,
        /// Entity it was attached to
        entity: Entity,
        /// Script name
        script: String,
        /// Lua error text
        message: String,
    },

    /// A callback exceeded its execution budget
    #[error("script '{script}' ({handle:?}) on {entity} timed out: {reason}")]
    Timeout {
        /// Faulting instance
        handle: ScriptHandle,
        /// Entity it was attached to
        entity: Entity,
        /// Script name
        script: String,
        /// Which limit was hit
        reason: String,
    },

    /// The handle does not name a live instance
    #[error("no script instance for {0:?}")]
    UnknownHandle(ScriptHandle),

    /// Entity store error while attaching or detaching
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// Invalid field whitelist configuration
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The Lua state itself failed
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl ScriptError {
    /// Handle of the instance that faulted, for runtime and timeout errors
    pub fn handle(&self) -> Option<ScriptHandle> {
        match self {
            Self::Runtime { handle, .. } | Self::Timeout { handle, .. } => Some(*handle),
            Self::UnknownHandle(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Entity of the instance that faulted, for runtime and timeout errors
    pub fn entity(&self) -> Option<Entity> {
        match self {
            Self::Runtime { entity, .. } | Self::Timeout { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    /// True for budget exhaustion
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
