//! Engine-wide error type

use crate::assets::LoadError;
use crate::config::ConfigError;
use crate::ecs::EcsError;
use crate::render::RenderError;
use crate::scripting::{FieldError, ScriptError};
use thiserror::Error;

/// Any error the engine's setup API can return
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entity store error
    #[error("entity store error: {0}")]
    Ecs(#[from] EcsError),

    /// Script bridge error
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// Field whitelist error
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// Rendering error
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Asset loading error
    #[error("asset error: {0}")]
    Load(#[from] LoadError),
}

/// Result alias for engine setup
pub type EngineResult<T> = Result<T, EngineError>;
