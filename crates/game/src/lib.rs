//! Voxel sandbox demo
//!
//! Builds a small block scene on the engine, drives it with Lua scripts and
//! submits every frame to the recording backend.

#![warn(missing_docs)]

pub mod blocks;
pub mod config;
pub mod scene;

use config::GameConfig;
use engine::assets::DirectorySource;
use engine::render::RecordingBackend;
use engine::{EngineContext, EngineResult};

/// Context with a headless backend and a loader over the game's assets
pub fn create_context(config: &GameConfig) -> EngineResult<EngineContext> {
    let backend = RecordingBackend::new().with_latency(1).keep_last(8);
    let mut context = EngineContext::new(config.engine.clone(), Box::new(backend))?;
    context.attach_loader(DirectorySource::new(config.asset_root()))?;
    Ok(context)
}
