//! # Scene Engine
//!
//! A scriptable scene engine: an entity/component store with a transform
//! hierarchy, a sandboxed Lua bridge with per-call execution budgets, a fixed
//! frame scheduler and a render submission pipeline that culls, sorts and
//! double-buffers draw lists for a pluggable GPU backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let mut context = EngineContext::new(EngineConfig::default(), Box::new(RecordingBackend::new()))?;
//!     let entity = context.world.create();
//!     context.world.add_component(entity, Transform::identity())?;
//!     context.attach_script(entity, "idle", "function on_update(self, dt) end")?;
//!
//!     let mut engine = Engine::new(context);
//!     let shutdown = engine.shutdown_signal();
//!     engine.run(&mut FixedFrameSource::new(1.0 / 60.0), |_, report| {
//!         if report.frame == 59 {
//!             shutdown.raise();
//!         }
//!     });
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod config;
pub mod context;
pub mod ecs;
pub mod engine;
pub mod error;
pub mod events;
pub mod foundation;
pub mod input;
pub mod render;
pub mod scene;
pub mod scripting;

pub use context::EngineContext;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetSource, DirectorySource, MemorySource},
        config::{Config, EngineConfig},
        ecs::components::{Camera, Health, Name, Renderable, ScriptBehavior, Transform},
        ecs::{Entity, EntityTemplate, World},
        events::{Event, EventSystem},
        foundation::math::{Mat4, Quat, Vec3},
        input::InputSnapshot,
        render::{GpuBackend, MaterialData, MeshData, RecordingBackend, ResourceRegistry},
        scene::{FixedFrameSource, FrameInput, FrameReport, FrameSource, ShutdownSignal, SystemFrameSource},
        scripting::{FieldValue, Prefab, ScriptBridge},
        Engine, EngineContext, EngineError,
    };
}
