//! # Rendering
//!
//! Turns the entity store into ordered draw lists for a [`GpuBackend`].
//!
//! ## Architecture
//!
//! - **Resources**: [`ResourceRegistry`] owns mesh and material data behind
//!   typed ids; entries can be pending while an asset loads
//! - **Queue**: [`RenderQueue`] sorts the frame's [`RenderItem`]s to minimise
//!   state changes
//! - **Pipeline**: [`RenderPipeline`] culls, sorts and submits through a
//!   small ring of fence-guarded draw lists
//! - **Backend**: [`GpuBackend`] consumes the lists; [`RecordingBackend`] is
//!   the headless implementation used for tests and the demo
//!
//! Render failures never reach the frame loop. They are logged and counted
//! in [`RenderStats`].

pub mod backend;
pub mod pipeline;
pub mod queue;
pub mod resources;

pub use backend::{
    BackendError, BackendResult, ClipRect, DrawCommand, Fence, GpuBackend, InstanceData, RecordingBackend,
    RenderTarget, Submission,
};
pub use pipeline::{RenderPipeline, RenderStats, ResourceRef};
pub use queue::{RenderItem, RenderPass, RenderQueue};
pub use resources::{BlendMode, Lookup, MaterialData, MaterialId, MeshData, MeshId, ResourceRegistry, Vertex};

use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A renderable references a resource that was removed or failed to load
    #[error("{kind} {resource} is missing")]
    ResourceMissing {
        /// "mesh" or "material"
        kind: &'static str,
        /// Name or id of the resource
        resource: String,
    },

    /// Backend failure
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
