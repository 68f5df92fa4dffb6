//! GPU command backend abstraction
//!
//! The render pipeline hands a backend one ordered list of [`DrawCommand`]s
//! per frame and gets a [`Fence`] back. The pipeline keeps two (or more) draw
//! lists and never refills a list whose last submission has not retired.

use super::resources::{MaterialId, MeshId};
use crate::ecs::Entity;
use crate::foundation::math::Mat4;
use bytemuck::{Pod, Zeroable};
use std::any::Any;
use std::collections::HashMap;
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Where a command draws to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTarget {
    /// The presented surface
    #[default]
    Main,
    /// An offscreen target by index
    Offscreen(u32),
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// One draw in a submitted list
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    /// Source entity
    pub entity: Entity,
    /// Mesh to draw
    pub mesh: MeshId,
    /// Material to bind
    pub material: MaterialId,
    /// World matrix
    pub transform: Mat4,
    /// Target
    pub target: RenderTarget,
    /// Optional scissor
    pub clip: Option<ClipRect>,
}

/// Per-instance upload layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Column-major model matrix
    pub model: [[f32; 4]; 4],
    /// Material base color
    pub color: [f32; 4],
}

impl InstanceData {
    /// Pack a command's transform with its material color
    pub fn new(transform: &Mat4, color: [f32; 4]) -> Self {
        Self {
            model: (*transform).into(),
            color,
        }
    }
}

/// Submission handle; retires once the GPU is done with the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fence(pub u64);

/// Backend failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The device went away
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// The backend refused the command list
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Waiting on a fence failed
    #[error("fence {0:?} wait failed")]
    FenceWait(Fence),
}

/// Sink for ordered draw lists
pub trait GpuBackend {
    /// Queue a draw list recorded into buffer `slot`
    fn submit(&mut self, slot: usize, commands: &[DrawCommand]) -> BackendResult<Fence>;

    /// True once the GPU has finished with a submission
    fn is_retired(&self, fence: Fence) -> bool;

    /// Block until a submission retires
    fn wait(&mut self, fence: Fence) -> BackendResult<()>;

    /// Name for logs
    fn name(&self) -> &str {
        "gpu"
    }

    /// Downcast to the concrete backend type
    fn as_any(&self) -> &dyn Any;
}

/// One recorded submission
#[derive(Debug, Clone)]
pub struct Submission {
    /// Draw list slot
    pub slot: usize,
    /// Fence returned
    pub fence: Fence,
    /// Commands in draw order
    pub commands: Vec<DrawCommand>,
    /// Size of the instance upload in bytes
    pub instance_bytes: usize,
}

/// Headless backend that records every submission
///
/// A fence retires `latency` submissions after it was issued, or when it is
/// waited on. Submitting into a slot whose previous fence is still in flight
/// is counted as an overlap.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    latency: u64,
    issued: u64,
    retired_through: u64,
    in_flight: HashMap<usize, Fence>,
    submissions: Vec<Submission>,
    overlaps: usize,
    waits: usize,
    fail_next: Option<BackendError>,
    keep: Option<usize>,
}

impl RecordingBackend {
    /// Backend whose fences retire immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: fences retire after `latency` further submissions
    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    /// Builder pattern: remember only the last `count` submissions
    pub fn keep_last(mut self, count: usize) -> Self {
        self.keep = Some(count.max(1));
        self
    }

    /// Make the next submit fail with `error`
    pub fn fail_next(&mut self, error: BackendError) {
        self.fail_next = Some(error);
    }

    /// Recorded submissions, oldest first
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Most recent submission
    pub fn last_submission(&self) -> Option<&Submission> {
        self.submissions.last()
    }

    /// Submissions into a slot that was still in flight
    pub fn overlaps(&self) -> usize {
        self.overlaps
    }

    /// Fence waits the caller had to perform
    pub fn waits(&self) -> usize {
        self.waits
    }
}

impl GpuBackend for RecordingBackend {
    fn submit(&mut self, slot: usize, commands: &[DrawCommand]) -> BackendResult<Fence> {
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }
        if let Some(&previous) = self.in_flight.get(&slot) {
            if !self.is_retired(previous) {
                log::error!("Slot {slot} resubmitted while {previous:?} is in flight");
                self.overlaps += 1;
            }
        }

        self.issued += 1;
        let fence = Fence(self.issued);
        self.retired_through = self.retired_through.max(self.issued.saturating_sub(self.latency));
        self.in_flight.insert(slot, fence);

        let instances: Vec<InstanceData> = commands
            .iter()
            .map(|command| InstanceData::new(&command.transform, [1.0; 4]))
            .collect();
        self.submissions.push(Submission {
            slot,
            fence,
            commands: commands.to_vec(),
            instance_bytes: bytemuck::cast_slice::<InstanceData, u8>(&instances).len(),
        });
        if let Some(keep) = self.keep {
            let excess = self.submissions.len().saturating_sub(keep);
            self.submissions.drain(..excess);
        }
        Ok(fence)
    }

    fn is_retired(&self, fence: Fence) -> bool {
        fence.0 <= self.retired_through
    }

    fn wait(&mut self, fence: Fence) -> BackendResult<()> {
        if fence.0 > self.issued {
            return Err(BackendError::FenceWait(fence));
        }
        self.waits += 1;
        self.retired_through = self.retired_through.max(fence.0);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
