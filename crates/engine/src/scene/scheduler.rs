//! Frame phases and reports
//!
//! A frame always runs the phases of [`FramePhase::ORDER`] in that order and
//! never skips one. The driver lives in [`EngineContext::step`]; this module
//! holds the vocabulary it reports in.
//!
//! [`EngineContext::step`]: crate::context::EngineContext::step

use crate::assets::DrainReport;
use crate::ecs::World;
use crate::render::RenderStats;
use crate::scripting::ScriptError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::FrameInput;

/// One stage of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FramePhase {
    /// Latch input, install finished resource loads
    BeginFrame,
    /// Per-frame script callbacks, then deferred structural changes
    ScriptPass,
    /// Registered simulation hooks
    Simulate,
    /// World matrix propagation
    TransformResolve,
    /// Read-only render submission
    RenderSubmit,
    /// Clear per-frame flags, dispatch events, advance the clock
    EndFrame,
}

impl FramePhase {
    /// Execution order
    pub const ORDER: [FramePhase; 6] = [
        FramePhase::BeginFrame,
        FramePhase::ScriptPass,
        FramePhase::Simulate,
        FramePhase::TransformResolve,
        FramePhase::RenderSubmit,
        FramePhase::EndFrame,
    ];
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything observable about one frame
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Frame number, starting at 0
    pub frame: u64,
    /// Delta the frame ran with
    pub delta: f32,
    /// Phases in the order they ran
    pub phases: Vec<FramePhase>,
    /// Resource loads installed at BeginFrame
    pub resources: DrainReport,
    /// Script callbacks that completed
    pub scripts_invoked: usize,
    /// Script load and runtime faults
    pub script_faults: Vec<ScriptError>,
    /// Deferred structural changes applied
    pub structural_changes: usize,
    /// World matrices recomputed
    pub transforms_recomputed: usize,
    /// Render statistics
    pub render: RenderStats,
    /// Events delivered at EndFrame
    pub events_dispatched: usize,
    /// Wall time spent in `step`, in milliseconds
    pub elapsed_ms: f32,
}

impl FrameReport {
    pub(crate) fn enter(&mut self, phase: FramePhase) {
        log::trace!("Frame {} entering {phase}", self.frame);
        self.phases.push(phase);
    }
}

/// Game-provided simulation step run between scripts and transform resolve
pub trait SimulationHook {
    /// Name for logs
    fn name(&self) -> &str;

    /// Advance the simulation by one frame
    fn simulate(&mut self, world: &mut World, frame: &FrameInput);
}

impl<F> SimulationHook for (&'static str, F)
where
    F: FnMut(&mut World, &FrameInput),
{
    fn name(&self) -> &str {
        self.0
    }

    fn simulate(&mut self, world: &mut World, frame: &FrameInput) {
        (self.1)(world, frame);
    }
}

/// Shared flag that ends [`Engine::run`](crate::engine::Engine::run)
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    raised: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Lowered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown after the current frame
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            log::info!("Shutdown requested");
        }
    }

    /// Whether shutdown was requested
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_is_shared() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_raised());
        clone.raise();
        assert!(signal.is_raised());
    }

    #[test]
    fn test_closure_hook() {
        let mut world = World::new();
        let mut hook = ("spawner", |world: &mut World, _: &FrameInput| {
            world.create();
        });
        hook.simulate(&mut world, &FrameInput::new(0.1));
        assert_eq!(hook.name(), "spawner");
        assert_eq!(world.entity_count(), 1);
    }
}
