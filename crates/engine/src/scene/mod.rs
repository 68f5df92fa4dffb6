//! Scene update scheduling
//!
//! ```text
//! BeginFrame → ScriptPass → Simulate → TransformResolve → RenderSubmit → EndFrame
//! ```
//!
//! Only the script pass and simulation hooks mutate the scene; structural
//! changes requested by scripts are applied once, at the end of the script
//! pass, and render submission sees the store read-only.

mod frame;
mod scheduler;
mod transforms;

pub use frame::{FixedFrameSource, FrameInput, FrameSource, SystemFrameSource};
pub use scheduler::{FramePhase, FrameReport, ShutdownSignal, SimulationHook};
pub use transforms::{clear_frame_flags, resolve_transforms};
