//! Engine-provided components

pub mod transform;
pub mod renderable;
pub mod camera;
pub mod script;
pub mod gameplay;

pub use transform::Transform;
pub use renderable::Renderable;
pub use camera::Camera;
pub use script::{FieldBindings, ScriptBehavior, ScriptHandle};
pub use gameplay::{Health, Name};
