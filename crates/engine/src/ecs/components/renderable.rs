//! Renderable component for entities that can be rendered
//!
//! Pairs a mesh with a material. Together with a [`Transform`] this is what
//! the render pipeline turns into a draw command each frame.
//!
//! [`Transform`]: super::Transform

use crate::ecs::Component;
use crate::render::{MaterialId, MeshId};
use crate::scripting::{FieldAccess, FieldError, FieldValue, Reflect};

/// Component for entities that can be rendered
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    /// Mesh to draw
    pub mesh: MeshId,

    /// Material to use for rendering
    pub material: MaterialId,

    /// Whether this object is visible
    pub visible: bool,
}

impl Renderable {
    /// Create a new, visible renderable
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            mesh,
            material,
            visible: true,
        }
    }

    /// Create a hidden renderable (useful for pre-loading)
    pub fn hidden(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            visible: false,
            ..Self::new(mesh, material)
        }
    }
}

impl Component for Renderable {}

impl Reflect for Renderable {
    const TYPE_NAME: &'static str = "renderable";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[("visible", FieldAccess::READ_WRITE)];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "visible" => Some(FieldValue::Bool(self.visible)),
            _ => None,
        }
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), FieldError> {
        match field {
            "visible" => {
                self.visible = value.into_bool(field)?;
                Ok(())
            }
            _ => Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
    }
}
