//! Camera component
//!
//! The view matrix is not stored: it is the inverse of the camera entity's
//! world matrix, so cameras can be parented like anything else.

use crate::ecs::Component;
use crate::foundation::math::{utils, Mat4, Mat4Ext};
use crate::scripting::{FieldAccess, FieldError, FieldValue, Reflect};

/// Perspective camera; looks down its local -Z axis
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Viewport width / height
    pub aspect: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Component for Camera {}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y: utils::deg_to_rad(60.0),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl Camera {
    /// Perspective camera with the field of view given in degrees
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Projection matrix
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective(self.fov_y, self.aspect, self.near, self.far)
    }

    /// View-projection for a camera whose entity has the given world matrix
    pub fn view_projection(&self, camera_world: &Mat4) -> Mat4 {
        let view = camera_world.try_inverse().unwrap_or_else(Mat4::identity);
        self.projection() * view
    }
}

impl Reflect for Camera {
    const TYPE_NAME: &'static str = "camera";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[("fov", FieldAccess::READ_WRITE)];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "fov" => Some(FieldValue::Number(f64::from(self.fov_y.to_degrees()))),
            _ => None,
        }
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), FieldError> {
        match field {
            "fov" => {
                let degrees = value.into_f32(field)?.clamp(1.0, 179.0);
                self.fov_y = utils::deg_to_rad(degrees);
                Ok(())
            }
            _ => Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
    }
}
