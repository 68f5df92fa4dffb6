//! Transform component for the ECS system
//!
//! Local position/rotation/scale plus a cached world matrix. The world matrix
//! is derived data: setters mark the transform dirty and the transform pass
//! recomputes `parent.world * local` for it and everything below it.

use crate::ecs::Component;
use crate::foundation::math::{compose_trs, Mat4, Mat4Ext, Quat, Vec3};
use crate::scripting::{FieldAccess, FieldError, FieldValue, Reflect};

/// ECS Transform component
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    world: Mat4,
    dirty: bool,
    changed: bool,
}

impl Component for Transform {}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            world: Mat4::identity(),
            dirty: true,
            changed: false,
        }
    }
}

impl Transform {
    /// Create identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create from position only
    pub fn from_position(position: Vec3) -> Self {
        Self::default().with_position(position)
    }

    /// Builder pattern: Set position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.set_position(position);
        self
    }

    /// Builder pattern: Set rotation from quaternion
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_rotation(rotation);
        self
    }

    /// Builder pattern: Set scale (uniform)
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.set_scale(Vec3::new(scale, scale, scale));
        self
    }

    /// Builder pattern: Set scale (non-uniform)
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self
    }

    /// Local position relative to the parent
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Local rotation relative to the parent
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Set local position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    /// Set local rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty = true;
    }

    /// Set local scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    /// Move by a local-space offset
    pub fn translate(&mut self, delta: Vec3) {
        self.set_position(self.position + delta);
    }

    /// Local TRS matrix
    pub fn local_matrix(&self) -> Mat4 {
        compose_trs(&self.position, &self.rotation, &self.scale)
    }

    /// World matrix as of the last transform pass
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// World-space position as of the last transform pass
    pub fn world_position(&self) -> Vec3 {
        self.world.translation_part()
    }

    /// Local state changed since the world matrix was last computed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// World matrix was recomputed during the current frame
    pub fn changed_this_frame(&self) -> bool {
        self.changed
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn resolve(&mut self, parent_world: &Mat4) {
        self.world = parent_world * self.local_matrix();
        self.dirty = false;
        self.changed = true;
    }

    pub(crate) fn clear_frame_flags(&mut self) {
        self.changed = false;
    }
}

impl Reflect for Transform {
    const TYPE_NAME: &'static str = "transform";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[
        ("position", FieldAccess::READ_WRITE),
        ("rotation", FieldAccess::READ_WRITE),
        ("scale", FieldAccess::READ_WRITE),
        ("world_position", FieldAccess::READ),
    ];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "position" => Some(FieldValue::Vec3(self.position)),
            "rotation" => {
                let (roll, pitch, yaw) = self.rotation.euler_angles();
                Some(FieldValue::Vec3(Vec3::new(roll, pitch, yaw)))
            }
            "scale" => Some(FieldValue::Vec3(self.scale)),
            "world_position" => Some(FieldValue::Vec3(self.world_position())),
            _ => None,
        }
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), FieldError> {
        match field {
            "position" => self.set_position(value.into_vec3(field)?),
            "rotation" => {
                let euler = value.into_vec3(field)?;
                self.set_rotation(Quat::from_euler_angles(euler.x, euler.y, euler.z));
            }
            "scale" => self.set_scale(value.into_vec3(field)?),
            "world_position" => return Err(FieldError::ReadOnly(format!("transform.{field}"))),
            _ => return Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_transform_starts_dirty() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(transform.is_dirty());
        assert_eq!(*transform.world_matrix(), Mat4::identity());
    }

    #[test]
    fn test_resolve_clears_dirty_and_sets_changed() {
        let mut transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        transform.resolve(&Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0)));

        assert!(!transform.is_dirty());
        assert!(transform.changed_this_frame());
        assert_relative_eq!(transform.world_position(), Vec3::new(1.0, 2.0, 0.0));

        transform.clear_frame_flags();
        assert!(!transform.changed_this_frame());
    }

    #[test]
    fn test_reflect_position_round_trip_marks_dirty() {
        let mut transform = Transform::identity();
        transform.resolve(&Mat4::identity());

        transform
            .set_field("position", FieldValue::Vec3(Vec3::new(4.0, 5.0, 6.0)))
            .unwrap();
        assert!(transform.is_dirty());
        assert_eq!(transform.get_field("position"), Some(FieldValue::Vec3(Vec3::new(4.0, 5.0, 6.0))));
    }

    #[test]
    fn test_reflect_rejects_world_position_write_and_bad_types() {
        let mut transform = Transform::identity();
        assert!(matches!(
            transform.set_field("world_position", FieldValue::Vec3(Vec3::zeros())),
            Err(FieldError::ReadOnly(_))
        ));
        assert!(matches!(
            transform.set_field("position", FieldValue::Bool(true)),
            Err(FieldError::TypeMismatch { .. })
        ));
    }
}
