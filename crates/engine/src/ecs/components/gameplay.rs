//! Small gameplay components scripts commonly read and write

use crate::ecs::Component;
use crate::scripting::{FieldAccess, FieldError, FieldValue, Reflect};

/// Human-readable entity name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

impl Component for Name {}

impl Name {
    /// Create a name component
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Reflect for Name {
    const TYPE_NAME: &'static str = "name";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[("value", FieldAccess::READ)];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        (field == "value").then(|| FieldValue::Text(self.0.clone()))
    }

    fn set_field(&mut self, field: &str, _value: FieldValue) -> Result<(), FieldError> {
        match field {
            "value" => Err(FieldError::ReadOnly(format!("name.{field}"))),
            _ => Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
    }
}

/// Hit points
#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    /// Remaining hit points, kept within `0..=max`
    pub current: f32,
    /// Upper bound
    pub max: f32,
}

impl Component for Health {}

impl Health {
    /// Full health
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    /// True once hit points reach zero
    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }
}

impl Reflect for Health {
    const TYPE_NAME: &'static str = "health";
    const FIELDS: &'static [(&'static str, FieldAccess)] = &[
        ("current", FieldAccess::READ_WRITE),
        ("max", FieldAccess::READ),
    ];

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "current" => Some(FieldValue::Number(f64::from(self.current))),
            "max" => Some(FieldValue::Number(f64::from(self.max))),
            _ => None,
        }
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), FieldError> {
        match field {
            "current" => {
                self.current = value.into_f32(field)?.clamp(0.0, self.max);
                Ok(())
            }
            "max" => Err(FieldError::ReadOnly(format!("health.{field}"))),
            _ => Err(FieldError::unknown(Self::TYPE_NAME, field)),
        }
    }
}
