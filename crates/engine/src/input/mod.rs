//! Input snapshot
//!
//! The platform layer builds one of these per frame; the engine latches it at
//! `BeginFrame` and it stays immutable until the next frame.

use std::collections::{BTreeMap, BTreeSet};

/// Immutable input state for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    actions: BTreeSet<String>,
    axes: BTreeMap<String, f32>,
}

impl InputSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: mark an action as held
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Builder pattern: set an analog axis, clamped to [-1, 1]
    pub fn with_axis(mut self, axis: impl Into<String>, value: f32) -> Self {
        self.axes.insert(axis.into(), value.clamp(-1.0, 1.0));
        self
    }

    /// Whether an action is held
    pub fn is_active(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    /// Axis value, 0 when absent
    pub fn axis(&self, axis: &str) -> f32 {
        self.axes.get(axis).copied().unwrap_or(0.0)
    }

    /// Held actions, sorted
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(String::as_str)
    }

    /// Axis values, sorted by name
    pub fn axes(&self) -> impl Iterator<Item = (&str, f32)> {
        self.axes.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_queries() {
        let input = InputSnapshot::new().with_action("jump").with_axis("move_x", 3.0);
        assert!(input.is_active("jump"));
        assert!(!input.is_active("fire"));
        assert_eq!(input.axis("move_x"), 1.0);
        assert_eq!(input.axis("move_y"), 0.0);
    }
}
