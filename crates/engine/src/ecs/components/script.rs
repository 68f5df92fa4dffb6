//! Script behavior component
//!
//! Links an entity to a live script instance owned by the script bridge, and
//! records which component fields that script was granted.

use crate::ecs::Component;
use crate::scripting::FieldAccess;
use std::collections::BTreeMap;

slotmap::new_key_type! {
    /// Handle to a script instance in the bridge registry
    pub struct ScriptHandle;
}

/// Field paths (`component.field`) a script may touch, with the rights granted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBindings {
    granted: BTreeMap<String, FieldAccess>,
}

impl FieldBindings {
    /// Grant `access` on `path`
    pub fn grant(&mut self, path: impl Into<String>, access: FieldAccess) {
        *self.granted.entry(path.into()).or_insert(FieldAccess::empty()) |= access;
    }

    /// True if every right in `access` was granted on `path`
    pub fn allows(&self, path: &str, access: FieldAccess) -> bool {
        self.granted.get(path).is_some_and(|granted| granted.contains(access))
    }

    /// Granted paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.granted.keys().map(String::as_str)
    }

    /// Number of granted paths
    pub fn len(&self) -> usize {
        self.granted.len()
    }

    /// True if nothing was granted
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}

/// Component attaching a script instance to an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBehavior {
    /// Bridge-side instance
    pub handle: ScriptHandle,
    /// Name the script was registered under (for logs)
    pub script_name: String,
    /// Exposed entity fields
    pub bindings: FieldBindings,
}

impl Component for ScriptBehavior {}
