//! Script-visible component fields
//!
//! Components opt into scripting by implementing [`Reflect`], which names
//! their fields and the most access each field can ever allow. A
//! [`FieldWhitelist`] then picks the subset scripts actually get, checked
//! against [`Reflect::FIELDS`] when the entry is registered so a typo fails at
//! startup instead of in the middle of a frame.

use crate::ecs::{Component, EcsError, Entity, World};
use crate::foundation::math::Vec3;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

bitflags! {
    /// Rights a script holds on a field
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAccess: u8 {
        /// `getField`
        const READ = 1 << 0;
        /// `setField`
        const WRITE = 1 << 1;
        /// Both
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A value crossing the script boundary
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Number(f64),
    /// 3-vector
    Vec3(Vec3),
    /// String
    Text(String),
}

impl FieldValue {
    /// Short type name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Number(_) => "number",
            Self::Vec3(_) => "vec3",
            Self::Text(_) => "string",
        }
    }

    /// Coerce to a vector
    pub fn into_vec3(self, field: &str) -> Result<Vec3, FieldError> {
        match self {
            Self::Vec3(v) => Ok(v),
            other => Err(FieldError::mismatch(field, "vec3", &other)),
        }
    }

    /// Coerce to `f32`, accepting integers
    pub fn into_f32(self, field: &str) -> Result<f32, FieldError> {
        match self {
            Self::Number(n) => Ok(n as f32),
            Self::Int(i) => Ok(i as f32),
            other => Err(FieldError::mismatch(field, "number", &other)),
        }
    }

    /// Coerce to a boolean
    pub fn into_bool(self, field: &str) -> Result<bool, FieldError> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(FieldError::mismatch(field, "boolean", &other)),
        }
    }
}

/// Field access failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The component type has no such field
    #[error("{component} has no field '{field}'")]
    UnknownField {
        /// Component type name
        component: String,
        /// Requested field
        field: String,
    },

    /// No whitelist entry for this component type
    #[error("component '{0}' is not scriptable")]
    UnknownComponent(String),

    /// Value of the wrong type
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Accepted type
        expected: &'static str,
        /// Supplied type
        found: &'static str,
    },

    /// Write to a read-only field
    #[error("field '{0}' is read-only")]
    ReadOnly(String),

    /// The whitelist does not grant this access
    #[error("'{0}' is not exposed to scripts with the requested access")]
    NotExposed(String),

    /// The calling script was not bound to this field
    #[error("script has no {access:?} binding for '{path}'")]
    AccessDenied {
        /// Field path
        path: String,
        /// Requested rights
        access: FieldAccess,
    },

    /// Not of the form `component.field`
    #[error("malformed field path '{0}'")]
    BadPath(String),

    /// Underlying entity store error
    #[error(transparent)]
    Ecs(#[from] EcsError),
}

impl FieldError {
    /// Unknown field on a component type
    pub fn unknown(component: &str, field: &str) -> Self {
        Self::UnknownField {
            component: component.to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn mismatch(field: &str, expected: &'static str, found: &FieldValue) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

/// A component whose fields can be read and written by name
pub trait Reflect: Component {
    /// Name scripts use for the component (`transform` in `transform.position`)
    const TYPE_NAME: &'static str;
    /// Every field with the widest access it supports
    const FIELDS: &'static [(&'static str, FieldAccess)];

    /// Read a field
    fn get_field(&self, field: &str) -> Option<FieldValue>;

    /// Write a field
    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), FieldError>;
}

type Getter = fn(&World, Entity, &str) -> Result<FieldValue, FieldError>;
type Setter = fn(&mut World, Entity, &str, FieldValue) -> Result<(), FieldError>;

struct WhitelistEntry {
    fields: BTreeMap<&'static str, FieldAccess>,
    get: Getter,
    set: Setter,
}

impl fmt::Debug for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

fn read_component<T: Reflect>(world: &World, entity: Entity, field: &str) -> Result<FieldValue, FieldError> {
    world
        .get_component::<T>(entity)?
        .get_field(field)
        .ok_or_else(|| FieldError::unknown(T::TYPE_NAME, field))
}

fn write_component<T: Reflect>(
    world: &mut World,
    entity: Entity,
    field: &str,
    value: FieldValue,
) -> Result<(), FieldError> {
    world.get_component_mut::<T>(entity)?.set_field(field, value)
}

/// Per-component-type list of fields scripts may touch
#[derive(Debug, Default)]
pub struct FieldWhitelist {
    entries: BTreeMap<&'static str, WhitelistEntry>,
}

impl FieldWhitelist {
    /// Empty whitelist
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelist covering the engine's scriptable components
    pub fn engine_defaults() -> Result<Self, FieldError> {
        use crate::ecs::components::{Camera, Health, Name, Renderable, Transform};

        let mut whitelist = Self::new();
        whitelist
            .allow::<Transform>(&["position", "rotation", "scale"], FieldAccess::READ_WRITE)?
            .allow::<Transform>(&["world_position"], FieldAccess::READ)?
            .allow::<Renderable>(&["visible"], FieldAccess::READ_WRITE)?
            .allow::<Camera>(&["fov"], FieldAccess::READ_WRITE)?
            .allow::<Name>(&["value"], FieldAccess::READ)?
            .allow::<Health>(&["current"], FieldAccess::READ_WRITE)?
            .allow::<Health>(&["max"], FieldAccess::READ)?;
        Ok(whitelist)
    }

    /// Expose `fields` of `T` with `access`.
    ///
    /// Fails if a field does not exist on `T` or `T` cannot support `access`
    /// on it; nothing is registered in that case.
    pub fn allow<T: Reflect>(&mut self, fields: &[&str], access: FieldAccess) -> Result<&mut Self, FieldError> {
        let mut validated = Vec::with_capacity(fields.len());
        for &field in fields {
            let (name, supported) = T::FIELDS
                .iter()
                .find(|(name, _)| *name == field)
                .ok_or_else(|| FieldError::unknown(T::TYPE_NAME, field))?;
            if !supported.contains(access) {
                return Err(FieldError::ReadOnly(format!("{}.{field}", T::TYPE_NAME)));
            }
            validated.push(*name);
        }

        let entry = self.entries.entry(T::TYPE_NAME).or_insert_with(|| WhitelistEntry {
            fields: BTreeMap::new(),
            get: read_component::<T>,
            set: write_component::<T>,
        });
        for name in validated {
            *entry.fields.entry(name).or_insert(FieldAccess::empty()) |= access;
        }
        Ok(self)
    }

    /// Access the whitelist grants on `path`, if any
    pub fn access(&self, path: &str) -> Result<FieldAccess, FieldError> {
        let (component, field) = split_path(path)?;
        let entry = self
            .entries
            .get(component)
            .ok_or_else(|| FieldError::UnknownComponent(component.to_string()))?;
        entry
            .fields
            .get(field)
            .copied()
            .ok_or_else(|| FieldError::NotExposed(path.to_string()))
    }

    /// True if the whitelist grants at least `access` on `path`
    pub fn permits(&self, path: &str, access: FieldAccess) -> bool {
        self.access(path).is_ok_and(|granted| granted.contains(access))
    }

    /// Every whitelisted path with its access, sorted
    pub fn paths(&self) -> impl Iterator<Item = (String, FieldAccess)> + '_ {
        self.entries.iter().flat_map(|(component, entry)| {
            entry
                .fields
                .iter()
                .map(move |(field, access)| (format!("{component}.{field}"), *access))
        })
    }

    /// Read a whitelisted field
    pub fn get(&self, world: &World, entity: Entity, path: &str) -> Result<FieldValue, FieldError> {
        let (entry, field) = self.entry_for(path, FieldAccess::READ)?;
        (entry.get)(world, entity, field)
    }

    /// Write a whitelisted field
    pub fn set(&self, world: &mut World, entity: Entity, path: &str, value: FieldValue) -> Result<(), FieldError> {
        let (entry, field) = self.entry_for(path, FieldAccess::WRITE)?;
        (entry.set)(world, entity, field, value)
    }

    fn entry_for<'p>(&self, path: &'p str, access: FieldAccess) -> Result<(&WhitelistEntry, &'p str), FieldError> {
        let granted = self.access(path)?;
        if !granted.contains(access) {
            return Err(if access.contains(FieldAccess::WRITE) {
                FieldError::ReadOnly(path.to_string())
            } else {
                FieldError::NotExposed(path.to_string())
            });
        }
        let (component, field) = split_path(path)?;
        let entry = self
            .entries
            .get(component)
            .ok_or_else(|| FieldError::UnknownComponent(component.to_string()))?;
        Ok((entry, field))
    }
}

fn split_path(path: &str) -> Result<(&str, &str), FieldError> {
    match path.split_once('.') {
        Some((component, field)) if !component.is_empty() && !field.is_empty() && !field.contains('.') => {
            Ok((component, field))
        }
        _ => Err(FieldError::BadPath(path.to_string())),
    }
}
