//! Entity-Component-System implementation
//!
//! Generation-checked entities, typed component columns, the scene graph and
//! the deferred command queue scripts use for structural changes.

pub mod world;
pub mod entity;
pub mod component;
pub mod components;
pub mod hierarchy;
pub mod commands;

pub use world::World;
pub use entity::Entity;
pub use component::Component;
pub use hierarchy::Hierarchy;
pub use commands::{Command, CommandQueue, EntityTemplate};

use thiserror::Error;

/// Entity store errors
///
/// These indicate a logic bug in engine or game code and are always returned
/// to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The id refers to a destroyed (or never committed) slot
    #[error("{0} is not alive")]
    DeadEntity(Entity),

    /// The entity already holds a component of this type
    #[error("{entity} already has a {component} component")]
    DuplicateComponent {
        /// Target entity
        entity: Entity,
        /// Component type name
        component: &'static str,
    },

    /// The entity holds no component of this type
    #[error("{entity} has no {component} component")]
    MissingComponent {
        /// Target entity
        entity: Entity,
        /// Component type name
        component: &'static str,
    },

    /// Attaching would make the scene graph cyclic
    #[error("cannot attach {child} under {parent}: would create a cycle")]
    Cycle {
        /// Entity being attached
        child: Entity,
        /// Requested parent
        parent: Entity,
    },
}

impl EcsError {
    pub(crate) fn missing<T: Component>(entity: Entity) -> Self {
        Self::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        }
    }
}
