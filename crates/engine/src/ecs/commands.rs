//! Deferred structural changes
//!
//! Spawns, destroys and re-parenting requested while the store is being
//! iterated (most importantly from script callbacks) are recorded here and
//! applied in one go by [`World::apply_commands`](super::World::apply_commands).

use super::components::{Name, Renderable, Transform};
use super::Entity;

/// Components a deferred spawn starts with
#[derive(Debug, Clone, Default)]
pub struct EntityTemplate {
    /// Optional display name
    pub name: Option<String>,
    /// Local transform
    pub transform: Transform,
    /// Optional mesh/material pair
    pub renderable: Option<Renderable>,
    /// Optional parent to attach under once spawned
    pub parent: Option<Entity>,
}

/// A queued structural change
#[derive(Debug, Clone)]
pub enum Command {
    /// Bring a reserved entity to life with the template's components
    Spawn {
        /// Reserved id
        entity: Entity,
        /// Initial components
        template: EntityTemplate,
    },
    /// Destroy an entity (and its subtree)
    Destroy(Entity),
    /// Re-parent `child` under `parent`
    Attach {
        /// Entity to move
        child: Entity,
        /// New parent
        parent: Entity,
    },
    /// Make an entity a root
    Detach(Entity),
}

/// FIFO of pending structural changes
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Number of pending commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

impl EntityTemplate {
    /// Template with just a transform
    pub fn at(transform: Transform) -> Self {
        Self {
            transform,
            ..Self::default()
        }
    }

    /// Builder: set the display name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: attach a renderable
    pub fn with_renderable(mut self, renderable: Renderable) -> Self {
        self.renderable = Some(renderable);
        self
    }

    /// Builder: spawn under a parent
    pub fn with_parent(mut self, parent: Entity) -> Self {
        self.parent = Some(parent);
        self
    }

    pub(crate) fn name_component(&self) -> Option<Name> {
        self.name.clone().map(Name)
    }
}
