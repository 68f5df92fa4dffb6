//! ECS World implementation
//!
//! Owns every entity, every component column, the scene hierarchy and the
//! deferred command queue. All access goes through generation-checked
//! [`Entity`] ids; a stale id fails with [`EcsError::DeadEntity`] instead of
//! reaching whatever reuses its slot.

use super::commands::{Command, CommandQueue, EntityTemplate};
use super::component::{Column, ComponentColumn};
use super::components::{ScriptBehavior, ScriptHandle, Transform};
use super::entity::EntityAllocator;
use super::hierarchy::Hierarchy;
use super::{Component, EcsError, Entity};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

/// ECS World containing all entities and components
#[derive(Default)]
pub struct World {
    entities: EntityAllocator,
    columns: HashMap<TypeId, Box<dyn ComponentColumn>>,
    hierarchy: Hierarchy,
    commands: CommandQueue,
    orphaned_scripts: Vec<ScriptHandle>,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity
    pub fn create(&mut self) -> Entity {
        self.entities.allocate()
    }

    /// Destroy an entity and its whole subtree.
    ///
    /// Destroying an id that is already dead is a no-op. Returns the entities
    /// that were actually destroyed.
    pub fn destroy(&mut self, entity: Entity) -> Vec<Entity> {
        if self.entities.is_reserved(entity) {
            self.entities.free(entity);
            return Vec::new();
        }
        if !self.entities.is_alive(entity) {
            log::trace!("destroy({entity}) ignored: not alive");
            return Vec::new();
        }

        let doomed = self.hierarchy.subtree(entity);
        for &victim in &doomed {
            if let Some(behavior) = self.column_mut::<ScriptBehavior>().and_then(|c| c.remove(victim)) {
                self.orphaned_scripts.push(behavior.handle);
            }
            for column in self.columns.values_mut() {
                column.remove_entity(victim);
            }
            self.hierarchy.remove(victim);
            self.entities.free(victim);
        }
        log::debug!("Destroyed {entity} ({} entities in subtree)", doomed.len());
        doomed
    }

    /// Check whether an id refers to a live entity
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Iterate over all live entities in slot order
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_alive()
    }

    /// Monotonic creation stamp; later-created entities compare greater
    pub fn creation_sequence(&self, entity: Entity) -> Result<u64, EcsError> {
        self.entities
            .creation_sequence(entity)
            .ok_or(EcsError::DeadEntity(entity))
    }

    /// Add a component to an entity
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let column = self.column_or_insert::<T>();
        if column.contains(entity) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: type_name::<T>(),
            });
        }
        column.push(entity, component);
        if TypeId::of::<T>() == TypeId::of::<Transform>() {
            self.mark_descendants_dirty(entity);
        }
        Ok(())
    }

    /// Get a component from an entity
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        self.ensure_alive(entity)?;
        self.column::<T>()
            .and_then(|column| column.get(entity))
            .ok_or_else(|| EcsError::missing::<T>(entity))
    }

    /// Get a mutable component from an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.ensure_alive(entity)?;
        self.column_mut::<T>()
            .and_then(|column| column.get_mut(entity))
            .ok_or_else(|| EcsError::missing::<T>(entity))
    }

    /// Check whether a live entity has a component
    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool, EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.column::<T>().is_some_and(|column| column.contains(entity)))
    }

    /// Remove and return a component.
    ///
    /// Removing a [`ScriptBehavior`] queues its handle for release like a
    /// destroy does, and adding or removing a [`Transform`] dirties the
    /// transforms below it.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        self.ensure_alive(entity)?;
        let removed = self
            .column_mut::<T>()
            .and_then(|column| column.remove(entity))
            .ok_or_else(|| EcsError::missing::<T>(entity))?;

        let any: &dyn Any = &removed;
        if let Some(behavior) = any.downcast_ref::<ScriptBehavior>() {
            self.orphaned_scripts.push(behavior.handle);
        } else if any.is::<Transform>() {
            self.mark_descendants_dirty(entity);
        }
        Ok(removed)
    }

    /// Visit every entity holding `T`, in insertion order
    pub fn for_each<T: Component>(&self, mut f: impl FnMut(Entity, &T)) {
        if let Some(column) = self.column::<T>() {
            for (entity, component) in column.iter() {
                f(entity, component);
            }
        }
    }

    /// Visit every entity holding `T` with mutable access, in insertion order
    pub fn for_each_mut<T: Component>(&mut self, mut f: impl FnMut(Entity, &mut T)) {
        if let Some(column) = self.column_mut::<T>() {
            for (entity, component) in column.iter_mut() {
                f(entity, component);
            }
        }
    }

    /// Visit every entity holding both `A` and `B`, in `A`'s insertion order
    pub fn for_each2<A: Component, B: Component>(&self, mut f: impl FnMut(Entity, &A, &B)) {
        let (Some(first), Some(second)) = (self.column::<A>(), self.column::<B>()) else {
            return;
        };
        for (entity, a) in first.iter() {
            if let Some(b) = second.get(entity) {
                f(entity, a, b);
            }
        }
    }

    /// Number of entities holding `T`
    pub fn count<T: Component>(&self) -> usize {
        self.column::<T>().map_or(0, Column::len)
    }

    // ---- scene graph ----

    /// Attach `child` under `parent`; rejects cycles
    pub fn attach_child(&mut self, child: Entity, parent: Entity) -> Result<(), EcsError> {
        self.ensure_alive(child)?;
        self.ensure_alive(parent)?;
        self.hierarchy.attach(child, parent)?;
        self.mark_transform_dirty(child);
        Ok(())
    }

    /// Detach an entity from its parent
    pub fn detach_child(&mut self, child: Entity) -> Result<Option<Entity>, EcsError> {
        self.ensure_alive(child)?;
        let previous = self.hierarchy.detach(child);
        if previous.is_some() {
            self.mark_transform_dirty(child);
        }
        Ok(previous)
    }

    /// Parent of a live entity
    pub fn parent_of(&self, entity: Entity) -> Result<Option<Entity>, EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.hierarchy.parent(entity))
    }

    /// Children of a live entity
    pub fn children_of(&self, entity: Entity) -> Result<&[Entity], EcsError> {
        self.ensure_alive(entity)?;
        Ok(self.hierarchy.children(entity))
    }

    /// Read-only access to the scene hierarchy
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Live entities without a parent
    pub fn roots(&self) -> Vec<Entity> {
        self.entities()
            .filter(|&entity| self.hierarchy.parent(entity).is_none())
            .collect()
    }

    // ---- deferred commands ----

    /// Reserve an id and queue its spawn for the next [`World::apply_commands`]
    pub fn queue_spawn(&mut self, template: EntityTemplate) -> Entity {
        let entity = self.entities.reserve();
        self.commands.push(Command::Spawn { entity, template });
        entity
    }

    /// Queue a destroy
    pub fn queue_destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy(entity));
    }

    /// Queue a re-parent
    pub fn queue_attach(&mut self, child: Entity, parent: Entity) {
        self.commands.push(Command::Attach { child, parent });
    }

    /// Queue a detach
    pub fn queue_detach(&mut self, child: Entity) {
        self.commands.push(Command::Detach(child));
    }

    /// Commands waiting to be applied
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Apply every queued structural change in order. Returns how many applied.
    ///
    /// Failures (a spawn whose reservation was destroyed, an attach that would
    /// form a cycle) are logged and skipped.
    pub fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        for command in self.commands.take() {
            match command {
                Command::Spawn { entity, template } => {
                    if self.spawn_reserved(entity, template) {
                        applied += 1;
                    }
                }
                Command::Destroy(entity) => {
                    self.destroy(entity);
                    applied += 1;
                }
                Command::Attach { child, parent } => match self.attach_child(child, parent) {
                    Ok(()) => applied += 1,
                    Err(e) => log::warn!("Deferred attach skipped: {e}"),
                },
                Command::Detach(child) => match self.detach_child(child) {
                    Ok(_) => applied += 1,
                    Err(e) => log::warn!("Deferred detach skipped: {e}"),
                },
            }
        }
        applied
    }

    /// Script handles whose behavior component went away with a destroyed entity
    pub fn take_orphaned_scripts(&mut self) -> Vec<ScriptHandle> {
        std::mem::take(&mut self.orphaned_scripts)
    }

    fn spawn_reserved(&mut self, entity: Entity, template: EntityTemplate) -> bool {
        if !self.entities.commit(entity) {
            log::debug!("Deferred spawn of {entity} dropped: reservation was released");
            return false;
        }

        if let Some(name) = template.name_component() {
            self.column_or_insert().push(entity, name);
        }
        self.column_or_insert().push(entity, template.transform);
        if let Some(renderable) = template.renderable {
            self.column_or_insert().push(entity, renderable);
        }
        if let Some(parent) = template.parent {
            if let Err(e) = self.attach_child(entity, parent) {
                log::warn!("Spawned {entity} left at root: {e}");
            }
        }
        true
    }

    fn mark_transform_dirty(&mut self, entity: Entity) {
        if let Some(transform) = self.column_mut::<Transform>().and_then(|c| c.get_mut(entity)) {
            transform.mark_dirty();
        }
    }

    /// Dirty the nearest transforms below `entity`, looking through
    /// transformless nodes
    fn mark_descendants_dirty(&mut self, entity: Entity) {
        let mut stack = self.hierarchy.children(entity).to_vec();
        while let Some(node) = stack.pop() {
            match self.column_mut::<Transform>().and_then(|c| c.get_mut(node)) {
                Some(transform) => transform.mark_dirty(),
                None => stack.extend_from_slice(self.hierarchy.children(node)),
            }
        }
    }

    fn ensure_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity(entity))
        }
    }

    fn column<T: Component>(&self) -> Option<&Column<T>> {
        self.columns
            .get(&TypeId::of::<T>())
            .and_then(|column| column.as_any().downcast_ref())
    }

    fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        self.columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|column| column.as_any_mut().downcast_mut())
    }

    fn column_or_insert<T: Component>(&mut self) -> &mut Column<T> {
        self.columns
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Column::<T>::new()))
            .as_any_mut()
            .downcast_mut()
            .expect("column registered under a foreign TypeId")
    }
}
