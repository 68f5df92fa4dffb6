//! Component trait and typed column storage

use super::Entity;
use std::any::Any;
use std::collections::HashMap;

/// Marker trait for components
pub trait Component: 'static + Send + Sync {}

/// Type-erased view of a column so the world can remove an entity from every
/// column without knowing the component types.
pub(crate) trait ComponentColumn: Any + Send + Sync {
    /// Drop the entity's component, if any
    fn remove_entity(&mut self, entity: Entity) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense storage for one component type.
///
/// Entries stay in insertion order; removal shifts later entries down.
pub(crate) struct Column<T> {
    entries: Vec<(Entity, T)>,
    index: HashMap<Entity, usize>,
}

impl<T: Component> Column<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    /// Append a component. Caller guarantees the entity has none yet.
    pub fn push(&mut self, entity: Entity, value: T) {
        self.index.insert(entity, self.entries.len());
        self.entries.push((entity, value));
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.index.get(&entity).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = *self.index.get(&entity)?;
        Some(&mut self.entries[slot].1)
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.index.remove(&entity)?;
        let (_, value) = self.entries.remove(slot);
        for (moved, _) in &self.entries[slot..] {
            if let Some(position) = self.index.get_mut(moved) {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entries.iter().map(|(entity, value)| (*entity, value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entries.iter_mut().map(|(entity, value)| (*entity, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T: Component> ComponentColumn for Column<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);
    impl Component for Marker {}

    #[test]
    fn test_removal_keeps_insertion_order() {
        let mut world = World::new();
        let ids: Vec<Entity> = (0..4).map(|_| world.create()).collect();

        let mut column = Column::new();
        for (n, entity) in ids.iter().enumerate() {
            column.push(*entity, Marker(n as u32));
        }

        assert_eq!(column.remove(ids[1]), Some(Marker(1)));
        let order: Vec<u32> = column.iter().map(|(_, m)| m.0).collect();
        assert_eq!(order, vec![0, 2, 3]);
        assert_eq!(column.get(ids[3]), Some(&Marker(3)));
        assert_eq!(column.len(), 3);
    }
}
