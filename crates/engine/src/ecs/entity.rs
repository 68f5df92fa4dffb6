//! Entity identifiers and the slot allocator behind them

use std::fmt;

/// Entity identifier
///
/// An index into the entity arena plus the generation of that slot. A slot's
/// generation is bumped every time the entity living in it is destroyed, so an
/// old identifier can never resolve to whatever reuses the slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Slot index in the arena
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was handed out
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single integer (generation in the high half)
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Inverse of [`Entity::to_bits`]
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: (bits & 0xFFFF_FFFF) as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Id handed out for a deferred spawn, not yet visible to queries
    Reserved,
    Alive,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    state: SlotState,
    created: u64,
}

/// Arena + free-list allocator for entity ids
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
    next_sequence: u64,
}

impl EntityAllocator {
    /// Allocate a live entity
    pub fn allocate(&mut self) -> Entity {
        let entity = self.take_slot(SlotState::Alive);
        self.alive += 1;
        self.stamp(entity);
        entity
    }

    /// Reserve an id whose entity becomes alive on [`EntityAllocator::commit`]
    pub fn reserve(&mut self) -> Entity {
        self.take_slot(SlotState::Reserved)
    }

    /// Turn a reservation into a live entity. False if it was freed meanwhile.
    pub fn commit(&mut self, entity: Entity) -> bool {
        match self.slot_mut(entity) {
            Some(slot) if slot.state == SlotState::Reserved => {
                slot.state = SlotState::Alive;
            }
            _ => return false,
        }
        self.alive += 1;
        self.stamp(entity);
        true
    }

    /// Release a live or reserved entity. False for stale ids.
    pub fn free(&mut self, entity: Entity) -> bool {
        let was_alive = match self.slot_mut(entity) {
            Some(slot) if slot.state != SlotState::Free => {
                let was_alive = slot.state == SlotState::Alive;
                slot.state = SlotState::Free;
                slot.generation = slot.generation.wrapping_add(1);
                was_alive
            }
            _ => return false,
        };
        if was_alive {
            self.alive -= 1;
        }
        self.free.push(entity.index);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slot(entity).is_some_and(|slot| slot.state == SlotState::Alive)
    }

    pub fn is_reserved(&self, entity: Entity) -> bool {
        self.slot(entity).is_some_and(|slot| slot.state == SlotState::Reserved)
    }

    /// Monotonic creation stamp of a live entity
    pub fn creation_sequence(&self, entity: Entity) -> Option<u64> {
        self.slot(entity)
            .filter(|slot| slot.state == SlotState::Alive)
            .map(|slot| slot.created)
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// All live entities, in slot order
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            (slot.state == SlotState::Alive).then_some(Entity {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn take_slot(&mut self, state: SlotState) -> Entity {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = state;
            return Entity { index, generation: slot.generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, state, created: 0 });
        Entity { index, generation: 0 }
    }

    fn stamp(&mut self, entity: Entity) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if let Some(slot) = self.slot_mut(entity) {
            slot.created = sequence;
        }
    }

    fn slot(&self, entity: Entity) -> Option<&Slot> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
    }

    fn slot_mut(&mut self, entity: Entity) -> Option<&mut Slot> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_generation_is_zero() {
        let mut allocator = EntityAllocator::default();
        let entity = allocator.allocate();
        assert_eq!(entity.index(), 0);
        assert_eq!(entity.generation(), 0);
        assert!(allocator.is_alive(entity));
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut allocator = EntityAllocator::default();
        let first = allocator.allocate();
        assert!(allocator.free(first));

        let second = allocator.allocate();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), 1);
        assert_ne!(first, second);
        assert!(!allocator.is_alive(first));
        assert!(!allocator.free(first));
    }

    #[test]
    fn test_reservation_lifecycle() {
        let mut allocator = EntityAllocator::default();
        let reserved = allocator.reserve();
        assert!(!allocator.is_alive(reserved));
        assert!(allocator.is_reserved(reserved));
        assert_eq!(allocator.alive_count(), 0);

        assert!(allocator.commit(reserved));
        assert!(allocator.is_alive(reserved));
        assert!(!allocator.commit(reserved));
        assert_eq!(allocator.alive_count(), 1);
    }

    #[test]
    fn test_freed_reservation_cannot_commit() {
        let mut allocator = EntityAllocator::default();
        let reserved = allocator.reserve();
        assert!(allocator.free(reserved));
        assert!(!allocator.commit(reserved));
        assert_eq!(allocator.alive_count(), 0);
    }

    #[test]
    fn test_creation_sequence_is_monotonic() {
        let mut allocator = EntityAllocator::default();
        let a = allocator.allocate();
        let b = allocator.reserve();
        let c = allocator.allocate();
        allocator.commit(b);

        let seq = |e| allocator.creation_sequence(e).unwrap();
        assert!(seq(a) < seq(c));
        assert!(seq(c) < seq(b));
    }

    #[test]
    fn test_bits_round_trip() {
        let mut allocator = EntityAllocator::default();
        let e = allocator.allocate();
        allocator.free(e);
        let e = allocator.allocate();
        assert_eq!(Entity::from_bits(e.to_bits()), e);
    }
}
