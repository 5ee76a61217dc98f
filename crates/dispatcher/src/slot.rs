//! Fixed-capacity slot arena with generational keys.
//!
//! Storage is reserved once at construction and never grows, so inserting
//! into a full arena fails instead of allocating. Keys carry the generation of
//! the occupant they were issued for; a key to a slot that has since been freed
//! (and possibly reused) no longer resolves.

use std::fmt;

use slab::Slab;

/// Handle to an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: usize,
    generation: u64,
}

impl SlotKey {
    /// Position in the arena, stable for the occupant's lifetime
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u64,
    value: T,
}

/// Arena of at most `capacity` values
pub struct SlotArena<T> {
    slots: Slab<Slot<T>>,
    capacity: usize,
    next_generation: u64,
}

impl<T> SlotArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::with_capacity(capacity),
            capacity,
            next_generation: 0,
        }
    }

    /// Store `value`, handing it back when the arena is full
    pub fn insert(&mut self, value: T) -> Result<SlotKey, T> {
        if self.is_full() {
            return Err(value);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let index = self.slots.insert(Slot { generation, value });
        Ok(SlotKey { index, generation })
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        Some(self.slots.remove(key.index).value)
    }

    /// Drop every occupant; keys issued so far become stale
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> {
        self.slots.iter().map(|(index, slot)| {
            (
                SlotKey {
                    index,
                    generation: slot.generation,
                },
                &slot.value,
            )
        })
    }
}

impl<T> fmt::Debug for SlotArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotArena")
            .field("len", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
