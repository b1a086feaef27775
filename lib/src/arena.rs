//! Generation-checked slot arena.
//!
//! Backing store for the scheduler's index-linked lists (sleepers, waiting
//! parents). A removed slot bumps its generation, so an [`ArenaIndex`] held
//! past removal resolves to `None` instead of aliasing a newer entry.

use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaIndex {
    slot: u32,
    generation: u32,
}

impl ArenaIndex {
    #[inline]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: Option<u32> },
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value`, reusing a freed slot when one exists.
    ///
    /// Hands the value back if the backing vector cannot grow.
    pub fn try_insert(&mut self, value: T) -> Result<ArenaIndex, T> {
        if let Some(slot) = self.free_head {
            let entry = &mut self.slots[slot as usize];
            let (generation, next_free) = match entry {
                Slot::Free {
                    generation,
                    next_free,
                } => (*generation, *next_free),
                Slot::Occupied { .. } => return Err(value),
            };
            *entry = Slot::Occupied { generation, value };
            self.free_head = next_free;
            self.len += 1;
            return Ok(ArenaIndex { slot, generation });
        }

        if self.slots.len() >= u32::MAX as usize || self.slots.try_reserve(1).is_err() {
            return Err(value);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        self.len += 1;
        Ok(ArenaIndex {
            slot,
            generation: 0,
        })
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.slots.get(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.slots.get_mut(index.slot as usize)? {
            Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Remove the value at `index`. Stale indices return `None`.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        match entry {
            Slot::Occupied { generation, .. } if *generation == index.generation => {}
            _ => return None,
        }
        let freed = Slot::Free {
            generation: index.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = core::mem::replace(entry, freed);
        self.free_head = Some(index.slot);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.len = 0;
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.try_insert(10u32).unwrap();
        let b = arena.try_insert(20u32).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&10));
        *arena.get_mut(b).unwrap() += 1;
        assert_eq!(arena.remove(b), Some(21));
        assert_eq!(arena.remove(b), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_index_does_not_alias_reused_slot() {
        let mut arena = Arena::new();
        let old = arena.try_insert("sleeper").unwrap();
        arena.remove(old);
        let new = arena.try_insert("waiter").unwrap();
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.generation(), old.generation());
        assert!(arena.get(old).is_none());
        assert!(!arena.contains(old));
        assert_eq!(arena.get(new), Some(&"waiter"));
    }
}
