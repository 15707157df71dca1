//! Heap slab with a free-list, addressed by compact `NodeId`s.

use std::ops::{Index, IndexMut};

/// A compact 32-bit index into a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// # Panics
    /// Panics if `index >= u32::MAX`.
    #[inline]
    pub fn new(index: usize) -> Self {
        assert!(index < u32::MAX as usize, "node index must be less than u32::MAX");
        Self(index as u32)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Slot state.
#[derive(Debug, Clone)]
enum Slot<T> {
    /// Free; stores the index of the next free slot.
    Vacant(usize),
    Occupied(T),
}

/// Slab of values with O(1) insert and remove.
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    entries: Vec<Slot<T>>,
    /// Occupied slots.
    len: usize,
    /// Head of the freelist; `entries.len()` when empty.
    next: usize,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            len: 0,
            next: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> NodeId {
        let index = self.next;
        if index == self.entries.len() {
            self.entries.push(Slot::Occupied(value));
            self.next = self.entries.len();
        } else {
            let next_free = match self.entries[index] {
                Slot::Vacant(next_free) => next_free,
                Slot::Occupied(_) => unreachable!("freelist points at an occupied slot"),
            };
            self.entries[index] = Slot::Occupied(value);
            self.next = next_free;
        }
        self.len += 1;
        NodeId::new(index)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.entries.get(id.get()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.entries.get_mut(id.get()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Removes the value at `id`, returning it if present.
    pub fn try_remove(&mut self, id: NodeId) -> Option<T> {
        let index = id.get();
        let slot = self.entries.get_mut(index)?;
        if matches!(slot, Slot::Vacant(_)) {
            return None;
        }
        let previous = std::mem::replace(slot, Slot::Vacant(self.next));
        self.next = index;
        self.len -= 1;
        match previous {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied(value) => Some((NodeId::new(index), value)),
                Slot::Vacant(_) => None,
            })
    }
}

impl<T> Index<NodeId> for NodeArena<T> {
    type Output = T;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.get(id) {
            Some(value) => value,
            None => panic!("invalid node id {}", id.get()),
        }
    }
}

impl<T> IndexMut<NodeId> for NodeArena<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("invalid node id {}", id.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_reuses_slots() {
        let mut arena = NodeArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.try_remove(a), Some("a"));
        assert_eq!(arena.try_remove(a), None);
        assert!(!arena.contains(a));

        let c = arena.insert("c");
        assert_eq!(c, a, "freed slot should be reused");
        assert_eq!(arena[b], "b");
        assert_eq!(arena[c], "c");
        assert_eq!(arena.iter().count(), 2);
    }
}
