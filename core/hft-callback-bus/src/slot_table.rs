//! Generation-counted sparse/dense index
//!
//! Every subscription owns a slot. The slot records where the subscription
//! currently sits in the dense arrays of its registry and how many times the
//! slot has been recycled. Dense positions move on removal (swap-remove),
//! slot indices never do:
//!
//! ```text
//! slots:     [ {dense: 1, gen: 0} | {free, gen: 1} | {dense: 0, gen: 3} ]
//! back_refs: [ 2 | 0 ]
//! free:      [ 1 ]
//! ```
//!
//! The table only tracks indices. The owner keeps its own dense payload
//! array and mirrors every `swap_remove` the table reports, so both stay in
//! lockstep.

use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Position in the dense arrays, `None` while the slot is free
    dense: Option<u32>,
    generation: u32,
}

#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    /// Grows, never shrinks
    slots: Vec<Slot>,
    /// Slot index owning each dense position
    back_refs: Vec<u32>,
    /// Freed slots, reused oldest first
    free: VecDeque<u32>,
    /// Slots whose generation counter is exhausted
    retired: usize,
}

impl SlotTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            back_refs: Vec::with_capacity(capacity),
            free: VecDeque::new(),
            retired: 0,
        }
    }

    /// Claim a slot and append it at the end of the dense index space.
    ///
    /// Returns `(slot, generation)` of the new occupant. The caller must push
    /// its payload at dense position `len() - 1`.
    pub(crate) fn insert(&mut self) -> (u32, u32) {
        let dense = self.back_refs.len() as u32;
        let slot = match self.free.pop_front() {
            Some(slot) => slot,
            None => {
                assert!(
                    self.slots.len() < u32::MAX as usize,
                    "listener slot space exhausted"
                );
                self.slots.push(Slot {
                    dense: None,
                    generation: 0,
                });
                (self.slots.len() - 1) as u32
            }
        };

        // Dense position is set on every claim, fresh or recycled.
        let entry = &mut self.slots[slot as usize];
        entry.dense = Some(dense);
        self.back_refs.push(slot);

        (slot, entry.generation)
    }

    /// Current dense position of a live `(slot, generation)` pair
    #[inline]
    pub(crate) fn dense_index(&self, slot: u32, generation: u32) -> Option<usize> {
        let entry = self.slots.get(slot as usize)?;
        if entry.generation != generation {
            return None;
        }
        entry.dense.map(|dense| dense as usize)
    }

    #[inline]
    pub(crate) fn contains(&self, slot: u32, generation: u32) -> bool {
        self.dense_index(slot, generation).is_some()
    }

    /// Release a live slot.
    ///
    /// Returns the dense position that was vacated; the caller must
    /// `swap_remove` the same position in its payload array. Returns `None`
    /// for an unknown, free or outdated `(slot, generation)` pair and leaves
    /// the table untouched.
    pub(crate) fn remove(&mut self, slot: u32, generation: u32) -> Option<usize> {
        let removed = self.dense_index(slot, generation)?;

        self.back_refs.swap_remove(removed);
        if let Some(&moved) = self.back_refs.get(removed) {
            self.slots[moved as usize].dense = Some(removed as u32);
        }
        self.release(slot);

        Some(removed)
    }

    /// Release every live slot, invalidating all outstanding handles
    pub(crate) fn clear(&mut self) {
        let occupied = std::mem::take(&mut self.back_refs);
        for slot in occupied {
            self.release(slot);
        }
    }

    fn release(&mut self, slot: u32) {
        let entry = &mut self.slots[slot as usize];
        entry.dense = None;
        match entry.generation.checked_add(1) {
            Some(next) => {
                entry.generation = next;
                self.free.push_back(slot);
            }
            None => {
                // A wrapped counter could revive a stale handle.
                self.retired += 1;
                debug!("Retiring listener slot {} after generation overflow", slot);
            }
        }
    }

    /// Live `(slot, generation)` keys in dense order
    pub(crate) fn keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.back_refs
            .iter()
            .map(move |&slot| (slot, self.slots[slot as usize].generation))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.back_refs.len()
    }

    /// Slots ever allocated (live, free and retired)
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn retired_count(&self) -> usize {
        self.retired
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut occupied = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(dense) = slot.dense {
                occupied += 1;
                assert_eq!(
                    self.back_refs[dense as usize] as usize, index,
                    "back-reference at dense {} does not name slot {}",
                    dense, index
                );
            }
        }
        assert_eq!(occupied, self.back_refs.len());
        assert_eq!(
            occupied + self.free.len() + self.retired,
            self.slots.len()
        );
    }
}
