//! Slot allocator.
//!
//! Every slot id in `[0, capacity)` is in exactly one of three states:
//! free, reserved (handed out by [`SlotAllocator::allocate`] but not yet
//! written) or used. Free and used slots are threaded onto two intrusive
//! doubly-linked lists over fixed arrays, so every transition is O(1) and
//! the structure never allocates after construction.

use crate::error::StoreError;
use crate::registry::Registry;
use crate::SlotId;

const NIL: SlotId = SlotId::MAX;

/// Which partition a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Reserved,
    Used,
}

#[derive(Debug, Clone, Copy)]
struct List {
    head: SlotId,
    len: usize,
}

impl List {
    const EMPTY: List = List { head: NIL, len: 0 };
}

/// Free/reserved/used partition of a collection's slots.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    state: Vec<SlotState>,
    prev: Vec<SlotId>,
    next: Vec<SlotId>,
    free: List,
    used: List,
}

impl SlotAllocator {
    /// Allocator with every slot free. Ids are handed out lowest first.
    pub fn new(capacity: usize) -> Self {
        let mut allocator = Self::empty(capacity);
        for id in (0..capacity as SlotId).rev() {
            allocator.push(id, SlotState::Free);
        }
        allocator
    }

    /// Rebuild the partition from a registry in one linear scan. VALID slots
    /// are used, everything else is free.
    pub fn from_registry(registry: &Registry) -> Self {
        let mut allocator = Self::empty(registry.capacity());
        let flags: Vec<_> = registry.iter().collect();
        for (id, slot) in flags.into_iter().rev() {
            let state = if slot.is_valid() {
                SlotState::Used
            } else {
                SlotState::Free
            };
            allocator.push(id, state);
        }
        allocator
    }

    fn empty(capacity: usize) -> Self {
        Self {
            state: vec![SlotState::Reserved; capacity],
            prev: vec![NIL; capacity],
            next: vec![NIL; capacity],
            free: List::EMPTY,
            used: List::EMPTY,
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.len()
    }

    /// State of `id`, or `None` when out of range.
    pub fn state(&self, id: SlotId) -> Option<SlotState> {
        self.state.get(id as usize).copied()
    }

    pub fn is_used(&self, id: SlotId) -> bool {
        self.state(id) == Some(SlotState::Used)
    }

    pub fn free_len(&self) -> usize {
        self.free.len
    }

    pub fn used_len(&self) -> usize {
        self.used.len
    }

    pub fn reserved_len(&self) -> usize {
        self.capacity() - self.free.len - self.used.len
    }

    /// Pop a free slot and mark it reserved.
    pub fn allocate(&mut self) -> Result<SlotId, StoreError> {
        let id = self.free.head;
        if id == NIL {
            return Err(StoreError::CapacityExhausted {
                capacity: self.capacity(),
            });
        }
        self.unlink(id);
        self.state[id as usize] = SlotState::Reserved;
        Ok(id)
    }

    /// Return a reserved slot to the free list. Releasing an already free
    /// slot is a no-op. Returns `false` when `id` is used or out of range,
    /// leaving the partition untouched.
    pub fn release(&mut self, id: SlotId) -> bool {
        match self.state(id) {
            Some(SlotState::Reserved) => {
                self.push(id, SlotState::Free);
                true
            }
            Some(SlotState::Free) => true,
            Some(SlotState::Used) | None => false,
        }
    }

    /// Move `id` to the used list from whichever state it is in.
    pub fn mark_used(&mut self, id: SlotId) {
        match self.state(id) {
            Some(SlotState::Used) | None => {}
            Some(SlotState::Free) => {
                self.unlink(id);
                self.push(id, SlotState::Used);
            }
            Some(SlotState::Reserved) => self.push(id, SlotState::Used),
        }
    }

    /// Move `id` to the free list from whichever state it is in.
    pub fn mark_free(&mut self, id: SlotId) {
        match self.state(id) {
            Some(SlotState::Free) | None => {}
            Some(SlotState::Used) => {
                self.unlink(id);
                self.push(id, SlotState::Free);
            }
            Some(SlotState::Reserved) => self.push(id, SlotState::Free),
        }
    }

    /// Used slot ids in list order, up to `limit`.
    pub fn used_ids(&self, limit: Option<usize>) -> Vec<SlotId> {
        self.walk(self.used.head, limit.unwrap_or(self.used.len))
    }

    pub fn free_ids(&self) -> Vec<SlotId> {
        self.walk(self.free.head, self.free.len)
    }

    fn walk(&self, head: SlotId, limit: usize) -> Vec<SlotId> {
        let mut out = Vec::with_capacity(limit);
        let mut cursor = head;
        while cursor != NIL && out.len() < limit {
            out.push(cursor);
            cursor = self.next[cursor as usize];
        }
        out
    }

    fn list_mut(&mut self, state: SlotState) -> Option<&mut List> {
        match state {
            SlotState::Free => Some(&mut self.free),
            SlotState::Used => Some(&mut self.used),
            SlotState::Reserved => None,
        }
    }

    /// Push a currently unlinked slot onto the head of `state`'s list.
    fn push(&mut self, id: SlotId, state: SlotState) {
        let i = id as usize;
        self.state[i] = state;
        let Some(list) = self.list_mut(state) else {
            return;
        };
        let old_head = list.head;
        list.head = id;
        list.len += 1;

        self.prev[i] = NIL;
        self.next[i] = old_head;
        if old_head != NIL {
            self.prev[old_head as usize] = id;
        }
    }

    /// Detach `id` from the list its current state says it is on.
    fn unlink(&mut self, id: SlotId) {
        let i = id as usize;
        let (prev, next) = (self.prev[i], self.next[i]);
        let state = self.state[i];

        if prev != NIL {
            self.next[prev as usize] = next;
        }
        if next != NIL {
            self.prev[next as usize] = prev;
        }
        if let Some(list) = self.list_mut(state) {
            if list.head == id {
                list.head = next;
            }
            list.len -= 1;
        }

        self.prev[i] = NIL;
        self.next[i] = NIL;
        self.state[i] = SlotState::Reserved;
    }
}
