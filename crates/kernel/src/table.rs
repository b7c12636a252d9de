//! Fixed-capacity thread table.
//!
//! Slots hold TCBs; ids come from a counter that only moves forward. A slot
//! whose thread has reached a terminal state keeps its TCB so that late
//! observers still see the outcome. Only when every slot is taken does
//! creation reclaim the terminal slot with the oldest id. Lookups always
//! compare the stored id, so an id whose slot was reclaimed is reported as
//! [`Error::InvalidId`] instead of matching the new occupant.

use alloc::vec::Vec;

use crate::error::{Error, KResult};
use crate::thread::{Tcb, ThreadId, ThreadSpec};

/// Result of admitting a new thread into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub id: ThreadId,
    /// Terminal thread whose slot was reused, if any.
    pub reclaimed: Option<ThreadId>,
}

#[derive(Debug)]
pub struct ThreadTable {
    slots: Vec<Option<Tcb>>,
    next_id: u32,
}

impl ThreadTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, next_id: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots, terminal threads included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id the next successful [`ThreadTable::create`] will assign.
    pub fn next_id(&self) -> ThreadId {
        ThreadId(self.next_id)
    }

    /// Admits a new thread in the `Ready` state.
    pub fn create(&mut self, spec: ThreadSpec) -> KResult<Admission> {
        let (index, reclaimed) = match self.slots.iter().position(Option::is_none) {
            Some(index) => (index, None),
            None => {
                let index = self.oldest_terminal().ok_or(Error::TableFull)?;
                let old = self.slots[index].take().map(|tcb| tcb.id);
                (index, old)
            }
        };

        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.slots[index] = Some(Tcb::new(id, spec));
        Ok(Admission { id, reclaimed })
    }

    pub fn lookup(&self, id: ThreadId) -> KResult<&Tcb> {
        self.iter().find(|tcb| tcb.id == id).ok_or(Error::InvalidId)
    }

    pub fn lookup_mut(&mut self, id: ThreadId) -> KResult<&mut Tcb> {
        self.iter_mut().find(|tcb| tcb.id == id).ok_or(Error::InvalidId)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.lookup(id).is_ok()
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tcb> {
        self.slots.iter_mut().flatten()
    }

    /// Ids of all occupied slots, ascending.
    pub fn ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = self.iter().map(|tcb| tcb.id).collect();
        ids.sort_unstable();
        ids
    }

    /// True when no thread can ever run again.
    pub fn all_terminal(&self) -> bool {
        self.iter().all(Tcb::is_terminal)
    }

    fn oldest_terminal(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|tcb| (index, tcb)))
            .filter(|(_, tcb)| tcb.is_terminal())
            .min_by_key(|(_, tcb)| tcb.id)
            .map(|(index, _)| index)
    }
}
