//! Round-robin thread selection.
//!
//! ## Scheduling Policy
//!
//! 1. Only `Ready` threads are candidates; there are no priorities
//! 2. Candidates are considered in id order, starting after the thread that
//!    ran last and wrapping around
//! 3. A directed yield may hand the CPU to a specific ready thread, after
//!    which the rotation continues from that thread
//!
//! With N threads perpetually ready every one of them is chosen within N
//! consecutive selections.

use alloc::vec::Vec;

use crate::table::ThreadTable;
use crate::thread::{Tcb, ThreadId};

/// Outcome of a selection step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Switch to this thread.
    Run(ThreadId),
    /// Live threads exist but none is ready.
    Idle,
    /// Every thread has reached a terminal state.
    Halted,
}

/// Rotation state of the round-robin scheduler.
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    /// Thread most recently switched in; the rotation resumes after it.
    cursor: Option<ThreadId>,
    switches: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            cursor: None,
            switches: 0,
        }
    }

    pub fn cursor(&self) -> Option<ThreadId> {
        self.cursor
    }

    /// Number of context switches performed so far.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Picks the next thread to run without committing to it.
    pub fn plan(&self, table: &ThreadTable) -> Plan {
        let after = self.cursor;
        let next = rotation(table, after).into_iter().find(|id| {
            table.lookup(*id).map(Tcb::is_ready).unwrap_or(false)
        });
        match next {
            Some(id) => Plan::Run(id),
            None if table.all_terminal() => Plan::Halted,
            None => Plan::Idle,
        }
    }

    /// Records that `id` has been switched in.
    pub fn switched_to(&mut self, id: ThreadId) {
        self.cursor = Some(id);
        self.switches += 1;
    }
}

/// All thread ids in rotation order: those above `after` ascending, then the
/// rest ascending (ending with `after` itself if present).
pub fn rotation(table: &ThreadTable, after: Option<ThreadId>) -> Vec<ThreadId> {
    let ids = table.ids();
    let Some(after) = after else {
        return ids;
    };
    let split = ids.partition_point(|id| *id <= after);
    let mut order = Vec::with_capacity(ids.len());
    order.extend_from_slice(&ids[split..]);
    order.extend_from_slice(&ids[..split]);
    order
}
