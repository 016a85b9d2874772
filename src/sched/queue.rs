//! Ordered thread queues.
//!
//! [`PriorityQueue`] keeps handles sorted by descending effective
//! priority with FIFO order inside a priority band; it backs both the
//! ready list and every lock/semaphore waiter list. [`SleepQueue`] keeps
//! sleeping threads sorted by ascending wake time.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::types::Tid;

/// Priority-ordered FIFO of thread handles.
pub struct PriorityQueue {
    entries: VecDeque<(Tid, i32)>,
}

impl PriorityQueue {
    pub fn new() -> PriorityQueue {
        PriorityQueue {
            entries: VecDeque::new(),
        }
    }

    /// Insert behind every entry of equal or higher priority.
    pub fn insert(&mut self, tid: Tid, priority: i32) {
        let pos = self
            .entries
            .iter()
            .position(|&(_, p)| p < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, (tid, priority));
    }

    /// Pop the highest-priority entry; the oldest one among equals.
    pub fn pop_front(&mut self) -> Option<Tid> {
        self.entries.pop_front().map(|(tid, _)| tid)
    }

    pub fn front(&self) -> Option<(Tid, i32)> {
        self.entries.front().copied()
    }

    pub fn remove(&mut self, tid: Tid) -> bool {
        if let Some(pos) = self.entries.iter().position(|&(t, _)| t == tid) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.entries.iter().any(|&(t, _)| t == tid)
    }

    /// Move an entry to the position its new priority demands. The entry
    /// lands behind its new equals, like a fresh insertion.
    pub fn reposition(&mut self, tid: Tid, priority: i32) {
        if self.remove(tid) {
            self.insert(tid, priority);
        }
    }

    /// Re-sort the whole queue after a bulk priority change. The sort is
    /// stable, so FIFO order inside each band survives.
    pub fn resort(&mut self, mut priority_of: impl FnMut(Tid) -> i32) {
        let mut entries: Vec<(Tid, i32)> = self
            .entries
            .drain(..)
            .map(|(tid, _)| (tid, priority_of(tid)))
            .collect();
        entries.sort_by_key(|&(_, p)| core::cmp::Reverse(p));
        self.entries = entries.into();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest priority present, if any.
    pub fn max_priority(&self) -> Option<i32> {
        self.front().map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tid, i32)> + '_ {
        self.entries.iter().copied()
    }
}

/// Wake-time-ordered FIFO of sleeping threads.
pub struct SleepQueue {
    entries: VecDeque<(Tid, u64)>,
}

impl SleepQueue {
    pub fn new() -> SleepQueue {
        SleepQueue {
            entries: VecDeque::new(),
        }
    }

    /// Insert behind every entry with an equal or earlier wake time, so
    /// equal wake times release in insertion order.
    pub fn insert(&mut self, tid: Tid, wake_time: u64) {
        let pos = self
            .entries
            .iter()
            .position(|&(_, w)| w > wake_time)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, (tid, wake_time));
    }

    /// Pop the front entry if it is due at `now`. The queue is ordered, so
    /// the caller may stop at the first `None`.
    pub fn pop_due(&mut self, now: u64) -> Option<Tid> {
        match self.entries.front() {
            Some(&(_, wake)) if wake <= now => self.entries.pop_front().map(|(tid, _)| tid),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tid, u64)> + '_ {
        self.entries.iter().copied()
    }
}
