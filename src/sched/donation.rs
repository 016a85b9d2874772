//! Effective priority and donation through held locks.
//!
//! A thread's effective priority is the maximum of its own base priority
//! and the best waiter priority cached on each lock it holds. When a
//! thread blocks on a lock whose holder ranks below it, the donation walk
//! raises the holder — and, when the holder is itself waiting, continues
//! down the chain up to [`DONATION_DEPTH`] links. Everything here runs
//! with interrupts disabled.

use super::types::{SchedMode, ThreadStatus, Tid, DONATION_DEPTH, PRI_MAX, PRI_MIN};
use super::Scheduler;

impl Scheduler {
    /// Recompute a thread's effective priority from its base priority and
    /// the waiters of the locks it holds, and requeue it if it is on the
    /// ready queue. Raises and lowers alike.
    pub fn refresh_effective(&mut self, tid: Tid) {
        let t = self.table.get(tid);
        let mut effective = t.base_priority;
        for &lid in &t.owned_locks {
            let cached = self.lock(lid).max_waiter_priority;
            if cached > effective {
                effective = cached;
            }
        }

        let t = self.table.get_mut(tid);
        if t.effective_priority == effective {
            return;
        }
        t.effective_priority = effective;
        if t.status == ThreadStatus::Ready && Some(tid) != self.idle {
            self.ready.reposition(tid, effective);
        }
    }

    /// Donation hook for external synchronization layers: recompute and
    /// requeue after a lock's waiter set changed.
    pub fn donate_priority(&mut self, to: Tid) {
        self.refresh_effective(to);
    }

    /// Walk the chain of holders starting at `lock`, refreshing each
    /// holder and carrying raised priorities into the next lock's waiter
    /// queue. Chains longer than [`DONATION_DEPTH`] keep what was donated
    /// so far; the walk just stops.
    pub(crate) fn donate_chain(&mut self, lock: super::types::LockId) {
        let mut lid = lock;
        for _ in 0..DONATION_DEPTH {
            let Some(holder) = self.lock(lid).holder else {
                break;
            };
            self.refresh_effective(holder);

            let Some(next) = self.table.get(holder).waiting_on else {
                break;
            };
            let effective = self.table.get(holder).effective_priority;
            let l = self.lock_mut(next);
            l.waiters.reposition(holder, effective);
            if effective > l.max_waiter_priority {
                l.max_waiter_priority = effective;
            }
            lid = next;
        }
    }

    /// Set the current thread's base priority.
    ///
    /// The effective priority only drops if no donation holds it up.
    /// Returns true when the caller should yield because a ready thread
    /// now outranks it. Ignored under MLFQS, where priorities are
    /// computed.
    pub fn set_priority(&mut self, new_priority: i32) -> bool {
        if self.mode == SchedMode::Mlfqs {
            return false;
        }
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&new_priority),
            "priority {} out of range",
            new_priority
        );

        let cur = self.current;
        self.table.get_mut(cur).base_priority = new_priority;
        self.refresh_effective(cur);
        self.ready_front_outranks_current()
    }

    /// The current thread's effective priority — after donation, or as
    /// computed by MLFQS.
    pub fn get_priority(&self) -> i32 {
        self.table.get(self.current).effective_priority
    }
}
