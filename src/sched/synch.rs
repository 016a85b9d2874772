//! Lock and semaphore records.
//!
//! The blocking primitives themselves live in [`crate::sync`]; what sits
//! here is their state and the scheduler-side operations they are built
//! from: ordered waiter queues, the `max_waiter_priority` cache feeding
//! donation, and direct handoff of a released lock to its best waiter.
//!
//! Waiter queues are kept priority-ordered at insert time, but a waiter's
//! effective priority can change while it sleeps (donation from another
//! chain, an MLFQS recomputation). The queues are therefore re-ranked
//! from the thread table at every release, so the woken thread is always
//! the best waiter at that moment, FIFO among equals.

use crate::platform::InterruptControl;

use super::queue::PriorityQueue;
use super::types::{LockId, SchedMode, SemaId, ThreadStatus, Tid, PRI_MIN};
use super::Scheduler;

/// Donation-aware lock state.
pub struct LockRecord {
    pub holder: Option<Tid>,
    pub waiters: PriorityQueue,
    /// Best effective priority among `waiters`; [`PRI_MIN`] when empty.
    /// This is what the holder's effective priority is computed from.
    pub max_waiter_priority: i32,
}

/// Counting semaphore state.
pub struct SemaRecord {
    pub value: u32,
    pub waiters: PriorityQueue,
}

impl Scheduler {
    pub(crate) fn lock(&self, id: LockId) -> &LockRecord {
        self.locks
            .get(id)
            .and_then(|slot| slot.as_ref())
            .expect("unknown lock")
    }

    pub(crate) fn lock_mut(&mut self, id: LockId) -> &mut LockRecord {
        self.locks
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .expect("unknown lock")
    }

    fn sema(&self, id: SemaId) -> &SemaRecord {
        self.semaphores
            .get(id)
            .and_then(|slot| slot.as_ref())
            .expect("unknown semaphore")
    }

    fn sema_mut(&mut self, id: SemaId) -> &mut SemaRecord {
        self.semaphores
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .expect("unknown semaphore")
    }

    /// Register a lock record. Interrupts must be disabled.
    pub fn lock_create(&mut self) -> LockId {
        let record = LockRecord {
            holder: None,
            waiters: PriorityQueue::new(),
            max_waiter_priority: PRI_MIN,
        };
        if let Some(id) = self.locks.iter().position(|slot| slot.is_none()) {
            self.locks[id] = Some(record);
            id
        } else {
            self.locks.push(Some(record));
            self.locks.len() - 1
        }
    }

    /// Drop a lock record. It must be idle: no holder, no waiters.
    pub fn lock_free(&mut self, id: LockId) {
        let lock = self.lock(id);
        assert!(lock.holder.is_none(), "lock freed while held");
        assert!(lock.waiters.is_empty(), "lock freed with waiters");
        self.locks[id] = None;
    }

    /// Try to take a lock for the current thread.
    ///
    /// Uncontended: records ownership and returns true. Contended: queues
    /// the current thread as a waiter, donates down the holder chain,
    /// marks the thread blocked and returns false — the caller must then
    /// schedule, and owns the lock once it runs again. Task context only;
    /// interrupts must be disabled.
    pub fn lock_acquire_prepare(&mut self, id: LockId) -> bool {
        assert!(
            !self.platform.in_interrupt(),
            "lock acquire from interrupt context"
        );
        let cur = self.current;

        match self.lock(id).holder {
            None => {
                self.lock_mut(id).holder = Some(cur);
                self.table.get_mut(cur).owned_locks.push(id);
                true
            }
            Some(holder) => {
                assert!(holder != cur, "lock reacquired by its holder");
                let effective = self.table.get(cur).effective_priority;
                self.table.get_mut(cur).waiting_on = Some(id);
                {
                    let lock = self.lock_mut(id);
                    lock.waiters.insert(cur, effective);
                    if effective > lock.max_waiter_priority {
                        lock.max_waiter_priority = effective;
                    }
                }
                if self.mode == SchedMode::RoundRobin {
                    self.donate_chain(id);
                }
                self.table.get_mut(cur).status = ThreadStatus::Blocked;
                false
            }
        }
    }

    /// Release a lock held by the current thread.
    ///
    /// Recomputes the releaser's effective priority (the donation leaves
    /// with the lock) and hands the lock directly to the best waiter,
    /// which is unblocked. Returns the woken waiter so the caller can
    /// yield to it if it outranks the releaser. Interrupts must be
    /// disabled.
    pub fn lock_release(&mut self, id: LockId) -> Option<Tid> {
        let cur = self.current;
        assert!(
            self.lock(id).holder == Some(cur),
            "lock released by a thread that does not hold it"
        );

        self.table.get_mut(cur).owned_locks.retain(|&l| l != id);
        self.lock_mut(id).holder = None;

        // Re-rank the waiters against the table before picking one.
        let mut waiters =
            core::mem::replace(&mut self.lock_mut(id).waiters, PriorityQueue::new());
        waiters.resort(|tid| self.table.get(tid).effective_priority);
        let woken = waiters.pop_front();
        let max_waiter = waiters.max_priority().unwrap_or(PRI_MIN);
        {
            let lock = self.lock_mut(id);
            lock.waiters = waiters;
            lock.max_waiter_priority = max_waiter;
        }

        if self.mode == SchedMode::RoundRobin {
            self.refresh_effective(cur);
        }

        if let Some(next_holder) = woken {
            self.table.get_mut(next_holder).waiting_on = None;
            self.table.get_mut(next_holder).owned_locks.push(id);
            self.lock_mut(id).holder = Some(next_holder);
            if self.mode == SchedMode::RoundRobin {
                // Residual waiters keep donating to the new holder.
                self.refresh_effective(next_holder);
            }
            self.unblock(next_holder);
        }

        woken
    }

    /// Register a semaphore record. Interrupts must be disabled.
    pub fn sema_create(&mut self, value: u32) -> SemaId {
        let record = SemaRecord {
            value,
            waiters: PriorityQueue::new(),
        };
        if let Some(id) = self.semaphores.iter().position(|slot| slot.is_none()) {
            self.semaphores[id] = Some(record);
            id
        } else {
            self.semaphores.push(Some(record));
            self.semaphores.len() - 1
        }
    }

    /// Drop an idle semaphore record.
    pub fn sema_free(&mut self, id: SemaId) {
        assert!(
            self.sema(id).waiters.is_empty(),
            "semaphore freed with waiters"
        );
        self.semaphores[id] = None;
    }

    /// Try to decrement a semaphore for the current thread. Returns false
    /// after queueing and blocking the thread; the caller must schedule,
    /// and holds the decrement once it runs again. Task context only;
    /// interrupts must be disabled.
    pub fn sema_down_prepare(&mut self, id: SemaId) -> bool {
        assert!(
            !self.platform.in_interrupt(),
            "semaphore down from interrupt context"
        );
        let cur = self.current;

        if self.sema(id).value > 0 {
            self.sema_mut(id).value -= 1;
            true
        } else {
            let effective = self.table.get(cur).effective_priority;
            self.sema_mut(id).waiters.insert(cur, effective);
            self.table.get_mut(cur).status = ThreadStatus::Blocked;
            false
        }
    }

    /// Increment a semaphore, waking its best waiter if any. The waiter
    /// takes the increment directly, so a sleeping thread cannot lose its
    /// turn to a later `down`. Safe from interrupt context; interrupts
    /// must be disabled. Returns the woken thread.
    pub fn sema_up(&mut self, id: SemaId) -> Option<Tid> {
        let mut waiters =
            core::mem::replace(&mut self.sema_mut(id).waiters, PriorityQueue::new());
        waiters.resort(|tid| self.table.get(tid).effective_priority);
        let woken = waiters.pop_front();
        self.sema_mut(id).waiters = waiters;

        match woken {
            Some(tid) => {
                self.unblock(tid);
                Some(tid)
            }
            None => {
                self.sema_mut(id).value += 1;
                None
            }
        }
    }

    /// Current semaphore value, for diagnostics.
    pub fn sema_value(&self, id: SemaId) -> u32 {
        self.sema(id).value
    }
}
