//! Blocking synchronization primitives built on the thread subsystem.
//!
//! [`Semaphore`] and [`Lock`] park their callers with the scheduler's
//! block/unblock operations; waiters wake in effective-priority order,
//! FIFO among equals. `Lock` additionally feeds the priority-donation
//! machinery: while a high-priority thread waits, the holder runs at the
//! waiter's priority, transitively through chains of held locks.
//!
//! These are sleeping primitives for task context. Interrupt handlers may
//! only use [`Semaphore::up`].

use crate::platform::InterruptControl;
use crate::sched::types::{LockId, SemaId, Tid};
use crate::thread::{self, platform, reschedule, with_sched};

/// Counting semaphore.
pub struct Semaphore {
    id: SemaId,
}

impl Semaphore {
    pub fn new(value: u32) -> Semaphore {
        let plat = platform();
        let old = plat.disable();
        let id = with_sched(|s| s.sema_create(value));
        plat.set_level(old);
        Semaphore { id }
    }

    /// Decrement the value, sleeping until an `up` hands one over.
    pub fn down(&self) {
        let plat = platform();
        assert!(
            !plat.in_interrupt(),
            "semaphore down from interrupt context"
        );
        let old = plat.disable();
        let acquired = with_sched(|s| s.sema_down_prepare(self.id));
        if !acquired {
            // Parked as a waiter; when the switch comes back we own the
            // decrement (ups hand their increment to a waiter directly).
            reschedule();
        }
        plat.set_level(old);
    }

    /// Increment the value or wake the best waiter. Safe from interrupt
    /// context, where the conditional yield becomes a no-op.
    pub fn up(&self) {
        let plat = platform();
        let old = plat.disable();
        let woken = with_sched(|s| s.sema_up(self.id));
        plat.set_level(old);
        if woken.is_some() {
            thread::try_yield();
        }
    }

    /// Release the record. The semaphore must have no waiters.
    pub fn free(self) {
        let plat = platform();
        let old = plat.disable();
        with_sched(|s| s.sema_free(self.id));
        plat.set_level(old);
    }
}

/// Mutual-exclusion lock with priority donation.
pub struct Lock {
    id: LockId,
}

impl Lock {
    pub fn new() -> Lock {
        let plat = platform();
        let old = plat.disable();
        let id = with_sched(|s| s.lock_create());
        plat.set_level(old);
        Lock { id }
    }

    /// Acquire the lock, sleeping while another thread holds it and
    /// donating this thread's priority down the holder chain meanwhile.
    pub fn acquire(&self) {
        let plat = platform();
        assert!(!plat.in_interrupt(), "lock acquire from interrupt context");
        let old = plat.disable();
        let acquired = with_sched(|s| s.lock_acquire_prepare(self.id));
        if !acquired {
            // Parked as a waiter; the release hands the lock over before
            // waking us, so ownership holds once we run again.
            reschedule();
        }
        plat.set_level(old);
    }

    /// Release the lock, shedding any donation that came with it, and
    /// yield if the woken waiter outranks this thread.
    pub fn release(&self) {
        let plat = platform();
        let old = plat.disable();
        let woken = with_sched(|s| s.lock_release(self.id));
        plat.set_level(old);
        if woken.is_some() {
            thread::try_yield();
        }
    }

    pub fn held_by_current(&self) -> bool {
        with_sched(|s| s.lock(self.id).holder == Some(s.current()))
    }

    pub fn holder(&self) -> Option<Tid> {
        with_sched(|s| s.lock(self.id).holder)
    }

    /// Release the record. The lock must be idle.
    pub fn free(self) {
        let plat = platform();
        let old = plat.disable();
        with_sched(|s| s.lock_free(self.id));
        plat.set_level(old);
    }
}
