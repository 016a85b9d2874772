//! Tick accounting and consistency diagnostics.

use super::types::{SchedMode, ThreadStatus, PRI_MAX, PRI_MIN};
use super::Scheduler;

/// Counters maintained by the timer tick and the scheduler core.
#[derive(Clone, Copy, Debug)]
pub struct Stats {
    pub idle_ticks: u64,
    pub kernel_ticks: u64,
    pub user_ticks: u64,
    pub context_switches: u64,
    /// Preempt-on-return requests issued because a slice expired.
    pub preempt_requests: u64,
}

impl Stats {
    pub const fn new() -> Stats {
        Stats {
            idle_ticks: 0,
            kernel_ticks: 0,
            user_ticks: 0,
            context_switches: 0,
            preempt_requests: 0,
        }
    }
}

impl Scheduler {
    /// Log the tick breakdown.
    pub fn print_stats(&self) {
        let stats = self.stats();
        crate::kinfo!(
            "Thread: {} idle ticks, {} kernel ticks, {} user ticks, {} switches",
            stats.idle_ticks,
            stats.kernel_ticks,
            stats.user_ticks,
            stats.context_switches
        );
    }

    /// Full consistency scan. Cheap enough for tests and debug builds,
    /// too slow for the tick path.
    pub fn check_invariants(&self) {
        // Exactly one running thread, and it is `current`.
        for t in self.table.iter() {
            if t.tid == self.current {
                assert_eq!(t.status, ThreadStatus::Running, "current thread not running");
            } else {
                assert_ne!(t.status, ThreadStatus::Running, "second running thread {}", t.tid);
            }
        }

        // Ready queue: descending priorities, entries match the table.
        let mut last = i32::MAX;
        for (tid, queued_priority) in self.ready.iter() {
            let t = self.table.get(tid);
            assert_eq!(t.status, ThreadStatus::Ready, "non-ready thread {} queued", tid);
            assert_eq!(
                t.effective_priority, queued_priority,
                "stale queued priority for thread {}",
                tid
            );
            assert!(queued_priority <= last, "ready queue out of order");
            last = queued_priority;
        }
        for t in self.table.iter() {
            // The idle thread is never queued, whatever its status says.
            if t.status == ThreadStatus::Ready && Some(t.tid) != self.idle {
                assert!(self.ready.contains(t.tid), "ready thread {} not queued", t.tid);
            }
        }

        // Sleep queue: ascending wake times, blocked sleepers only.
        let mut last_wake = 0;
        for (tid, wake) in self.sleeping.iter() {
            let t = self.table.get(tid);
            assert_eq!(t.status, ThreadStatus::Blocked, "sleeping thread {} not blocked", tid);
            assert_eq!(t.wake_time, wake, "stale wake time for thread {}", tid);
            assert!(wake >= last_wake, "sleep queue out of order");
            last_wake = wake;
        }
        for t in self.table.iter() {
            if t.wake_time > 0 && t.status == ThreadStatus::Blocked {
                assert!(
                    self.sleeping.iter().any(|(tid, _)| tid == t.tid),
                    "sleeper {} missing from sleep queue",
                    t.tid
                );
            }
        }

        // Priority bounds, and the donation equation outside MLFQS.
        for t in self.table.iter() {
            assert!((PRI_MIN..=PRI_MAX).contains(&t.effective_priority));
            assert!(t.effective_priority >= t.base_priority);
            if self.mode == SchedMode::RoundRobin {
                let mut expected = t.base_priority;
                for &lid in &t.owned_locks {
                    let lock = self.lock(lid);
                    if lock.max_waiter_priority > expected {
                        expected = lock.max_waiter_priority;
                    }
                }
                assert_eq!(
                    t.effective_priority, expected,
                    "donation equation violated for thread {}",
                    t.tid
                );
            }
        }
    }
}
