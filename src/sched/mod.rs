//! Scheduler subsystem.
//!
//! A uniprocessor priority scheduler in the shape of one state machine:
//! every list the subsystem owns (ready queue, sleep queue, thread table,
//! lock and semaphore records) lives inside [`Scheduler`], and every
//! method documents the interrupt level it requires. The object never
//! switches contexts itself; it hands out [`ScheduleDecision`] values
//! that the caller executes after releasing its lock, so no lock is ever
//! held across a context switch.
//!
//! ## Module organization
//!
//! - `types`: constants, `ThreadBlock`, bootstrap stack frames
//! - `table`: the thread table (slot arena, tid allocation)
//! - `queue`: priority-ordered and wake-time-ordered queues
//! - `core`: scheduling decisions, the scheduler tail, the timer tick
//! - `lifecycle`: create / block / unblock / yield / exit / sleep
//! - `donation`: effective priority and donation through held locks
//! - `mlfqs`: nice / recent_cpu / load_avg recomputation
//! - `stats`: tick accounting and consistency checks

pub mod core;
pub mod donation;
pub mod lifecycle;
pub mod mlfqs;
pub mod queue;
pub mod stats;
pub mod synch;
pub mod table;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::core::ScheduleDecision;
pub use self::stats::Stats;
pub use self::types::{
    SchedMode, ThreadBlock, ThreadFunc, ThreadStatus, Tid, DONATION_DEPTH, MAX_THREADS, PG_SIZE,
    PRI_DEFAULT, PRI_MAX, PRI_MIN, THREAD_MAGIC, TIMER_FREQ, TIME_SLICE,
};

use crate::fixed::Real;
use crate::platform::{InterruptControl, IntrLevel, Platform};

use self::queue::{PriorityQueue, SleepQueue};
use self::synch::{LockRecord, SemaRecord};
use self::table::ThreadTable;

use alloc::vec::Vec;

/// The scheduler state machine.
///
/// All methods that mutate state require interrupts to be disabled; the
/// ones that also require task context say so. The embedding layer (the
/// [`crate::thread`] facade) enforces both around every call.
pub struct Scheduler {
    platform: &'static dyn Platform,
    mode: SchedMode,
    table: ThreadTable,
    ready: PriorityQueue,
    sleeping: SleepQueue,
    locks: Vec<Option<LockRecord>>,
    semaphores: Vec<Option<SemaRecord>>,
    current: Tid,
    idle: Option<Tid>,
    initial: Tid,
    /// Ticks the current thread has run in its present slice.
    slice_ticks: u32,
    load_avg: Real,
    stats: Stats,
}

impl Scheduler {
    /// Adopt the running boot thread as the first thread ("main") and set
    /// up empty queues. Interrupts must be disabled.
    pub fn new(platform: &'static dyn Platform, mode: SchedMode) -> Scheduler {
        assert!(
            platform.level() == IntrLevel::Off,
            "scheduler set up with interrupts enabled"
        );

        let mut table = ThreadTable::new();
        let initial = table
            .allocate("main", types::PRI_DEFAULT)
            .expect("empty thread table rejected the boot thread");
        table.get_mut(initial).status = ThreadStatus::Running;

        Scheduler {
            platform,
            mode,
            table,
            ready: PriorityQueue::new(),
            sleeping: SleepQueue::new(),
            locks: Vec::new(),
            semaphores: Vec::new(),
            current: initial,
            idle: None,
            initial,
            slice_ticks: 0,
            load_avg: Real::ZERO,
            stats: Stats::new(),
        }
    }

    pub fn mode(&self) -> SchedMode {
        self.mode
    }

    /// Handle of the running thread. Validates the record canary and, for
    /// threads with an allocated stack, the canary at the stack base.
    pub fn current(&self) -> Tid {
        let block = self.table.get(self.current);
        if let Some(page) = &block.stack {
            assert!(page.canary_intact(), "thread {} overflowed its stack", block.tid);
        }
        block.tid
    }

    pub fn current_name(&self) -> &str {
        self.table.get(self.current).name_str()
    }

    pub fn initial_tid(&self) -> Tid {
        self.initial
    }

    pub fn idle_tid(&self) -> Option<Tid> {
        self.idle
    }

    /// Read-only view of a live thread.
    pub fn thread(&self, tid: Tid) -> &ThreadBlock {
        self.table.get(tid)
    }

    pub fn is_alive(&self, tid: Tid) -> bool {
        self.table.contains(tid)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Ready queue front-to-back, for diagnostics.
    pub fn ready_snapshot(&self) -> Vec<Tid> {
        self.ready.iter().map(|(tid, _)| tid).collect()
    }

    /// Sleep queue front-to-back with wake times, for diagnostics.
    pub fn sleeping_snapshot(&self) -> Vec<(Tid, u64)> {
        self.sleeping.iter().collect()
    }

    pub(crate) fn platform(&self) -> &'static dyn Platform {
        self.platform
    }
}
