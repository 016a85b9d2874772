//! MLFQS statistics: nice, recent_cpu and load_avg.
//!
//! The 4.4BSD recipe in 17.14 fixed point:
//!
//! ```text
//! priority   = PRI_MAX - recent_cpu / 4 - 2 * nice        (every 4 ticks)
//! load_avg   = (59/60) * load_avg + (1/60) * ready        (every second)
//! recent_cpu = (2*load_avg) / (2*load_avg + 1) * recent_cpu + nice
//! ```
//!
//! `recent_cpu` of the running thread also grows by one every tick. The
//! cadence lives in [`super::core`]'s tick handler; this module is the
//! arithmetic and the bulk updates.

use alloc::vec::Vec;

use crate::fixed::Real;

use super::types::{SchedMode, ThreadStatus, Tid, NICE_MAX, NICE_MIN, PRI_MAX, PRI_MIN};
use super::Scheduler;

impl Scheduler {
    /// Recompute one thread's priority fields from its statistics. The
    /// ready queue is not touched; callers requeue or resort.
    fn mlfqs_recompute(&mut self, tid: Tid) -> i32 {
        let t = self.table.get(tid);
        let priority = PRI_MAX - t.recent_cpu.div_int(4).to_int_nearest() - 2 * t.nice;
        let priority = priority.clamp(PRI_MIN, PRI_MAX);

        let t = self.table.get_mut(tid);
        t.base_priority = priority;
        t.effective_priority = priority;
        priority
    }

    /// Recompute one thread's priority and fix its queue position.
    pub(crate) fn refresh_mlfqs_priority(&mut self, tid: Tid) {
        let priority = self.mlfqs_recompute(tid);
        if self.table.get(tid).status == ThreadStatus::Ready && Some(tid) != self.idle {
            self.ready.reposition(tid, priority);
        }
    }

    /// Recompute every thread's priority and re-sort the ready queue,
    /// keeping FIFO order inside each band. Runs every fourth tick.
    pub(crate) fn update_priority_all(&mut self) {
        let tids: Vec<Tid> = self.table.iter().map(|t| t.tid).collect();
        for tid in tids {
            self.mlfqs_recompute(tid);
        }
        let table = &self.table;
        self.ready.resort(|tid| table.get(tid).effective_priority);
    }

    /// The once-per-second recomputation: fold the ready-thread count
    /// into `load_avg`, decay every thread's `recent_cpu`, and refresh
    /// all priorities.
    pub(crate) fn update_load_avg_and_recent_cpu(&mut self) {
        let ready_threads = self.ready_thread_count() as i32;
        self.load_avg = Real::from_ratio(59, 60)
            .mul(self.load_avg)
            .add(Real::from_ratio(1, 60).mul(Real::from_int(ready_threads)));

        let twice_load = self.load_avg.mul_int(2);
        let decay = twice_load.div(twice_load.add_int(1));

        let tids: Vec<Tid> = self.table.iter().map(|t| t.tid).collect();
        for tid in tids {
            let t = self.table.get_mut(tid);
            t.recent_cpu = decay.mul(t.recent_cpu).add_int(t.nice);
            self.mlfqs_recompute(tid);
        }
        let table = &self.table;
        self.ready.resort(|tid| table.get(tid).effective_priority);
    }

    /// Threads that want the CPU right now: the ready queue plus the
    /// running thread unless it is idle.
    pub fn ready_thread_count(&self) -> usize {
        let running = if Some(self.current) == self.idle { 0 } else { 1 };
        self.ready.len() + running
    }

    /// Set the current thread's nice value (clamped to [-20, 20]) and
    /// recompute its priority. Returns true when the caller should yield
    /// because a ready thread now outranks it. Outside MLFQS the value is
    /// recorded but priorities stay as assigned.
    pub fn set_nice(&mut self, nice: i32) -> bool {
        let nice = nice.clamp(NICE_MIN, NICE_MAX);
        let cur = self.current;
        self.table.get_mut(cur).nice = nice;
        if self.mode != SchedMode::Mlfqs {
            return false;
        }
        self.refresh_mlfqs_priority(cur);
        self.ready_front_outranks_current()
    }

    pub fn get_nice(&self) -> i32 {
        self.table.get(self.current).nice
    }

    /// 100 times the system load average, rounded to nearest.
    pub fn get_load_avg(&self) -> i32 {
        self.load_avg.mul_int(100).to_int_nearest()
    }

    /// 100 times the current thread's recent_cpu, rounded to nearest.
    pub fn get_recent_cpu(&self) -> i32 {
        self.table
            .get(self.current)
            .recent_cpu
            .mul_int(100)
            .to_int_nearest()
    }
}
