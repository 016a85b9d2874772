//! Core scheduling: picking the next thread, the switch tail, the tick.
//!
//! The scheduler computes a [`ScheduleDecision`] with its state borrowed
//! and lets the caller execute the switch afterwards. The caller then
//! reports back through [`Scheduler::schedule_tail`], which runs on the
//! incoming thread's stack with interrupts still disabled — the same
//! place a brand-new thread starts, via the switch entry shim.

use crate::platform::{AddressSpace, InterruptControl, IntrLevel, PageAllocator, SwitchJob};

use super::types::{SchedMode, ThreadStatus, Tid, MLFQS_PRIORITY_TICKS, TIMER_FREQ, TIME_SLICE};
use super::Scheduler;

/// Outcome of a scheduling pass.
pub enum ScheduleDecision {
    /// The previously running thread keeps the CPU; no switch is needed.
    Keep,
    /// Execute a context switch. The caller must drop any lock guarding
    /// the scheduler first, run the platform switch primitive, then call
    /// [`Scheduler::schedule_tail`] with the primitive's return value.
    Switch(SwitchJob),
}

impl Scheduler {
    /// Thread to run next: the ready-queue front, or the idle thread when
    /// nothing is ready.
    pub(crate) fn next_to_run(&mut self) -> Tid {
        match self.ready.pop_front() {
            Some(tid) => tid,
            None => self.idle.expect("ready queue drained before start()"),
        }
    }

    /// Pick the next thread and hand the switch to the caller.
    ///
    /// Interrupts must be disabled and the current thread must already
    /// have left the Running state (Ready, Blocked or Dying).
    pub fn prepare_schedule(&mut self) -> ScheduleDecision {
        assert!(
            self.platform.level() == IntrLevel::Off,
            "schedule with interrupts enabled"
        );
        let prev = self.current;
        assert!(
            self.table.get(prev).status != ThreadStatus::Running,
            "schedule entered by a thread still marked running"
        );

        let next = self.next_to_run();
        self.current = next;

        if next == prev {
            return ScheduleDecision::Keep;
        }

        self.stats.context_switches += 1;
        let next_stack_ptr = self.table.get(next).stack_ptr;
        let prev_stack_slot = &mut self.table.get_mut(prev).stack_ptr as *mut usize;
        ScheduleDecision::Switch(SwitchJob {
            prev,
            next,
            prev_stack_slot,
            next_stack_ptr,
        })
    }

    /// Complete a switch on the incoming thread's stack.
    ///
    /// Marks the new thread running, starts a fresh time slice, activates
    /// its address space, and reaps `prev` if it was dying: its table slot
    /// is released and its stack page goes back to the allocator. The
    /// initial thread's storage is the boot stack and is never freed.
    /// Interrupts must be disabled.
    pub fn schedule_tail(&mut self, prev: Option<Tid>) {
        assert!(
            self.platform.level() == IntrLevel::Off,
            "schedule tail with interrupts enabled"
        );

        let cur = self.current;
        self.table.get_mut(cur).status = ThreadStatus::Running;
        self.slice_ticks = 0;
        self.platform.activate(cur);

        if let Some(prev) = prev {
            if prev != cur
                && prev != self.initial
                && self.table.contains(prev)
                && self.table.get(prev).status == ThreadStatus::Dying
            {
                let block = self.table.remove(prev);
                if let Some(page) = block.stack {
                    // The dying thread is off the CPU now, so its stack is
                    // no longer in use by anyone.
                    unsafe { self.platform.free_page(page.base()) };
                }
            }
        }
    }

    /// Timer tick bookkeeping. Runs in interrupt context; the only
    /// scheduling actions taken here are unblocking due sleepers and
    /// requesting preempt-on-return.
    pub fn tick(&mut self, now: u64) {
        assert!(
            self.platform.in_interrupt(),
            "timer tick outside interrupt context"
        );

        // 1. Account the tick to idle, user or kernel time.
        let cur = self.current;
        if Some(cur) == self.idle {
            self.stats.idle_ticks += 1;
        } else if self.table.get(cur).is_user {
            self.stats.user_ticks += 1;
        } else {
            self.stats.kernel_ticks += 1;
        }

        // 2. Wake sleepers that are due. The queue is wake-time ordered,
        // so the walk ends at the first thread still in the future.
        let mut woke = false;
        while let Some(tid) = self.sleeping.pop_due(now) {
            self.table.get_mut(tid).wake_time = 0;
            self.unblock(tid);
            woke = true;
        }

        // 3. Slice accounting.
        self.slice_ticks += 1;
        if self.slice_ticks >= TIME_SLICE {
            self.stats.preempt_requests += 1;
            self.platform.yield_on_return();
        }

        // 4. MLFQS statistics.
        let mut recomputed = false;
        if self.mode == SchedMode::Mlfqs {
            if Some(cur) != self.idle {
                let t = self.table.get_mut(cur);
                t.recent_cpu = t.recent_cpu.add_int(1);
            }
            if now % MLFQS_PRIORITY_TICKS == 0 {
                self.update_priority_all();
                recomputed = true;
            }
            if now % TIMER_FREQ == 0 {
                self.update_load_avg_and_recent_cpu();
                recomputed = true;
            }
        }

        // A woken or re-prioritized thread may now outrank the current
        // one; request a yield at interrupt return.
        if (woke || recomputed) && self.ready_front_outranks_current() {
            self.platform.yield_on_return();
        }
    }

    /// True when the ready-queue front has strictly higher effective
    /// priority than the running thread.
    pub fn ready_front_outranks_current(&self) -> bool {
        match self.ready.max_priority() {
            Some(p) => p > self.table.get(self.current).effective_priority,
            None => false,
        }
    }
}
