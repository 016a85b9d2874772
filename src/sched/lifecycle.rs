//! Thread lifecycle: creation, blocking, yielding, sleeping, exit.
//!
//! Every method here mutates scheduler state only; the context switch
//! that usually follows is driven by the caller through
//! [`super::core::ScheduleDecision`].

use core::ffi::c_void;

use crate::platform::{ContextSwitch, InterruptControl, IntrLevel, PageAllocator};

use super::types::{
    push_bootstrap_frames, SchedMode, StackPage, ThreadBlock, ThreadFunc, ThreadStatus, Tid,
    PRI_MIN,
};
use super::Scheduler;

impl Scheduler {
    /// Create a kernel thread and make it ready.
    ///
    /// Allocates the stack page, pushes the three bootstrap frames
    /// (kernel-thread trampoline, switch entry, switch-threads) and
    /// enqueues the thread. Under MLFQS the thread inherits the creator's
    /// `recent_cpu` and `nice` and gets a computed priority. On failure
    /// nothing is published. Interrupts must be disabled.
    ///
    /// The caller should yield afterwards if the new thread outranks it;
    /// the [`crate::thread`] facade does.
    pub fn create(
        &mut self,
        name: &str,
        priority: i32,
        function: ThreadFunc,
        aux: *mut c_void,
        kernel_entry: usize,
    ) -> Result<Tid, &'static str> {
        let tid = self.build_thread(name, priority, function, aux, kernel_entry)?;

        if self.mode == SchedMode::Mlfqs {
            let (recent_cpu, nice) = {
                let creator = self.table.get(self.current);
                (creator.recent_cpu, creator.nice)
            };
            let t = self.table.get_mut(tid);
            t.recent_cpu = recent_cpu;
            t.nice = nice;
            self.refresh_mlfqs_priority(tid);
        }

        self.unblock(tid);
        Ok(tid)
    }

    /// Register the idle thread. It never enters the ready queue;
    /// [`Scheduler::next_to_run`] returns it only when nothing is ready.
    pub fn start(
        &mut self,
        idle_fn: ThreadFunc,
        aux: *mut c_void,
        kernel_entry: usize,
    ) -> Result<Tid, &'static str> {
        assert!(self.idle.is_none(), "idle thread already registered");
        let tid = self.build_thread("idle", PRI_MIN, idle_fn, aux, kernel_entry)?;
        self.idle = Some(tid);
        Ok(tid)
    }

    fn build_thread(
        &mut self,
        name: &str,
        priority: i32,
        function: ThreadFunc,
        aux: *mut c_void,
        kernel_entry: usize,
    ) -> Result<Tid, &'static str> {
        assert!(
            self.platform.level() == IntrLevel::Off,
            "thread creation with interrupts enabled"
        );

        let base = self
            .platform
            .alloc_page()
            .ok_or("out of memory for thread stack")?;
        let tid = match self.table.allocate(name, priority) {
            Ok(tid) => tid,
            Err(err) => {
                // SAFETY: the page was just handed out and never published.
                unsafe { self.platform.free_page(base) };
                return Err(err);
            }
        };

        let page = StackPage::new(base);
        unsafe { page.write_canary() };
        let switch_entry = self.platform.switch_entry_addr();
        let stack_ptr =
            unsafe { push_bootstrap_frames(page.top(), function, aux, kernel_entry, switch_entry) };

        let t = self.table.get_mut(tid);
        t.stack = Some(page);
        t.stack_ptr = stack_ptr;
        Ok(tid)
    }

    /// Take the current thread off the CPU until somebody unblocks it.
    /// Task context only; interrupts must be disabled. The caller must
    /// schedule immediately afterwards.
    pub fn block_current(&mut self) {
        assert!(
            !self.platform.in_interrupt(),
            "block from interrupt context"
        );
        assert!(
            self.platform.level() == IntrLevel::Off,
            "block with interrupts enabled"
        );
        self.table.get_mut(self.current).status = ThreadStatus::Blocked;
    }

    /// Move a blocked thread into the ready queue at its priority slot.
    ///
    /// Does not preempt: a caller that disabled interrupts may unblock a
    /// thread and finish updating its own state atomically. Safe from
    /// interrupt context.
    pub fn unblock(&mut self, tid: Tid) {
        let t = self.table.get_mut(tid);
        assert!(
            t.status == ThreadStatus::Blocked,
            "unblock of thread {} which is not blocked",
            tid
        );
        t.status = ThreadStatus::Ready;
        let priority = t.effective_priority;
        self.ready.insert(tid, priority);
    }

    /// Put the current thread back into the ready queue (behind its
    /// priority equals) and mark it ready. The idle thread is never
    /// queued. Task context only; caller schedules afterwards.
    pub fn prepare_yield(&mut self) {
        assert!(
            !self.platform.in_interrupt(),
            "yield from interrupt context"
        );
        let cur = self.current;
        if Some(cur) != self.idle {
            let priority = self.table.get(cur).effective_priority;
            self.ready.insert(cur, priority);
        }
        self.table.get_mut(cur).status = ThreadStatus::Ready;
    }

    /// Mark the current thread dying. Its slot and stack survive until
    /// the successor's [`Scheduler::schedule_tail`] reaps them. Task
    /// context only; caller schedules afterwards and never returns here.
    pub fn prepare_exit(&mut self) {
        assert!(
            !self.platform.in_interrupt(),
            "exit from interrupt context"
        );
        let cur = self.current;
        assert!(
            Some(cur) != self.idle,
            "the idle thread cannot exit"
        );
        self.table.get_mut(cur).status = ThreadStatus::Dying;
    }

    /// Send the current thread to sleep until `now + ticks`. Interrupts
    /// must be disabled; caller schedules afterwards.
    pub fn sleep_current(&mut self, ticks: u64, now: u64) {
        let wake_time = now + ticks;
        let cur = self.current;
        self.table.get_mut(cur).wake_time = wake_time;
        self.sleeping.insert(cur, wake_time);
        self.block_current();
    }

    /// Run `f` over every live thread. Interrupts must be disabled.
    pub fn foreach(&mut self, mut f: impl FnMut(&mut ThreadBlock)) {
        assert!(
            self.platform.level() == IntrLevel::Off,
            "thread iteration with interrupts enabled"
        );
        for t in self.table.iter_mut() {
            if t.status != ThreadStatus::Dying {
                f(t);
            }
        }
    }

    /// Flag a thread as running user code; ticks then count as user time.
    pub fn set_user(&mut self, tid: Tid, is_user: bool) {
        self.table.get_mut(tid).is_user = is_user;
    }
}
