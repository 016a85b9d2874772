//! Test support: a recording mock platform and state-surgery helpers.
//!
//! The mock switch primitive returns immediately, so tests drive the
//! scheduler as a state machine: after a "switch" the test keeps running
//! but speaks as the thread the scheduler now considers current.

use core::ffi::c_void;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::Mutex;
use std::vec::Vec;

use crate::platform::{
    AddressSpace, ContextSwitch, InterruptControl, IntrLevel, PageAllocator, SwitchJob,
};

use super::core::ScheduleDecision;
use super::types::{SchedMode, ThreadStatus, Tid, PG_SIZE};
use super::Scheduler;

pub struct MockPlatform {
    interrupts_enabled: AtomicBool,
    in_irq: AtomicBool,
    yield_requested: AtomicBool,
    fail_next_alloc: AtomicBool,
    pages_out: AtomicUsize,
    pages_freed: AtomicUsize,
    switches: Mutex<Vec<(Tid, Tid)>>,
}

impl MockPlatform {
    pub fn new() -> MockPlatform {
        MockPlatform {
            // Boot convention: the scheduler comes up with interrupts off.
            interrupts_enabled: AtomicBool::new(false),
            in_irq: AtomicBool::new(false),
            yield_requested: AtomicBool::new(false),
            fail_next_alloc: AtomicBool::new(false),
            pages_out: AtomicUsize::new(0),
            pages_freed: AtomicUsize::new(0),
            switches: Mutex::new(Vec::new()),
        }
    }

    pub fn set_in_interrupt(&self, value: bool) {
        self.in_irq.store(value, Ordering::Relaxed);
    }

    pub fn take_yield_request(&self) -> bool {
        self.yield_requested.swap(false, Ordering::Relaxed)
    }

    pub fn fail_next_alloc(&self) {
        self.fail_next_alloc.store(true, Ordering::Relaxed);
    }

    pub fn pages_outstanding(&self) -> usize {
        self.pages_out.load(Ordering::Relaxed)
    }

    pub fn pages_freed(&self) -> usize {
        self.pages_freed.load(Ordering::Relaxed)
    }

    pub fn switch_log(&self) -> Vec<(Tid, Tid)> {
        self.switches.lock().unwrap().clone()
    }
}

impl InterruptControl for MockPlatform {
    fn disable(&self) -> IntrLevel {
        if self.interrupts_enabled.swap(false, Ordering::Relaxed) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn set_level(&self, level: IntrLevel) {
        self.interrupts_enabled
            .store(level == IntrLevel::On, Ordering::Relaxed);
    }

    fn level(&self) -> IntrLevel {
        if self.interrupts_enabled.load(Ordering::Relaxed) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn in_interrupt(&self) -> bool {
        self.in_irq.load(Ordering::Relaxed)
    }

    fn yield_on_return(&self) {
        self.yield_requested.store(true, Ordering::Relaxed);
    }

    fn wait_for_interrupt(&self) {}
}

impl PageAllocator for MockPlatform {
    fn alloc_page(&self) -> Option<NonNull<u8>> {
        if self.fail_next_alloc.swap(false, Ordering::Relaxed) {
            return None;
        }
        let layout = Layout::from_size_align(PG_SIZE, PG_SIZE).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        let page = NonNull::new(ptr)?;
        self.pages_out.fetch_add(1, Ordering::Relaxed);
        Some(page)
    }

    unsafe fn free_page(&self, page: NonNull<u8>) {
        let layout = Layout::from_size_align(PG_SIZE, PG_SIZE).unwrap();
        dealloc(page.as_ptr(), layout);
        self.pages_out.fetch_sub(1, Ordering::Relaxed);
        self.pages_freed.fetch_add(1, Ordering::Relaxed);
    }
}

impl ContextSwitch for MockPlatform {
    unsafe fn switch_threads(&self, job: SwitchJob) -> Tid {
        self.switches.lock().unwrap().push((job.prev, job.next));
        job.prev
    }

    fn switch_entry_addr(&self) -> usize {
        0x5343
    }
}

impl AddressSpace for MockPlatform {}

extern "C" fn noop_entry(_aux: *mut c_void) {}

/// Fresh scheduler over a leaked mock platform.
pub fn boot(mode: SchedMode) -> (Scheduler, &'static MockPlatform) {
    let plat: &'static MockPlatform = Box::leak(Box::new(MockPlatform::new()));
    (Scheduler::new(plat, mode), plat)
}

/// The facade's scheduling dance, inlined for tests: compute the decision,
/// run the (mock) switch, complete the tail.
pub fn reschedule(s: &mut Scheduler) {
    let decision = s.prepare_schedule();
    let prev = match decision {
        ScheduleDecision::Keep => None,
        ScheduleDecision::Switch(job) => Some(unsafe { s.platform().switch_threads(job) }),
    };
    s.schedule_tail(prev);
}

impl Scheduler {
    pub fn start_idle(&mut self) -> Tid {
        self.start(noop_entry, core::ptr::null_mut(), 0x10).unwrap()
    }

    pub fn spawn_for_test(&mut self, name: &str, priority: i32) -> Tid {
        self.create(name, priority, noop_entry, core::ptr::null_mut(), 0x20)
            .unwrap()
    }

    /// Force a ready thread onto the CPU, bypassing priority order. The
    /// displaced thread is re-queued as if it had yielded.
    pub fn run_thread_for_test(&mut self, tid: Tid) {
        if self.current == tid {
            return;
        }
        let prev = self.current;
        self.prepare_yield();
        assert!(self.ready.remove(tid), "thread {} is not ready", tid);
        assert_eq!(self.table.get(tid).status, ThreadStatus::Ready);
        self.current = tid;
        self.schedule_tail(Some(prev));
    }

    /// Park a ready thread in the sleep queue, as if it had slept itself.
    pub fn force_sleep_for_test(&mut self, tid: Tid, wake_time: u64) {
        assert!(self.ready.remove(tid), "thread {} is not ready", tid);
        let t = self.table.get_mut(tid);
        t.status = ThreadStatus::Blocked;
        t.wake_time = wake_time;
        self.sleeping.insert(tid, wake_time);
    }

    pub fn thread_mut_for_test(&mut self, tid: Tid) -> &mut super::types::ThreadBlock {
        self.table.get_mut(tid)
    }
}
