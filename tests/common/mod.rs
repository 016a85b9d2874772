//! Shared scaffolding for the scenario tests: a recording platform and
//! the facade's scheduling dance over a test-owned scheduler.
//!
//! The switch primitive returns immediately, so a test walks the system
//! as a state machine: after each switch it continues in the role of
//! whichever thread the scheduler now considers current.

use core::ffi::c_void;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::Mutex;

use corten_kthread::platform::{
    AddressSpace, ContextSwitch, InterruptControl, IntrLevel, PageAllocator, SwitchJob,
};
use corten_kthread::sched::types::{LockId, SchedMode, SemaId, Tid, PG_SIZE};
use corten_kthread::sched::{ScheduleDecision, Scheduler};

pub struct TestPlatform {
    interrupts_enabled: AtomicBool,
    in_irq: AtomicBool,
    yield_requested: AtomicBool,
    pages_out: AtomicUsize,
    switches: Mutex<Vec<(Tid, Tid)>>,
}

impl TestPlatform {
    pub fn new() -> TestPlatform {
        TestPlatform {
            interrupts_enabled: AtomicBool::new(false),
            in_irq: AtomicBool::new(false),
            yield_requested: AtomicBool::new(false),
            pages_out: AtomicUsize::new(0),
            switches: Mutex::new(Vec::new()),
        }
    }

    pub fn set_in_interrupt(&self, value: bool) {
        self.in_irq.store(value, Ordering::Relaxed);
    }

    pub fn take_yield_request(&self) -> bool {
        self.yield_requested.swap(false, Ordering::Relaxed)
    }

    pub fn switch_log(&self) -> Vec<(Tid, Tid)> {
        self.switches.lock().unwrap().clone()
    }

    pub fn pages_outstanding(&self) -> usize {
        self.pages_out.load(Ordering::Relaxed)
    }
}

impl InterruptControl for TestPlatform {
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

impl PageAllocator for TestPlatform {
    fn alloc_page(&self) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(PG_SIZE, PG_SIZE).unwrap();
        let page = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.pages_out.fetch_add(1, Ordering::Relaxed);
        Some(page)
    }

    unsafe fn free_page(&self, page: NonNull<u8>) {
        let layout = Layout::from_size_align(PG_SIZE, PG_SIZE).unwrap();
        dealloc(page.as_ptr(), layout);
        self.pages_out.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ContextSwitch for TestPlatform {
    unsafe fn switch_threads(&self, job: SwitchJob) -> Tid {
        self.switches.lock().unwrap().push((job.prev, job.next));
        job.prev
    }

    fn switch_entry_addr(&self) -> usize {
        0x5343
    }
}

impl AddressSpace for TestPlatform {}

extern "C" fn thread_body(_aux: *mut c_void) {}

/// Scheduler with a registered idle thread over a leaked platform.
pub fn boot(mode: SchedMode) -> (Scheduler, &'static TestPlatform) {
    let plat: &'static TestPlatform = Box::leak(Box::new(TestPlatform::new()));
    let mut s = Scheduler::new(plat, mode);
    s.start(thread_body, core::ptr::null_mut(), 0x10)
        .expect("idle thread");
    (s, plat)
}

pub fn reschedule(s: &mut Scheduler, plat: &TestPlatform) {
    match s.prepare_schedule() {
        ScheduleDecision::Keep => s.schedule_tail(None),
        ScheduleDecision::Switch(job) => {
            let prev = unsafe { plat.switch_threads(job) };
            s.schedule_tail(Some(prev));
        }
    }
}

/// Create a thread and, like the facade, yield when it outranks us.
pub fn create(s: &mut Scheduler, plat: &TestPlatform, name: &str, priority: i32) -> Tid {
    let tid = s
        .create(name, priority, thread_body, core::ptr::null_mut(), 0x20)
        .unwrap();
    try_yield(s, plat);
    tid
}

pub fn yield_now(s: &mut Scheduler, plat: &TestPlatform) {
    s.prepare_yield();
    reschedule(s, plat);
}

pub fn try_yield(s: &mut Scheduler, plat: &TestPlatform) {
    if s.ready_front_outranks_current() {
        yield_now(s, plat);
    }
}

pub fn block(s: &mut Scheduler, plat: &TestPlatform) {
    s.block_current();
    reschedule(s, plat);
}

pub fn exit(s: &mut Scheduler, plat: &TestPlatform) {
    s.prepare_exit();
    reschedule(s, plat);
}

pub fn sleep(s: &mut Scheduler, plat: &TestPlatform, ticks: u64, now: u64) {
    s.sleep_current(ticks, now);
    reschedule(s, plat);
}

pub fn lock_acquire(s: &mut Scheduler, plat: &TestPlatform, lock: LockId) {
    if !s.lock_acquire_prepare(lock) {
        reschedule(s, plat);
    }
}

pub fn lock_release(s: &mut Scheduler, plat: &TestPlatform, lock: LockId) {
    if s.lock_release(lock).is_some() {
        try_yield(s, plat);
    }
}

pub fn sema_down(s: &mut Scheduler, plat: &TestPlatform, sema: SemaId) {
    if !s.sema_down_prepare(sema) {
        reschedule(s, plat);
    }
}

pub fn sema_up(s: &mut Scheduler, plat: &TestPlatform, sema: SemaId) {
    if s.sema_up(sema).is_some() {
        try_yield(s, plat);
    }
}

/// Deliver one timer interrupt and, when it requested preemption, the
/// yield the real interrupt-return path would perform.
pub fn deliver_tick(s: &mut Scheduler, plat: &TestPlatform, now: u64) {
    plat.set_in_interrupt(true);
    s.tick(now);
    plat.set_in_interrupt(false);
    if plat.take_yield_request() {
        yield_now(s, plat);
    }
}
