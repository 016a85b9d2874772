//! Global thread API.
//!
//! The embedding kernel talks to the subsystem through the free functions
//! here, which guard the single [`Scheduler`] instance and run the
//! scheduling dance around it: compute a decision with the scheduler
//! locked, drop the lock, execute the context switch, then complete the
//! tail. No lock is held across a switch, so a resumed thread can always
//! re-enter the facade.
//!
//! Boot sequence: [`init`] with interrupts disabled, then [`start`] to
//! register the idle thread and turn interrupts on. The timer driver
//! calls [`tick`] from its interrupt handler, and yields on handler exit
//! whenever the platform's preempt-on-return flag was raised.

use core::ffi::c_void;

use alloc::string::String;

use spin::Mutex;

use crate::kinfo;
use crate::platform::{AddressSpace, ContextSwitch, InterruptControl, IntrLevel, Platform};
use crate::sched::core::ScheduleDecision;
use crate::sched::types::{SchedMode, ThreadBlock, ThreadFunc, Tid};
use crate::sched::Scheduler;

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);
static PLATFORM: Mutex<Option<&'static dyn Platform>> = Mutex::new(None);

pub(crate) fn platform() -> &'static dyn Platform {
    (*PLATFORM.lock()).expect("thread subsystem not initialized")
}

pub(crate) fn with_sched<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    let sched = guard.as_mut().expect("thread subsystem not initialized");
    f(sched)
}

/// Adopt the running boot thread as "main" and select the scheduling
/// policy. Must run with interrupts disabled, before any other call here.
pub fn init(platform: &'static dyn Platform, mode: SchedMode) {
    assert!(
        platform.level() == IntrLevel::Off,
        "thread subsystem initialized with interrupts enabled"
    );
    *PLATFORM.lock() = Some(platform);
    *SCHEDULER.lock() = Some(Scheduler::new(platform, mode));
    kinfo!("thread subsystem initialized ({:?} scheduling)", mode);
}

/// [`init`] driven by the kernel command line: `-o mlfqs` selects MLFQS
/// and a `loglevel=` directive adjusts the log filter.
pub fn init_from_cmdline(platform: &'static dyn Platform, cmdline: &str) {
    if let Some(level) = crate::logger::parse_level_directive(cmdline) {
        crate::logger::set_max_level(level);
    }
    init(platform, SchedMode::from_cmdline(cmdline));
}

/// Register the idle thread and start preemptive scheduling by enabling
/// interrupts.
pub fn start() {
    with_sched(|s| {
        s.start(idle_entry, core::ptr::null_mut(), kernel_thread_entry as usize)
            .expect("no memory for the idle thread")
    });
    platform().set_level(IntrLevel::On);
}

/// The scheduling dance shared by every suspension point.
pub(crate) fn reschedule() {
    let decision = with_sched(|s| s.prepare_schedule());
    let prev = match decision {
        ScheduleDecision::Keep => None,
        // SAFETY: the job was computed with interrupts disabled and both
        // threads are live; the scheduler lock is dropped.
        ScheduleDecision::Switch(job) => Some(unsafe { platform().switch_threads(job) }),
    };
    with_sched(|s| s.schedule_tail(prev));
}

/// Create a kernel thread running `function(aux)` and return its tid.
/// Yields right away when the new thread outranks the caller.
pub fn create(
    name: &str,
    priority: i32,
    function: ThreadFunc,
    aux: *mut c_void,
) -> Result<Tid, &'static str> {
    let plat = platform();
    let old = plat.disable();
    let result = with_sched(|s| s.create(name, priority, function, aux, kernel_thread_entry as usize));
    plat.set_level(old);
    let tid = result?;
    try_yield();
    Ok(tid)
}

/// Take the current thread off the CPU until [`unblock`]. Interrupts must
/// already be disabled; task context only.
pub fn block() {
    let plat = platform();
    assert!(
        plat.level() == IntrLevel::Off,
        "block with interrupts enabled"
    );
    with_sched(|s| s.block_current());
    reschedule();
}

/// Make a blocked thread ready. Never preempts; callers that want the
/// woken thread to run immediately follow up with [`try_yield`].
pub fn unblock(tid: Tid) {
    let plat = platform();
    let old = plat.disable();
    with_sched(|s| s.unblock(tid));
    plat.set_level(old);
}

/// Give up the CPU; the caller stays ready and re-queues behind threads
/// of equal priority.
pub fn yield_now() {
    let plat = platform();
    let old = plat.disable();
    with_sched(|s| s.prepare_yield());
    reschedule();
    plat.set_level(old);
}

/// Yield only if some ready thread outranks the caller. No-op from
/// interrupt context.
pub fn try_yield() {
    let plat = platform();
    if plat.in_interrupt() {
        return;
    }
    let old = plat.disable();
    let outranked = with_sched(|s| s.ready_front_outranks_current());
    plat.set_level(old);
    if outranked {
        yield_now();
    }
}

/// Terminate the current thread. Its slot and stack are reclaimed by the
/// next thread to run.
pub fn exit() -> ! {
    let plat = platform();
    assert!(!plat.in_interrupt(), "exit from interrupt context");
    plat.process_exit(current());
    plat.disable();
    with_sched(|s| s.prepare_exit());
    reschedule();
    unreachable!("a dying thread was scheduled again");
}

/// Sleep until `now + ticks`. Returns immediately for a non-positive
/// duration. `now` is the timer's current tick count.
pub fn sleep(ticks: i64, now: u64) {
    if ticks <= 0 {
        return;
    }
    let plat = platform();
    assert!(!plat.in_interrupt(), "sleep from interrupt context");
    let old = plat.disable();
    with_sched(|s| s.sleep_current(ticks as u64, now));
    reschedule();
    plat.set_level(old);
}

/// Timer interrupt entry: statistics, wake-ups, slice accounting and the
/// MLFQS cadence.
pub fn tick(now: u64) {
    crate::logger::note_tick(now);
    with_sched(|s| s.tick(now));
}

pub fn current() -> Tid {
    with_sched(|s| s.current())
}

pub fn name() -> String {
    with_sched(|s| String::from(s.current_name()))
}

pub fn set_priority(new_priority: i32) {
    let plat = platform();
    let old = plat.disable();
    let should_yield = with_sched(|s| s.set_priority(new_priority));
    plat.set_level(old);
    if should_yield {
        yield_now();
    }
}

pub fn get_priority() -> i32 {
    with_sched(|s| s.get_priority())
}

pub fn set_nice(nice: i32) {
    let plat = platform();
    let old = plat.disable();
    let should_yield = with_sched(|s| s.set_nice(nice));
    plat.set_level(old);
    if should_yield {
        yield_now();
    }
}

pub fn get_nice() -> i32 {
    with_sched(|s| s.get_nice())
}

/// 100 times the system load average.
pub fn get_load_avg() -> i32 {
    with_sched(|s| s.get_load_avg())
}

/// 100 times the current thread's recent_cpu.
pub fn get_recent_cpu() -> i32 {
    with_sched(|s| s.get_recent_cpu())
}

/// Run `f` over every live thread. Interrupts must be disabled.
pub fn foreach(f: impl FnMut(&mut ThreadBlock)) {
    assert!(
        platform().level() == IntrLevel::Off,
        "thread iteration with interrupts enabled"
    );
    with_sched(|s| s.foreach(f));
}

/// Donation hook for external synchronization layers: recompute a
/// thread's effective priority after its donors changed.
pub fn refresh_effective(tid: Tid) {
    let plat = platform();
    let old = plat.disable();
    with_sched(|s| s.refresh_effective(tid));
    plat.set_level(old);
}

/// Donation hook: donate the waiters' priority to `to` and requeue it.
pub fn donate_priority(to: Tid) {
    let plat = platform();
    let old = plat.disable();
    with_sched(|s| s.donate_priority(to));
    plat.set_level(old);
}

/// Mark a thread as running user code for tick accounting.
pub fn set_user(tid: Tid, is_user: bool) {
    let plat = platform();
    let old = plat.disable();
    with_sched(|s| s.set_user(tid, is_user));
    plat.set_level(old);
}

/// Log the tick breakdown counters.
pub fn print_stats() {
    with_sched(|s| s.print_stats());
}

/// Called by the switch entry shim the first time a thread runs, while
/// interrupts are still disabled: completes the switch the thread was
/// created in the middle of.
pub fn switch_entry_tail(prev: Tid) {
    with_sched(|s| s.schedule_tail(Some(prev)));
}

/// Trampoline at the bottom of every kernel thread: enable interrupts
/// (the scheduler tail left them off), run the thread function, and exit
/// if it returns.
pub extern "C" fn kernel_thread_entry(function: ThreadFunc, aux: *mut c_void) -> ! {
    platform().set_level(IntrLevel::On);
    function(aux);
    exit();
}

/// Body of the idle thread: block, and once re-scheduled (nothing else
/// was ready), halt until an interrupt arrives.
pub extern "C" fn idle_entry(_aux: *mut c_void) {
    loop {
        let plat = platform();
        plat.disable();
        block();
        plat.wait_for_interrupt();
    }
}
