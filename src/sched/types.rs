//! Scheduler type definitions and subsystem constants.

use core::ffi::c_void;
use core::ptr::NonNull;

use alloc::vec::Vec;

use crate::fixed::Real;

/// Lowest priority.
pub const PRI_MIN: i32 = 0;
/// Priority of the initial thread and the default for new threads.
pub const PRI_DEFAULT: i32 = 31;
/// Highest priority.
pub const PRI_MAX: i32 = 63;

/// Timer ticks a thread may run before preemption is requested.
pub const TIME_SLICE: u32 = 4;

/// Timer ticks per second.
pub const TIMER_FREQ: u64 = 100;

/// Ticks between MLFQS priority recomputations.
pub const MLFQS_PRIORITY_TICKS: u64 = 4;

/// Niceness bounds.
pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 20;

/// Canary validating thread records and stack pages.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Size of the page backing each thread's stack.
pub const PG_SIZE: usize = 4096;

/// Capacity of the thread table.
pub const MAX_THREADS: usize = 64;

/// Bound on the nested donation walk. Chains deeper than this keep the
/// priorities donated so far and stop propagating.
pub const DONATION_DEPTH: usize = 8;

pub const THREAD_NAME_LEN: usize = 16;

/// Thread identifier. Monotonically increasing from 1, never reused.
pub type Tid = u32;

/// Handle of a donation-tracking lock record.
pub type LockId = usize;

/// Handle of a semaphore record.
pub type SemaId = usize;

/// Entry point of a kernel thread. The C ABI pins the calling convention
/// the switch entry shim must set up.
pub type ThreadFunc = extern "C" fn(*mut c_void);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Scheduling policy, fixed at boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedMode {
    /// Priority round-robin with donation.
    RoundRobin,
    /// 4.4BSD multi-level feedback queue.
    Mlfqs,
}

impl SchedMode {
    /// Scan a kernel command line for the `-o mlfqs` option.
    pub fn from_cmdline(cmdline: &str) -> SchedMode {
        let mut tokens = cmdline.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "-o" {
                if let Some(value) = tokens.next() {
                    if value.eq_ignore_ascii_case("mlfqs") {
                        return SchedMode::Mlfqs;
                    }
                }
            }
        }
        SchedMode::RoundRobin
    }
}

/// Owning handle for the page backing a thread's stack.
///
/// Obtained from the platform allocator at creation; returned to it by the
/// successor thread's scheduler tail after the owner dies. The initial
/// thread runs on the boot stack and has no `StackPage`.
pub struct StackPage(NonNull<u8>);

// One page, one owner, and all mutation happens with interrupts disabled
// on a single CPU.
unsafe impl Send for StackPage {}

impl StackPage {
    pub fn new(base: NonNull<u8>) -> StackPage {
        StackPage(base)
    }

    pub fn base(&self) -> NonNull<u8> {
        self.0
    }

    /// One past the top of the stack; the initial stack pointer.
    pub fn top(&self) -> usize {
        self.0.as_ptr() as usize + PG_SIZE
    }

    /// Stamp the canary word at the base of the page. The stack grows down
    /// toward it; an overflow destroys it.
    pub(crate) unsafe fn write_canary(&self) {
        (self.0.as_ptr() as *mut u32).write(THREAD_MAGIC);
    }

    pub(crate) fn canary_intact(&self) -> bool {
        unsafe { (self.0.as_ptr() as *const u32).read() == THREAD_MAGIC }
    }
}

/// Frame invoking the kernel-thread trampoline; topmost of the three
/// bootstrap frames on a new stack.
#[repr(C)]
pub struct KernelThreadFrame {
    /// Fake return address; the trampoline never returns.
    pub ret_addr: usize,
    pub function: usize,
    pub aux: usize,
}

/// Frame consumed by the switch entry shim on a thread's first run; its
/// `rip` is the kernel-thread trampoline.
#[repr(C)]
pub struct SwitchEntryFrame {
    pub rip: usize,
}

/// Callee-saved register frame restored by the switch primitive. For a new
/// thread the registers are zero and `rip` is the switch entry shim.
#[repr(C)]
pub struct SwitchThreadsFrame {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub rbp: usize,
    pub rbx: usize,
    pub rip: usize,
}

/// Push the three bootstrap frames onto a fresh stack and return the
/// resulting stack pointer (the address of the switch-threads frame).
///
/// # Safety
/// `stack_top` must be the top of a writable region with room for the
/// three frames below it.
pub(crate) unsafe fn push_bootstrap_frames(
    stack_top: usize,
    function: ThreadFunc,
    aux: *mut c_void,
    kernel_entry: usize,
    switch_entry: usize,
) -> usize {
    let mut sp = stack_top;

    sp -= core::mem::size_of::<KernelThreadFrame>();
    (sp as *mut KernelThreadFrame).write(KernelThreadFrame {
        ret_addr: 0,
        function: function as usize,
        aux: aux as usize,
    });

    sp -= core::mem::size_of::<SwitchEntryFrame>();
    (sp as *mut SwitchEntryFrame).write(SwitchEntryFrame { rip: kernel_entry });

    sp -= core::mem::size_of::<SwitchThreadsFrame>();
    (sp as *mut SwitchThreadsFrame).write(SwitchThreadsFrame {
        r15: 0,
        r14: 0,
        r13: 0,
        r12: 0,
        rbp: 0,
        rbx: 0,
        rip: switch_entry,
    });

    sp
}

/// Per-thread record. Lives in the thread table; the thread's stack lives
/// in its own page, owned through `stack`.
pub struct ThreadBlock {
    pub tid: Tid,
    name: [u8; THREAD_NAME_LEN],
    pub status: ThreadStatus,
    pub stack: Option<StackPage>,
    /// Saved stack pointer while the thread is off the CPU.
    pub stack_ptr: usize,
    /// Priority assigned by the owner, before any donation.
    pub base_priority: i32,
    /// Priority the scheduler uses; raised above `base_priority` while
    /// higher-priority threads wait on locks this thread holds.
    pub effective_priority: i32,
    pub owned_locks: Vec<LockId>,
    pub waiting_on: Option<LockId>,
    /// Absolute tick at which to wake; 0 while not sleeping.
    pub wake_time: u64,
    pub nice: i32,
    pub recent_cpu: Real,
    /// Set by the process layer when the thread runs user code.
    pub is_user: bool,
    pub magic: u32,
}

impl ThreadBlock {
    pub fn new(tid: Tid, name: &str, priority: i32) -> ThreadBlock {
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "thread priority {} out of range",
            priority
        );
        let mut buf = [0u8; THREAD_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(THREAD_NAME_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        ThreadBlock {
            tid,
            name: buf,
            status: ThreadStatus::Blocked,
            stack: None,
            stack_ptr: 0,
            base_priority: priority,
            effective_priority: priority,
            owned_locks: Vec::new(),
            waiting_on: None,
            wake_time: 0,
            nice: 0,
            recent_cpu: Real::ZERO,
            is_user: false,
            magic: THREAD_MAGIC,
        }
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(THREAD_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("<invalid>")
    }
}
