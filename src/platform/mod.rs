//! Contracts for the services the thread subsystem consumes.
//!
//! The subsystem is uniprocessor and protects its state by disabling
//! interrupts, so everything here funnels through four small traits the
//! embedding kernel implements once:
//!
//! - [`InterruptControl`]: disable/restore, interrupt-context queries and
//!   the preempt-on-return request used by the timer tick.
//! - [`ContextSwitch`]: the register-level switch primitive.
//! - [`PageAllocator`]: page-sized, page-aligned, zero-filled blocks that
//!   back each thread's stack.
//! - [`AddressSpace`]: optional hooks for kernels that run user processes.
//!
//! [`Platform`] bundles the four; [`crate::thread::init`] takes one
//! `&'static dyn Platform`.

use core::ptr::NonNull;

use crate::sched::types::Tid;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

/// Interrupt state of the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

pub trait InterruptControl: Sync {
    /// Disable interrupts and return the previous level.
    fn disable(&self) -> IntrLevel;

    /// Restore a level previously returned by [`InterruptControl::disable`].
    fn set_level(&self, level: IntrLevel);

    fn level(&self) -> IntrLevel;

    /// True while executing an external interrupt handler.
    fn in_interrupt(&self) -> bool;

    /// Request that the interrupted thread yields as soon as the current
    /// handler returns. Only meaningful from interrupt context.
    fn yield_on_return(&self);

    /// Atomically re-enable interrupts and idle the CPU until the next
    /// interrupt fires. Used only by the idle thread.
    fn wait_for_interrupt(&self);
}

pub trait PageAllocator: Sync {
    /// Obtain one zeroed, page-aligned page ([`crate::sched::types::PG_SIZE`]
    /// bytes), or `None` when memory is exhausted.
    fn alloc_page(&self) -> Option<NonNull<u8>>;

    /// Return a page obtained from [`PageAllocator::alloc_page`].
    ///
    /// # Safety
    /// `page` must come from `alloc_page` on the same allocator and must
    /// not be used again afterwards.
    unsafe fn free_page(&self, page: NonNull<u8>);
}

/// Everything the switch primitive needs for one thread-to-thread switch.
///
/// `prev_stack_slot` points at the outgoing thread's saved stack-pointer
/// field; the primitive stores the final stack pointer through it after
/// pushing the callee-saved registers. `next_stack_ptr` is the incoming
/// thread's previously saved stack pointer. The pointer stays valid across
/// the call because the thread table is only mutated with interrupts
/// disabled and the switch runs with interrupts disabled.
pub struct SwitchJob {
    pub prev: Tid,
    pub next: Tid,
    pub prev_stack_slot: *mut usize,
    pub next_stack_ptr: usize,
}

pub trait ContextSwitch: Sync {
    /// Switch the CPU from `job.prev` to `job.next`.
    ///
    /// Saves the callee-saved registers on the outgoing stack, records the
    /// outgoing stack pointer through `prev_stack_slot`, then restores the
    /// incoming thread's registers and stack. The call returns when
    /// `job.prev` is scheduled again; the return value is the thread that
    /// was running immediately before that resumption.
    ///
    /// A newly created thread resumes for the first time in the switch
    /// entry shim (see [`ContextSwitch::switch_entry_addr`]), which must
    /// call [`crate::thread::switch_entry_tail`] with the previous thread
    /// before dropping into the kernel-thread trampoline frame.
    ///
    /// # Safety
    /// Must be called with interrupts disabled, and `job` must describe
    /// two live threads of the running scheduler.
    unsafe fn switch_threads(&self, job: SwitchJob) -> Tid;

    /// Address of the switch entry shim placed in the bottom-most stack
    /// frame of every new thread.
    fn switch_entry_addr(&self) -> usize;
}

/// Hooks for kernels that attach user address spaces to threads. Pure
/// kernel-thread embeddings can leave both defaulted.
pub trait AddressSpace: Sync {
    /// Make `tid`'s address space current. Called by the scheduler tail
    /// with interrupts disabled.
    fn activate(&self, tid: Tid) {
        let _ = tid;
    }

    /// Tear down the process side of `tid`. Called once on thread exit,
    /// before the thread is marked dying.
    fn process_exit(&self, tid: Tid) {
        let _ = tid;
    }
}

/// The full set of services the subsystem needs from its host kernel.
pub trait Platform: InterruptControl + ContextSwitch + PageAllocator + AddressSpace {}

impl<T> Platform for T where T: InterruptControl + ContextSwitch + PageAllocator + AddressSpace {}
