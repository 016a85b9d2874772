//! x86_64 interrupt control.
//!
//! Implements [`InterruptControl`] over the `x86_64` crate's instruction
//! wrappers. Interrupt-context tracking and the preempt-on-return flag
//! cannot be read from the CPU, so the kernel's interrupt entry/exit
//! shims report them here: call [`X86Interrupts::enter_interrupt`] on
//! entry, and on exit call [`X86Interrupts::leave_interrupt`] and yield
//! if it returns `true`.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use x86_64::instructions::interrupts;

use super::{InterruptControl, IntrLevel};

pub struct X86Interrupts {
    irq_depth: AtomicUsize,
    yield_requested: AtomicBool,
}

impl X86Interrupts {
    pub const fn new() -> Self {
        Self {
            irq_depth: AtomicUsize::new(0),
            yield_requested: AtomicBool::new(false),
        }
    }

    /// Record entry into an external interrupt handler.
    pub fn enter_interrupt(&self) {
        self.irq_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Record exit from an external interrupt handler. Returns true when a
    /// yield was requested during the handler; the caller must yield after
    /// the interrupt frame is unwound.
    pub fn leave_interrupt(&self) -> bool {
        self.irq_depth.fetch_sub(1, Ordering::Relaxed);
        self.yield_requested.swap(false, Ordering::Relaxed)
    }
}

impl InterruptControl for X86Interrupts {
    fn disable(&self) -> IntrLevel {
        let was_enabled = interrupts::are_enabled();
        interrupts::disable();
        if was_enabled {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn set_level(&self, level: IntrLevel) {
        match level {
            IntrLevel::On => interrupts::enable(),
            IntrLevel::Off => interrupts::disable(),
        }
    }

    fn level(&self) -> IntrLevel {
        if interrupts::are_enabled() {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn in_interrupt(&self) -> bool {
        self.irq_depth.load(Ordering::Relaxed) > 0
    }

    fn yield_on_return(&self) {
        self.yield_requested.store(true, Ordering::Relaxed);
    }

    fn wait_for_interrupt(&self) {
        // sti only takes effect after the following instruction, so the
        // hlt cannot be separated from the enable by an interrupt.
        interrupts::enable_and_hlt();
    }
}
