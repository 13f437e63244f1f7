//! Side effects a timer can trigger on its owner.

use std::cell::Cell;
use std::rc::Rc;

use crate::clock::Clock;

/// Receives underflow notifications from a `TimerUnit`.
///
/// The owning chip decides what an underflow means (interrupt flag, PB6/PB7 toggle,
/// shift register clock); the timer only reports that it happened.
pub trait InterruptLine {
    /// `count` underflows were observed while bringing the timer up to `clock`.
    fn timer_underflow(&mut self, clock: Clock, count: u32);
}

/// Discards every notification.
pub struct NullInterrupt;

impl InterruptLine for NullInterrupt {
    fn timer_underflow(&mut self, _clock: Clock, _count: u32) {}
}

/// Accumulates underflows into a counter shared with the owner.
#[derive(Clone, Default)]
pub struct UnderflowCounter {
    total: Rc<Cell<u64>>,
    last_clock: Rc<Cell<Option<Clock>>>,
}

impl UnderflowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.get()
    }

    /// Clock of the most recent notification.
    pub fn last_clock(&self) -> Option<Clock> {
        self.last_clock.get()
    }
}

impl InterruptLine for UnderflowCounter {
    fn timer_underflow(&mut self, clock: Clock, count: u32) {
        self.total.set(self.total.get() + count as u64);
        self.last_clock.set(Some(clock));
    }
}

/// The chip's interrupt output pin as seen by the CPU.
pub trait IrqLine {
    fn set_irq(&mut self, clock: Clock, active: bool);
}

/// IRQ line that nobody listens to.
pub struct NullIrq;

impl IrqLine for NullIrq {
    fn set_irq(&mut self, _clock: Clock, _active: bool) {}
}

/// Records the line level and every edge, for tools and tests.
#[derive(Clone, Default)]
pub struct IrqRecorder {
    active: Rc<Cell<bool>>,
    raised: Rc<Cell<u64>>,
    last_edge: Rc<Cell<Option<Clock>>>,
}

impl IrqRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Number of inactive-to-active transitions.
    pub fn raised(&self) -> u64 {
        self.raised.get()
    }

    pub fn last_edge(&self) -> Option<Clock> {
        self.last_edge.get()
    }
}

impl IrqLine for IrqRecorder {
    fn set_irq(&mut self, clock: Clock, active: bool) {
        if active && !self.active.get() {
            self.raised.set(self.raised.get() + 1);
        }
        if active != self.active.get() {
            self.last_edge.set(Some(clock));
        }
        self.active.set(active);
    }
}
