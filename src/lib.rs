//! Cycle-exact emulation of the 6526 CIA interval timers without per-cycle stepping.

pub mod alarm;
pub mod cia;
pub mod clock;
pub mod debug_flags;
pub mod interrupt;
pub mod snapshot;
pub mod timer;

pub use alarm::{AlarmContext, AlarmScheduler, AlarmToken};
pub use cia::{CiaTimers, IcrFlags};
pub use clock::{Clock, CLOCK_NEVER};
pub use interrupt::{InterruptLine, IrqLine};
pub use snapshot::{CiaSnapshot, TimerSnapshot};
pub use timer::{ControlBits, TimerLatency, TimerUnit};
