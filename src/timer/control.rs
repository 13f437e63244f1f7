use bitflags::bitflags;

use crate::clock::Clock;
use crate::debug_flags;

bitflags! {
    /// Timer bits of a control register (CRA/CRB bits 0-5).
    ///
    /// `COUNT_SIBLING` is the timer's own view of "do not count cycles"; the chip
    /// maps its input-mode bits onto it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlBits: u8 {
        const START = 0b00000001;
        const PB_ON = 0b00000010;
        const OUT_TOGGLE = 0b00000100;
        const ONE_SHOT = 0b00001000;
        const FORCE_LOAD = 0b00010000;
        const COUNT_SIBLING = 0b00100000;
    }
}

/// What a control write asks the counter to do once it takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlRequest {
    Stop,
    Start,
    StartCascade,
    Load,
    LoadAndStart,
    LoadCascade,
}

impl ControlBits {
    pub(crate) fn request(self) -> ControlRequest {
        let load = self.contains(Self::FORCE_LOAD);
        let start = self.contains(Self::START);
        let cascade = self.contains(Self::COUNT_SIBLING);
        match (load, start, cascade) {
            (false, false, _) => ControlRequest::Stop,
            (false, true, false) => ControlRequest::Start,
            (false, true, true) => ControlRequest::StartCascade,
            (true, false, _) => ControlRequest::Load,
            (true, true, false) => ControlRequest::LoadAndStart,
            (true, true, true) => ControlRequest::LoadCascade,
        }
    }
}

/// Delays between a control register write and the counter reacting to it.
///
/// These differ between chip revisions, so each variant gets its own preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerLatency {
    /// Start, stop and force-load.
    pub control: Clock,
    /// Switching between one-shot and continuous mode.
    pub one_shot: Clock,
}

impl TimerLatency {
    pub const MOS6526: TimerLatency = TimerLatency {
        control: 2,
        one_shot: 1,
    };

    /// A force-load combined with start begins counting one cycle after the load.
    pub fn restart(&self) -> Clock {
        self.control + 1
    }

    /// `MOS6526` with `CIA_TIMER_DELAY` / `CIA_ONESHOT_DELAY` applied.
    pub fn from_env() -> Self {
        let mut latency = Self::MOS6526;
        if let Some(v) = debug_flags::timer_delay() {
            latency.control = v as Clock;
        }
        if let Some(v) = debug_flags::oneshot_delay() {
            latency.one_shot = v as Clock;
        }
        latency
    }
}

impl Default for TimerLatency {
    fn default() -> Self {
        Self::MOS6526
    }
}
