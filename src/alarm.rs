//! Alarm registrations: a target clock per token, dispatched by the machine loop
//! once the virtual clock reaches the target.

use crate::clock::{self, Clock, CLOCK_NEVER};
use crate::debug_flags;

/// Opaque handle identifying one alarm registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmToken(pub u32);

/// The scheduler side of an alarm as seen by a peripheral.
pub trait AlarmScheduler {
    /// Register `token` to fire at `target`, replacing any earlier registration.
    /// `CLOCK_NEVER` removes the registration.
    fn schedule(&mut self, token: AlarmToken, target: Clock);
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    token: AlarmToken,
    target: Clock,
}

/// Small alarm table for one CPU's alarm domain.
///
/// Only a handful of peripherals register alarms, so a linear table beats a heap here.
#[derive(Debug, Default)]
pub struct AlarmContext {
    pending: Vec<Registration>,
}

impl AlarmContext {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Target clock registered for `token`, or `CLOCK_NEVER`.
    pub fn pending(&self, token: AlarmToken) -> Clock {
        self.pending
            .iter()
            .find(|r| r.token == token)
            .map(|r| r.target)
            .unwrap_or(CLOCK_NEVER)
    }

    /// Earliest registered target across all tokens.
    pub fn next_alarm(&self) -> Clock {
        self.pending
            .iter()
            .map(|r| r.target)
            .min()
            .unwrap_or(CLOCK_NEVER)
    }

    /// Remove and return the earliest registration due at `now`.
    ///
    /// The returned clock is the requested target; the caller dispatches with the
    /// actual (possibly later) clock.
    pub fn pop_due(&mut self, now: Clock) -> Option<(AlarmToken, Clock)> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, r)| r.target <= now)
            .min_by_key(|(_, r)| r.target)
            .map(|(i, _)| i)?;
        let r = self.pending.swap_remove(idx);
        if debug_flags::trace_alarm() {
            log::trace!("alarm {:?} due: target={} now={}", r.token, r.target, now);
        }
        Some((r.token, r.target))
    }

    pub fn prevent_clock_overflow(&mut self, sub: Clock) {
        for r in &mut self.pending {
            r.target = clock::rebase(r.target, sub);
        }
    }
}

impl AlarmScheduler for AlarmContext {
    fn schedule(&mut self, token: AlarmToken, target: Clock) {
        if debug_flags::trace_alarm() {
            log::trace!("alarm {:?} -> {}", token, target);
        }
        self.pending.retain(|r| r.token != token);
        if target != CLOCK_NEVER {
            self.pending.push(Registration { token, target });
        }
    }
}
