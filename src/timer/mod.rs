//! Lazily evaluated 16-bit countdown timer of a 6526-style peripheral chip.
//!
//! Nothing is stepped per cycle. A timer is a small stack of `TimerState`s, each
//! valid from some clock onwards; register writes push states that become
//! effective a few cycles later, and every access first folds the stack up to
//! the accessing clock and counts the underflows that happened on the way.

mod control;
mod stack;
mod state;


pub use control::{ControlBits, TimerLatency};
pub use stack::{Change, HistoryStack, STACK_DEPTH};
pub use state::{TimerState, POWER_ON_VALUE};

use control::ControlRequest;

use crate::alarm::{AlarmScheduler, AlarmToken};
use crate::clock::{self, Clock, CLOCK_NEVER};
use crate::debug_flags;
use crate::interrupt::InterruptLine;
use crate::snapshot::TimerSnapshot;

pub struct TimerUnit {
    name: &'static str,
    stack: HistoryStack,
    last_update: Clock,
    alarm_clock: Clock,
    token: AlarmToken,
    latency: TimerLatency,
    irq: Box<dyn InterruptLine>,
}

impl TimerUnit {
    pub fn new(
        name: &'static str,
        clock: Clock,
        token: AlarmToken,
        latency: TimerLatency,
        irq: Box<dyn InterruptLine>,
    ) -> Self {
        Self {
            name,
            stack: HistoryStack::new(TimerState::power_on(clock)),
            last_update: clock,
            alarm_clock: CLOCK_NEVER,
            token,
            latency,
            irq,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn token(&self) -> AlarmToken {
        self.token
    }

    pub fn latency(&self) -> TimerLatency {
        self.latency
    }

    pub fn last_update(&self) -> Clock {
        self.last_update
    }

    /// Clock the alarm is currently registered for.
    pub fn alarm_clock(&self) -> Clock {
        self.alarm_clock
    }

    /// State in effect at the last update.
    pub fn current(&self) -> &TimerState {
        self.stack.current()
    }

    pub fn history(&self) -> &HistoryStack {
        &self.stack
    }

    pub fn is_running(&self) -> bool {
        self.stack.current().running
    }

    pub fn is_one_shot(&self) -> bool {
        self.stack.current().one_shot
    }

    pub fn is_cascaded(&self) -> bool {
        self.stack.current().cascade
    }

    /// Power-on state: latch and counter at 0xFFFF, stopped, alarm unset.
    pub fn reset(&mut self, clock: Clock, alarms: &mut dyn AlarmScheduler) {
        self.stack.reset(TimerState::power_on(clock));
        self.last_update = clock;
        self.alarm_clock = CLOCK_NEVER;
        alarms.schedule(self.token, CLOCK_NEVER);
    }

    /// Bring the timer up to `target` and return the number of underflows since
    /// the previous update. Does not notify anyone.
    pub fn advance(&mut self, target: Clock) -> u32 {
        if target < self.last_update {
            debug_assert!(
                false,
                "{}: clock went backwards ({} < {})",
                self.name, target, self.last_update
            );
            return 0;
        }
        let underflows = self.stack.fold(self.last_update, target);
        self.last_update = target;
        underflows
    }

    /// `advance`, reporting any underflows to the interrupt line.
    pub fn update(&mut self, clock: Clock) -> u32 {
        let underflows = self.advance(clock);
        if underflows > 0 {
            if debug_flags::trace_timer() {
                log::trace!("{}: {} underflow(s) by {}", self.name, underflows, clock);
            }
            self.irq.timer_underflow(clock, underflows);
        }
        underflows
    }

    /// Counter value at `clock`. The timer must already be updated to `clock`.
    pub fn value_at(&self, clock: Clock) -> u16 {
        debug_assert!(
            clock >= self.last_update,
            "{}: read at {} before last update {}",
            self.name,
            clock,
            self.last_update
        );
        self.stack.current().value_at(clock)
    }

    pub fn read_timer(&mut self, clock: Clock) -> u16 {
        self.update(clock);
        self.value_at(clock)
    }

    pub fn read_low(&mut self, clock: Clock) -> u8 {
        (self.read_timer(clock) & 0xFF) as u8
    }

    pub fn read_high(&mut self, clock: Clock) -> u8 {
        (self.read_timer(clock) >> 8) as u8
    }

    pub fn read_latch(&self) -> u16 {
        self.stack.current().latch
    }

    pub fn set_latch_low(&mut self, clock: Clock, byte: u8, alarms: &mut dyn AlarmScheduler) {
        self.update(clock);
        self.stack.set_latch(|latch| (latch & 0xFF00) | byte as u16);
        self.set_alarm(alarms);
    }

    pub fn set_latch_high(&mut self, clock: Clock, byte: u8, alarms: &mut dyn AlarmScheduler) {
        self.update(clock);
        self.stack.set_latch(|latch| (latch & 0x00FF) | ((byte as u16) << 8));
        self.set_alarm(alarms);
    }

    /// Control register write at `clock`.
    ///
    /// Mode changes take `latency.one_shot` cycles, start/stop/load take
    /// `latency.control` cycles, and load-and-start begins counting at
    /// `latency.restart()`.
    pub fn set_control(&mut self, clock: Clock, bits: ControlBits, alarms: &mut dyn AlarmScheduler) {
        self.update(clock);

        let mode_at = clock + self.latency.one_shot;
        let at = clock + self.latency.control;
        if mode_at <= at {
            self.push_mode(mode_at, bits);
            self.push_request(clock, at, bits);
        } else {
            self.push_request(clock, at, bits);
            self.push_mode(mode_at, bits);
        }

        if debug_flags::trace_timer() {
            log::trace!(
                "{}: control {:02X} at {} -> depth {}",
                self.name,
                bits.bits(),
                clock,
                self.stack.len()
            );
        }
        self.set_alarm(alarms);
    }

    fn push_mode(&mut self, mode_at: Clock, bits: ControlBits) {
        let one_shot = bits.contains(ControlBits::ONE_SHOT);
        if self.stack.state_at(mode_at).one_shot != one_shot {
            self.stack.push(mode_at, Change::mode(one_shot));
        }
    }

    fn push_request(&mut self, clock: Clock, at: Clock, bits: ControlBits) {
        // a one-shot can still stop before `at`
        let st = self.stack.state_at(at).carried_to(at);
        match bits.request() {
            ControlRequest::Stop => {
                if st.running || st.cascade {
                    self.stack.push(at, Change::counting(false, false));
                }
            }
            ControlRequest::Start => {
                if !st.running || st.one_shot {
                    self.stack.push(at, Change::counting(true, false));
                }
            }
            ControlRequest::StartCascade => {
                if !st.cascade || st.one_shot {
                    self.stack.push(at, Change::counting(false, true));
                }
            }
            ControlRequest::Load => self.stack.push(at, Change::load(false, false)),
            ControlRequest::LoadAndStart => {
                self.stack.push(at, Change::load(false, false));
                self.stack.push(clock + self.latency.restart(), Change::counting(true, false));
            }
            ControlRequest::LoadCascade => self.stack.push(at, Change::load(false, true)),
        }
    }

    /// One underflow of the sibling timer. Returns true when this timer underflows.
    pub fn single_step(&mut self, clock: Clock) -> bool {
        self.step_cascade(clock, 1) > 0
    }

    /// `steps` underflows of the sibling timer, all observed at `clock`.
    ///
    /// Only counts when the state in effect at `clock` is cascaded. Stepping a
    /// zero counter reloads it from the latch and counts as an underflow; a
    /// one-shot cascade stops there with the counter at zero. Pending states
    /// are derived again from the stepped counter.
    pub fn step_cascade(&mut self, clock: Clock, steps: u32) -> u32 {
        self.update(clock);
        let st = self.stack.current_mut();
        if steps == 0 || !st.cascade {
            return 0;
        }
        st.basis = clock;

        let steps = steps as Clock;
        let underflows = if steps <= st.count as Clock {
            st.count -= steps as u16;
            0
        } else if st.one_shot {
            st.cascade = false;
            st.count = 0;
            1
        } else {
            let period = st.period();
            let rest = steps - st.count as Clock - 1;
            st.count = st.latch - (rest % period) as u16;
            (1 + rest / period) as u32
        };
        self.stack.rederive();

        if underflows > 0 {
            if debug_flags::trace_timer() {
                log::trace!("{}: {} cascade underflow(s) at {}", self.name, underflows, clock);
            }
            self.irq.timer_underflow(clock, underflows);
        }
        underflows
    }

    /// Next clock at which this timer will count an underflow, as of the last update.
    pub fn next_underflow(&self) -> Clock {
        self.stack.next_underflow(self.last_update)
    }

    /// The alarm registered by this timer fired at `clock` (at or after its target).
    pub fn acknowledge_alarm(&mut self, clock: Clock, alarms: &mut dyn AlarmScheduler) -> u32 {
        if clock < self.alarm_clock {
            log::warn!(
                "{}: alarm dispatched early at {} (armed for {})",
                self.name,
                clock,
                self.alarm_clock
            );
        }
        self.alarm_clock = CLOCK_NEVER;
        let underflows = self.update(clock);
        self.set_alarm(alarms);
        underflows
    }

    /// Register the alarm for the next underflow any pending state will reach.
    pub fn set_alarm(&mut self, alarms: &mut dyn AlarmScheduler) {
        let next = self.next_underflow();
        if debug_flags::trace_alarm() && next != self.alarm_clock {
            log::trace!("{}: alarm {} -> {}", self.name, self.alarm_clock, next);
        }
        self.alarm_clock = next;
        alarms.schedule(self.token, next);
    }

    /// Subtract `sub` from every stored clock. The alarm context is rebased by its owner.
    pub fn prevent_clock_overflow(&mut self, sub: Clock) {
        debug_assert!(
            sub <= self.last_update,
            "{}: rebase by {} past last update {}",
            self.name,
            sub,
            self.last_update
        );
        let sub = sub.min(self.last_update);
        self.stack.anchor(self.last_update);
        self.stack.rebase(sub);
        self.last_update -= sub;
        self.alarm_clock = clock::rebase(self.alarm_clock, sub);
    }

    /// Flat state as of `clock`. Pending control changes are not included.
    pub fn snapshot(&mut self, clock: Clock) -> TimerSnapshot {
        self.update(clock);
        let st = self.stack.current();
        TimerSnapshot {
            latch: st.latch,
            count: st.value_at(clock),
            running: st.running,
            one_shot: st.one_shot,
            cascade: st.cascade,
        }
    }

    pub fn restore(&mut self, clock: Clock, snap: &TimerSnapshot, alarms: &mut dyn AlarmScheduler) {
        let mut st = TimerState::power_on(clock);
        st.latch = snap.latch;
        st.count = snap.count;
        st.running = snap.running;
        st.one_shot = snap.one_shot;
        st.cascade = snap.cascade;
        st.recompute_next_underflow();
        self.stack.reset(st);
        self.last_update = clock;
        self.set_alarm(alarms);
    }
}
