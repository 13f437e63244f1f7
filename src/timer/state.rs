use crate::clock::{Clock, CLOCK_NEVER};

/// Power-on value of both the latch and the counter.
pub const POWER_ON_VALUE: u16 = 0xFFFF;

/// One description of a countdown timer, valid from `basis` onwards.
///
/// The counter is not stored per cycle: while running it is derived from
/// `next_underflow` and the latch period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    /// First cycle (inclusive) this description is valid for.
    pub basis: Clock,
    /// Cycle at which the counter reaches zero, `CLOCK_NEVER` when not counting cycles.
    pub next_underflow: Clock,
    /// Counter value at `basis`.
    pub count: u16,
    pub latch: u16,
    /// Counts clock cycles.
    pub running: bool,
    /// Stops after the next underflow.
    pub one_shot: bool,
    /// Counts underflows of the sibling timer instead of cycles.
    pub cascade: bool,
}

impl TimerState {
    pub fn power_on(clock: Clock) -> Self {
        Self {
            basis: clock,
            next_underflow: CLOCK_NEVER,
            count: POWER_ON_VALUE,
            latch: POWER_ON_VALUE,
            running: false,
            one_shot: false,
            cascade: false,
        }
    }

    /// Cycles between two underflows of a free-running timer.
    pub fn period(&self) -> Clock {
        self.latch as Clock + 1
    }

    pub fn recompute_next_underflow(&mut self) {
        self.next_underflow = if self.running {
            self.basis + self.count as Clock
        } else {
            CLOCK_NEVER
        };
    }

    /// Counter register value at `clock` (`clock >= basis`).
    pub fn value_at(&self, clock: Clock) -> u16 {
        debug_assert!(clock >= self.basis, "read at {} before basis {}", clock, self.basis);
        if !self.running {
            return self.count;
        }
        let zero = self.next_underflow;
        if clock <= zero {
            (zero - clock) as u16
        } else if self.one_shot {
            // a one-shot never reloads
            0
        } else {
            let wrapped = (clock - zero - 1) % self.period();
            self.latch - wrapped as u16
        }
    }

    /// First underflow strictly after `after`, or `CLOCK_NEVER`.
    pub fn next_underflow_after(&self, after: Clock) -> Clock {
        if !self.running {
            return CLOCK_NEVER;
        }
        if self.next_underflow > after {
            return self.next_underflow;
        }
        if self.one_shot {
            return CLOCK_NEVER;
        }
        let periods = (after - self.next_underflow) / self.period() + 1;
        self.next_underflow + periods * self.period()
    }

    /// Number of underflows at clocks `c` with `after < c <= upto`.
    pub fn underflows_between(&self, after: Clock, upto: Clock) -> u32 {
        if upto <= after {
            return 0;
        }
        let first = self.next_underflow_after(after);
        if first > upto {
            return 0;
        }
        if self.one_shot {
            return 1;
        }
        let n = 1 + (upto - first) / self.period();
        n.min(u32::MAX as Clock) as u32
    }

    /// Rewrite this state so it describes the same counter from a basis at or
    /// before `target`, with no underflow left behind `target`.
    ///
    /// A running continuous timer moves its basis to the last reload point; a
    /// one-shot that reached zero stops with the counter frozen at zero.
    pub fn settle(&mut self, target: Clock) {
        if !self.running {
            if target > self.basis {
                self.basis = target;
            }
            return;
        }
        if self.next_underflow > target {
            return;
        }
        if self.one_shot {
            self.running = false;
            self.count = 0;
            self.basis = target;
            self.next_underflow = CLOCK_NEVER;
            return;
        }
        if self.next_underflow == target {
            return;
        }
        let period = self.period();
        let reloads = (target - self.next_underflow - 1) / period;
        self.basis = self.next_underflow + 1 + reloads * period;
        self.count = self.latch;
        self.recompute_next_underflow();
    }

    /// The same counter re-expressed with its basis at `clock`.
    ///
    /// An underflow exactly at `clock` stays visible (count 0, underflow at `clock`).
    pub fn carried_to(&self, clock: Clock) -> TimerState {
        let mut next = *self;
        if self.running && self.one_shot && self.next_underflow < clock {
            next.running = false;
            next.count = 0;
        } else {
            next.count = self.value_at(clock);
        }
        next.basis = clock;
        next.recompute_next_underflow();
        next
    }

    /// Shift every absolute clock down by `sub`.
    pub fn rebase(&mut self, sub: Clock) {
        self.basis = crate::clock::rebase(self.basis, sub);
        self.next_underflow = crate::clock::rebase(self.next_underflow, sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(basis: Clock, count: u16, latch: u16) -> TimerState {
        let mut st = TimerState::power_on(basis);
        st.count = count;
        st.latch = latch;
        st.running = true;
        st.recompute_next_underflow();
        st
    }

    #[test]
    fn test_stopped_value_is_frozen() {
        let mut st = TimerState::power_on(0);
        st.count = 0x1234;
        assert_eq!(st.value_at(0), 0x1234);
        assert_eq!(st.value_at(100_000), 0x1234);
    }

    #[test]
    fn test_value_wraps_through_latch() {
        let st = running(0, 3, 9);
        assert_eq!(st.next_underflow, 3);
        assert_eq!(st.value_at(1), 2);
        assert_eq!(st.value_at(3), 0);
        assert_eq!(st.value_at(4), 9);
        assert_eq!(st.value_at(13), 0);
        assert_eq!(st.value_at(14), 9);
    }

    #[test]
    fn test_underflow_at_basis_is_legal() {
        let st = running(50, 0, 4);
        assert_eq!(st.next_underflow, 50);
        assert_eq!(st.value_at(50), 0);
        assert_eq!(st.underflows_between(49, 50), 1);
        assert_eq!(st.underflows_between(49, 60), 3);
    }

    #[test]
    fn test_underflows_between_excludes_lower_bound() {
        let st = running(0, 9, 9);
        assert_eq!(st.underflows_between(0, 35), 3);
        assert_eq!(st.underflows_between(9, 35), 2);
        assert_eq!(st.underflows_between(9, 9), 0);
        assert_eq!(st.next_underflow_after(9), 19);
    }

    #[test]
    fn test_settle_moves_basis_to_last_reload() {
        let mut st = running(0, 9, 9);
        st.settle(35);
        assert_eq!(st.basis, 30);
        assert_eq!(st.count, 9);
        assert_eq!(st.next_underflow, 39);
        assert_eq!(st.value_at(35), 4);
    }

    #[test]
    fn test_settle_on_underflow_keeps_it_visible() {
        let mut st = running(0, 3, 9);
        st.settle(13);
        assert_eq!(st.next_underflow, 13);
        assert_eq!(st.value_at(13), 0);
        assert_eq!(st.value_at(14), 9);
    }

    #[test]
    fn test_settle_stops_one_shot() {
        let mut st = running(10, 5, 5);
        st.one_shot = true;
        st.settle(40);
        assert!(!st.running);
        assert_eq!(st.count, 0);
        assert_eq!(st.next_underflow, CLOCK_NEVER);
        assert_eq!(st.value_at(41), 0);
    }

    #[test]
    fn test_carried_to_preserves_value_function() {
        let st = running(0, 3, 9);
        let moved = st.carried_to(21);
        for clock in 21..80 {
            assert_eq!(moved.value_at(clock), st.value_at(clock), "clock {}", clock);
        }
        assert_eq!(moved.next_underflow_after(21), st.next_underflow_after(21));
    }
}
