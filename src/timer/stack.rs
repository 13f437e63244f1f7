use super::state::TimerState;
use crate::clock::{Clock, CLOCK_NEVER};
use crate::debug_flags;

/// Maximum number of states a timer can hold. A control write pushes at most three.
pub const STACK_DEPTH: usize = 4;

/// What a pending entry changes relative to the entry before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Change {
    pub one_shot: Option<bool>,
    /// New `(running, cascade)` pair.
    pub counting: Option<(bool, bool)>,
    /// Counter reloads from the latch.
    pub load: bool,
}

impl Change {
    pub fn mode(one_shot: bool) -> Self {
        Self {
            one_shot: Some(one_shot),
            ..Self::default()
        }
    }

    pub fn counting(running: bool, cascade: bool) -> Self {
        Self {
            counting: Some((running, cascade)),
            ..Self::default()
        }
    }

    pub fn load(running: bool, cascade: bool) -> Self {
        Self {
            load: true,
            ..Self::counting(running, cascade)
        }
    }

    /// `self` followed by `next` at the same clock.
    fn then(self, next: Change) -> Change {
        Change {
            one_shot: next.one_shot.or(self.one_shot),
            counting: next.counting.or(self.counting),
            load: self.load || next.load,
        }
    }

    /// The state `prev` turns into at `basis`.
    pub fn apply(&self, prev: &TimerState, basis: Clock) -> TimerState {
        let mut st = prev.carried_to(basis);
        if let Some(one_shot) = self.one_shot {
            st.one_shot = one_shot;
        }
        if self.load {
            st.count = st.latch;
        }
        if let Some((running, cascade)) = self.counting {
            st.running = running;
            st.cascade = cascade;
        }
        st.recompute_next_underflow();
        st
    }
}

/// Timer states ordered by strictly increasing `basis`.
///
/// Entry 0 is the state in effect at the last update; later entries are changes
/// that become effective in the future. Each later entry is kept together with
/// the `Change` that produced it, so it can be derived again when an earlier
/// entry is modified in place.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: [TimerState; STACK_DEPTH],
    changes: [Change; STACK_DEPTH],
    len: usize,
}

impl HistoryStack {
    pub fn new(initial: TimerState) -> Self {
        Self {
            entries: [initial; STACK_DEPTH],
            changes: [Change::default(); STACK_DEPTH],
            len: 1,
        }
    }

    /// Drop all history and start over from `initial`.
    pub fn reset(&mut self, initial: TimerState) {
        self.entries[0] = initial;
        self.changes[0] = Change::default();
        self.len = 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn entries(&self) -> &[TimerState] {
        &self.entries[..self.len]
    }

    pub fn current(&self) -> &TimerState {
        &self.entries[0]
    }

    /// Entry 0 for in-place modification. Call `rederive` afterwards.
    pub fn current_mut(&mut self) -> &mut TimerState {
        &mut self.entries[0]
    }

    /// The newest state whose basis is at or before `clock`.
    pub fn state_at(&self, clock: Clock) -> TimerState {
        self.entries()
            .iter()
            .rev()
            .find(|st| st.basis <= clock)
            .copied()
            .unwrap_or(self.entries[0])
    }

    /// Record `change` effective from `basis`.
    ///
    /// Entries after that basis are speculative and get discarded; an entry at
    /// exactly that basis absorbs the change.
    pub fn push(&mut self, basis: Clock, change: Change) {
        let at = self
            .entries()
            .iter()
            .position(|st| st.basis >= basis)
            .unwrap_or(self.len);

        let mut change = change;
        if at == 0 {
            self.entries[0] = change.apply(&self.entries[0], basis);
            self.len = 1;
        } else {
            if at < self.len && self.entries[at].basis == basis {
                change = self.changes[at].then(change);
            }
            self.len = at;
            if self.len == STACK_DEPTH {
                debug_assert!(false, "timer history overflow at clock {}", basis);
                log::warn!("timer history overflow at clock {}, merging into newest entry", basis);
                self.len -= 1;
                change = self.changes[self.len].then(change);
            }
            self.entries[self.len] = change.apply(&self.entries[self.len - 1], basis);
            self.changes[self.len] = change;
            self.len += 1;
        }

        if debug_flags::trace_timer() {
            let st = self.state_at(basis);
            log::trace!(
                "push: basis={} count={} latch={} run={} oneshot={} cascade={} -> depth {}",
                st.basis,
                st.count,
                st.latch,
                st.running,
                st.one_shot,
                st.cascade,
                self.len
            );
        }
    }

    /// Derive every pending entry again from the one before it.
    pub fn rederive(&mut self) {
        for i in 1..self.len {
            let basis = self.entries[i].basis;
            self.entries[i] = self.changes[i].apply(&self.entries[i - 1], basis);
        }
    }

    /// Collapse everything effective at or before `target` into entry 0 and
    /// count the underflows in `(after, target]`.
    ///
    /// An underflow falling exactly on the basis of the next state is counted,
    /// whatever that state does with the counter, but never twice.
    pub fn fold(&mut self, after: Clock, target: Clock) -> u32 {
        let mut underflows = 0u32;
        let mut lo = after;
        let mut drop = 0;
        while drop + 1 < self.len && self.entries[drop + 1].basis <= target {
            let edge = self.entries[drop + 1].basis;
            let st = &self.entries[drop];
            underflows = underflows.saturating_add(st.underflows_between(lo, edge));
            lo = if edge > lo && st.next_underflow_after(edge - 1) == edge {
                edge
            } else {
                lo.max(edge.saturating_sub(1))
            };
            drop += 1;
        }
        if drop > 0 {
            self.entries.copy_within(drop..self.len, 0);
            self.changes.copy_within(drop..self.len, 0);
            self.len -= drop;
        }

        underflows = underflows.saturating_add(self.entries[0].underflows_between(lo, target));
        self.entries[0].settle(target);

        if debug_flags::trace_timer() && (drop > 0 || underflows > 0) {
            log::trace!(
                "fold to {}: dropped {} states, {} underflows, depth {}",
                target,
                drop,
                underflows,
                self.len
            );
        }
        underflows
    }

    /// Earliest underflow after `after` that `fold` will count.
    ///
    /// A later state takes over once it becomes valid strictly before the
    /// candidate underflow of the state it replaces.
    pub fn next_underflow(&self, after: Clock) -> Clock {
        let mut next = CLOCK_NEVER;
        for st in self.entries() {
            if st.basis < next {
                next = st.next_underflow_after(after);
            }
        }
        next
    }

    /// Latch register update; a stopped phi2 counter mirrors the latch.
    pub fn set_latch(&mut self, update: impl Fn(u16) -> u16) {
        let st = &mut self.entries[0];
        st.latch = update(st.latch);
        if !st.running && !st.cascade {
            st.count = st.latch;
        }
        self.rederive();
    }

    /// Re-express entry 0 from `clock` so its basis survives a rebase.
    pub fn anchor(&mut self, clock: Clock) {
        self.entries[0] = self.entries[0].carried_to(clock);
    }

    pub fn rebase(&mut self, sub: Clock) {
        for st in &mut self.entries[..self.len] {
            st.rebase(sub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(basis: Clock, count: u16, running: bool) -> TimerState {
        let mut st = TimerState::power_on(basis);
        st.latch = 9;
        st.count = count;
        st.running = running;
        st.recompute_next_underflow();
        st
    }

    const RUN: Change = Change {
        one_shot: None,
        counting: Some((true, false)),
        load: false,
    };
    const STOP: Change = Change {
        one_shot: None,
        counting: Some((false, false)),
        load: false,
    };

    #[test]
    fn test_push_discards_later_entries() {
        let mut stack = HistoryStack::new(at(0, 9, false));
        stack.push(10, RUN);
        stack.push(12, STOP);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.entries()[2].count, 7);

        stack.push(11, STOP);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.entries()[2].basis, 11);
        assert_eq!(stack.entries()[2].count, 8);
    }

    #[test]
    fn test_push_same_basis_composes() {
        let mut stack = HistoryStack::new(at(0, 9, false));
        stack.push(5, Change::load(false, false));
        stack.push(5, Change::mode(true));
        assert_eq!(stack.len(), 2);
        let st = stack.entries()[1];
        assert!(st.one_shot);
        assert!(!st.running);

        stack.push(0, Change::mode(true));
        assert_eq!(stack.len(), 1);
        assert!(stack.current().one_shot);
    }

    #[test]
    fn test_fold_keeps_only_effective_state() {
        let mut stack = HistoryStack::new(at(0, 9, false));
        stack.push(2, RUN);
        stack.push(30, STOP);

        let n = stack.fold(0, 25);
        assert_eq!(n, 2); // underflows at 11 and 21
        assert_eq!(stack.len(), 2);
        assert!(stack.current().running);
        assert_eq!(stack.current().value_at(25), 6);
    }

    #[test]
    fn test_fold_counts_underflow_on_next_basis() {
        let mut stack = HistoryStack::new(at(0, 3, true)); // underflows 3, 13, 23
        stack.push(13, STOP);

        assert_eq!(stack.fold(0, 40), 2);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.current().value_at(40), 0);
    }

    #[test]
    fn test_fold_counts_shared_underflow_once() {
        let mut stack = HistoryStack::new(at(0, 3, true));
        // the one-shot state starts on the underflow and inherits it
        stack.push(13, Change::mode(true));
        assert_eq!(stack.entries()[1].next_underflow, 13);

        assert_eq!(stack.fold(0, 40), 2);
        assert!(!stack.current().running);
        assert_eq!(stack.current().value_at(40), 0);
    }

    #[test]
    fn test_next_underflow_skips_replaced_states() {
        let mut stack = HistoryStack::new(at(0, 9, true)); // would underflow at 9
        stack.push(5, STOP);
        assert_eq!(stack.next_underflow(0), CLOCK_NEVER);

        let mut stack = HistoryStack::new(at(0, 3, true)); // underflows 3, 13
        stack.push(13, STOP);
        assert_eq!(stack.next_underflow(0), 3);
        assert_eq!(stack.next_underflow(3), 13);
        assert_eq!(stack.next_underflow(13), CLOCK_NEVER);
    }

    #[test]
    fn test_latch_mirrors_only_into_stopped_states() {
        let mut stack = HistoryStack::new(at(0, 9, false));
        stack.set_latch(|l| (l & 0xFF00) | 0x40);
        assert_eq!(stack.current().latch, 0x40);
        assert_eq!(stack.current().count, 0x40);

        let mut stack = HistoryStack::new(at(0, 9, true));
        stack.set_latch(|_| 0x1234);
        assert_eq!(stack.current().latch, 0x1234);
        assert_eq!(stack.current().count, 9);
    }

    #[test]
    fn test_pending_start_sees_mirrored_latch() {
        let mut stack = HistoryStack::new(at(0, 9, false));
        stack.push(2, RUN);
        stack.set_latch(|_| 20);
        assert_eq!(stack.entries()[1].count, 20);
        assert_eq!(stack.entries()[1].next_underflow, 22);
    }

    #[test]
    fn test_rederive_follows_modified_current_state() {
        let mut initial = at(0, 5, false);
        initial.cascade = true;
        let mut stack = HistoryStack::new(initial);
        stack.push(3, STOP);
        assert_eq!(stack.entries()[1].count, 5);

        stack.current_mut().count = 2;
        stack.rederive();
        assert_eq!(stack.entries()[1].count, 2);
        assert!(!stack.entries()[1].cascade);
    }
}
