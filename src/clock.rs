//! Virtual clock values shared by the CPU loop, the alarm context and the timers.

/// Absolute cycle count of the emulated machine.
pub type Clock = u64;

/// Reserved clock value meaning "no pending event".
pub const CLOCK_NEVER: Clock = Clock::MAX;

/// Subtract `sub` from an absolute clock, leaving `CLOCK_NEVER` alone.
pub fn rebase(clock: Clock, sub: Clock) -> Clock {
    if clock == CLOCK_NEVER {
        clock
    } else {
        debug_assert!(clock >= sub, "rebase of clock {} by {} underflows", clock, sub);
        clock.saturating_sub(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_keeps_never() {
        assert_eq!(rebase(CLOCK_NEVER, 1000), CLOCK_NEVER);
        assert_eq!(rebase(5000, 1000), 4000);
    }
}
