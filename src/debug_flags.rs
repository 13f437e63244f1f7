use std::sync::OnceLock;

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

pub(crate) fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| match v.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => v.parse::<u16>().ok(),
    })
}

// Timer stack pushes, folds and read-backs (very noisy)
pub fn trace_timer() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("CIA_TRACE_TIMER", false))
}

// Alarm arm/unset and dispatch
pub fn trace_alarm() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("CIA_TRACE_ALARM", false))
}

// Register reads/writes on the timer block
pub fn trace_regs() -> bool {
    static ON: OnceLock<bool> = OnceLock::new();
    *ON.get_or_init(|| env_flag("CIA_TRACE_REGS", false) || env_flag("CIA_TRACE_TIMER", false))
}

/// Override for the start/stop latency, in cycles.
pub fn timer_delay() -> Option<u16> {
    static V: OnceLock<Option<u16>> = OnceLock::new();
    *V.get_or_init(|| env_u16("CIA_TIMER_DELAY"))
}

/// Override for the one-shot bit latency, in cycles.
pub fn oneshot_delay() -> Option<u16> {
    static V: OnceLock<Option<u16>> = OnceLock::new();
    *V.get_or_init(|| env_u16("CIA_ONESHOT_DELAY"))
}
