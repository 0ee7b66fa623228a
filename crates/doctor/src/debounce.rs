//! Double-interrupt detection
//!
//! One interrupt dumps diagnostics. A second interrupt arriving within
//! [`DEBOUNCE_WINDOW`] of the previous dump means "I really want to quit".
//!
//! There is no timer: the "recently triggered" state decays back to "armed"
//! purely by comparing timestamps when the next trigger arrives.

use std::time::{Duration, Instant};

/// Repeat triggers inside this window request an exit
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Exit status used when a repeat trigger lands inside the window
pub const DOUBLE_SIGNAL_EXIT_CODE: i32 = 2;

/// When the previous dump happened, if ever
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastTrigger {
    #[default]
    Unset,
    Set(Instant),
}

/// What to do with an incoming trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Run a diagnostics update
    Dump,
    /// Terminate the process with [`DOUBLE_SIGNAL_EXIT_CODE`]
    Exit,
}

impl LastTrigger {
    /// Decide how to handle a trigger arriving at `now`
    pub fn decide(&self, now: Instant) -> TriggerDecision {
        match self {
            LastTrigger::Unset => TriggerDecision::Dump,
            LastTrigger::Set(prev) => {
                if now.saturating_duration_since(*prev) < DEBOUNCE_WINDOW {
                    TriggerDecision::Exit
                } else {
                    TriggerDecision::Dump
                }
            }
        }
    }

    /// Record a completed dump at `at`, never moving backwards
    pub fn record(&mut self, at: Instant) {
        *self = match *self {
            LastTrigger::Set(prev) if prev > at => LastTrigger::Set(prev),
            _ => LastTrigger::Set(at),
        };
    }

    /// True when the next trigger at `now` would dump rather than exit
    pub fn is_armed(&self, now: Instant) -> bool {
        self.decide(now) == TriggerDecision::Dump
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_dumps() {
        let last = LastTrigger::default();
        assert_eq!(last, LastTrigger::Unset);
        assert_eq!(last.decide(Instant::now()), TriggerDecision::Dump);
    }

    #[test]
    fn test_repeat_inside_window_exits() {
        let t0 = Instant::now();
        let mut last = LastTrigger::Unset;
        last.record(t0);

        assert_eq!(last.decide(t0), TriggerDecision::Exit);
        assert_eq!(
            last.decide(t0 + Duration::from_millis(999)),
            TriggerDecision::Exit
        );
    }

    #[test]
    fn test_window_boundary_is_armed_again() {
        let t0 = Instant::now();
        let mut last = LastTrigger::Unset;
        last.record(t0);

        assert_eq!(last.decide(t0 + DEBOUNCE_WINDOW), TriggerDecision::Dump);
        assert!(last.is_armed(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_record_is_monotonic() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(3);
        let mut last = LastTrigger::Unset;

        last.record(later);
        last.record(t0);
        assert_eq!(last, LastTrigger::Set(later));
    }

    #[test]
    fn test_clock_before_previous_trigger_counts_as_repeat() {
        // A `now` earlier than the recorded trigger saturates to zero elapsed
        let t0 = Instant::now();
        let mut last = LastTrigger::Unset;
        last.record(t0 + Duration::from_secs(2));
        assert_eq!(last.decide(t0), TriggerDecision::Exit);
    }
}
