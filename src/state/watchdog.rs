use std::time::Duration;

use time::OffsetDateTime;

use crate::state::connection::ConnectionQuality;

/// Freshness of the cached table view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogState {
    pub last_fresh_at: OffsetDateTime,
    pub is_stale: bool,
    pub is_panic: bool,
}

/// Escalations produced by one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogEscalation {
    pub entered_stale: bool,
    pub entered_panic: bool,
}

impl WatchdogEscalation {
    pub fn is_empty(&self) -> bool {
        !self.entered_stale && !self.entered_panic
    }
}

/// Escalates `fresh -> stale -> panic` as the view ages without a refresh.
#[derive(Debug, Clone)]
pub struct Watchdog {
    state: WatchdogState,
    stale_after: Duration,
    panic_after: Duration,
}

impl Watchdog {
    pub fn new(now: OffsetDateTime, stale_after: Duration, panic_after: Duration) -> Self {
        Self {
            state: WatchdogState {
                last_fresh_at: now,
                is_stale: false,
                is_panic: false,
            },
            stale_after,
            panic_after,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Record fresh data, clearing both flags.
    pub fn mark_fresh(&mut self, now: OffsetDateTime) {
        self.state = WatchdogState {
            last_fresh_at: now,
            is_stale: false,
            is_panic: false,
        };
    }

    /// Evaluate the elapsed time since the last fresh data.
    ///
    /// Thresholds double while the link is poor. Each flag is entered at most once until the
    /// next [`Watchdog::mark_fresh`].
    pub fn evaluate(&mut self, now: OffsetDateTime, quality: ConnectionQuality) -> WatchdogEscalation {
        let factor = if quality == ConnectionQuality::Poor { 2 } else { 1 };
        let stale_after = self.stale_after * factor;
        let panic_after = self.panic_after * factor;
        let elapsed = now - self.state.last_fresh_at;

        let mut escalation = WatchdogEscalation::default();
        if elapsed > panic_after {
            if !self.state.is_stale {
                self.state.is_stale = true;
                escalation.entered_stale = true;
            }
            if !self.state.is_panic {
                self.state.is_panic = true;
                escalation.entered_panic = true;
            }
        } else if elapsed > stale_after && !self.state.is_stale {
            self.state.is_stale = true;
            escalation.entered_stale = true;
        }
        escalation
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const START: OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    fn watchdog() -> Watchdog {
        Watchdog::new(START, Duration::from_secs(20), Duration::from_secs(45))
    }

    fn at(secs: i64) -> OffsetDateTime {
        START + time::Duration::seconds(secs)
    }

    #[test]
    fn escalates_fresh_stale_panic_once_each() {
        let mut watchdog = watchdog();

        let escalations: Vec<WatchdogEscalation> = (0..=60)
            .step_by(2)
            .map(|secs| watchdog.evaluate(at(secs), ConnectionQuality::Excellent))
            .collect();

        let stale_count = escalations.iter().filter(|e| e.entered_stale).count();
        let panic_count = escalations.iter().filter(|e| e.entered_panic).count();
        assert_eq!(stale_count, 1);
        assert_eq!(panic_count, 1);
        assert!(watchdog.state().is_stale && watchdog.state().is_panic);
    }

    #[test]
    fn mark_fresh_resets_both_flags() {
        let mut watchdog = watchdog();
        watchdog.evaluate(at(50), ConnectionQuality::Excellent);

        watchdog.mark_fresh(at(51));
        let after = watchdog.evaluate(at(52), ConnectionQuality::Excellent);

        assert!(after.is_empty());
        assert!(!watchdog.state().is_stale);
        assert!(!watchdog.state().is_panic);
    }

    #[test]
    fn jumping_straight_past_panic_enters_stale_too() {
        let mut watchdog = watchdog();

        let escalation = watchdog.evaluate(at(46), ConnectionQuality::Good);

        assert!(escalation.entered_stale);
        assert!(escalation.entered_panic);
    }

    #[test]
    fn poor_link_doubles_thresholds() {
        let mut watchdog = watchdog();

        assert!(watchdog.evaluate(at(30), ConnectionQuality::Poor).is_empty());
        assert!(watchdog.evaluate(at(41), ConnectionQuality::Poor).entered_stale);
    }
}
