//! Countdown derivation under clock drift and network latency.
//!
//! The displayed value for a deadline is
//! `floor((deadline - now + drift_offset - latency / 2) / 1s)`, clamped at zero, and never
//! increases while the deadline stays the same.

use time::{Duration, OffsetDateTime};

use crate::state::connection::ConnectionQuality;

/// Largest drift estimate applied to the countdown.
pub const MAX_APPLIED_DRIFT: Duration = Duration::seconds(5);
/// Gap between recomputes after which a degraded link flags the reading.
pub const INACCURACY_GAP: Duration = Duration::seconds(10);

/// Countdown value published to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountdownReading {
    /// Whole seconds left; `None` when there is neither a deadline nor a fallback value.
    pub remaining_secs: Option<u64>,
    pub deadline: Option<OffsetDateTime>,
    /// Advisory flag raised when recomputes were delayed on a degraded link.
    pub may_be_inaccurate: bool,
}

/// Raised once when the device clock is too far from the server clock to be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftAdvisory {
    pub estimated_drift_ms: i64,
}

impl DriftAdvisory {
    pub fn message(&self) -> String {
        format!(
            "device clock differs from server by {:.1} s",
            self.estimated_drift_ms as f64 / 1_000.0
        )
    }
}

/// Per-agent countdown state.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    drift_offset_ms: i64,
    drift_advisory_sent: bool,
    current_deadline: Option<OffsetDateTime>,
    last_value: Option<u64>,
    last_recompute: Option<OffsetDateTime>,
    may_be_inaccurate: bool,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drift offset currently applied, in milliseconds.
    pub fn drift_offset_ms(&self) -> i64 {
        self.drift_offset_ms
    }

    /// Feed the server time reported by a probe.
    ///
    /// `received_at` is the local time at which the reply arrived and `latency_ms` the
    /// measured round trip. Estimates beyond [`MAX_APPLIED_DRIFT`] are not applied.
    pub fn observe_server_time(
        &mut self,
        server_time: OffsetDateTime,
        latency_ms: u64,
        received_at: OffsetDateTime,
    ) -> Option<DriftAdvisory> {
        let one_way = Duration::milliseconds(i64::try_from(latency_ms / 2).unwrap_or(i64::MAX));
        let estimate = received_at - (server_time + one_way);
        let estimated_drift_ms = estimate.whole_milliseconds() as i64;

        if estimate.abs() <= MAX_APPLIED_DRIFT {
            self.drift_offset_ms = estimated_drift_ms;
            return None;
        }

        if self.drift_advisory_sent {
            return None;
        }
        self.drift_advisory_sent = true;
        Some(DriftAdvisory { estimated_drift_ms })
    }

    /// Recompute the countdown.
    ///
    /// `fallback_secs` is the server-pushed value used when there is no deadline.
    pub fn compute(
        &mut self,
        deadline: Option<OffsetDateTime>,
        fallback_secs: Option<u64>,
        now: OffsetDateTime,
        latency_ms: Option<u64>,
        quality: ConnectionQuality,
    ) -> CountdownReading {
        let delayed = self
            .last_recompute
            .is_some_and(|previous| now - previous > INACCURACY_GAP);
        if delayed && quality != ConnectionQuality::Excellent {
            self.may_be_inaccurate = true;
        }
        if quality == ConnectionQuality::Excellent {
            self.may_be_inaccurate = false;
        }
        self.last_recompute = Some(now);

        if deadline != self.current_deadline {
            self.current_deadline = deadline;
            self.last_value = None;
        }

        let remaining_secs = match deadline {
            Some(deadline) => {
                let value = self.remaining(deadline, now, latency_ms.unwrap_or(0));
                let value = match self.last_value {
                    Some(previous) => value.min(previous),
                    None => value,
                };
                self.last_value = Some(value);
                Some(value)
            }
            None => fallback_secs,
        };

        CountdownReading {
            remaining_secs,
            deadline,
            may_be_inaccurate: self.may_be_inaccurate,
        }
    }

    fn remaining(&self, deadline: OffsetDateTime, now: OffsetDateTime, latency_ms: u64) -> u64 {
        let half_latency = i64::try_from(latency_ms / 2).unwrap_or(i64::MAX);
        let millis = (deadline - now).whole_milliseconds() as i64 + self.drift_offset_ms
            - half_latency;
        if millis <= 0 {
            0
        } else {
            (millis / 1_000) as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    #[test]
    fn countdown_decreases_by_one_each_second_and_holds_at_zero() {
        let mut clock = ClockSync::new();
        let deadline = NOW + Duration::seconds(3);

        let values: Vec<Option<u64>> = (0..6)
            .map(|second| {
                clock
                    .compute(
                        Some(deadline),
                        None,
                        NOW + Duration::seconds(second),
                        Some(0),
                        ConnectionQuality::Excellent,
                    )
                    .remaining_secs
            })
            .collect();

        assert_eq!(values, vec![Some(3), Some(2), Some(1), Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn half_of_the_latency_is_subtracted() {
        let mut clock = ClockSync::new();
        let deadline = NOW + Duration::seconds(10);

        let reading = clock.compute(
            Some(deadline),
            None,
            NOW,
            Some(1_000),
            ConnectionQuality::Good,
        );

        assert_eq!(reading.remaining_secs, Some(9));
    }

    #[test]
    fn value_never_increases_for_the_same_deadline() {
        let mut clock = ClockSync::new();
        let deadline = NOW + Duration::seconds(30);

        let first = clock.compute(Some(deadline), None, NOW, Some(4_000), ConnectionQuality::Poor);
        let second = clock.compute(Some(deadline), None, NOW, Some(0), ConnectionQuality::Excellent);
        let reset = clock.compute(
            Some(deadline + Duration::seconds(60)),
            None,
            NOW,
            Some(0),
            ConnectionQuality::Excellent,
        );

        assert_eq!(first.remaining_secs, Some(28));
        assert_eq!(second.remaining_secs, Some(28));
        assert_eq!(reset.remaining_secs, Some(90));
    }

    #[test]
    fn fallback_value_is_used_without_a_deadline() {
        let mut clock = ClockSync::new();

        let pushed = clock.compute(None, Some(17), NOW, None, ConnectionQuality::Excellent);
        let absent = clock.compute(None, None, NOW, None, ConnectionQuality::Excellent);

        assert_eq!(pushed.remaining_secs, Some(17));
        assert_eq!(absent.remaining_secs, None);
    }

    #[test]
    fn long_gap_on_degraded_link_flags_the_reading_until_quality_recovers() {
        let mut clock = ClockSync::new();
        let deadline = NOW + Duration::seconds(60);

        clock.compute(Some(deadline), None, NOW, Some(0), ConnectionQuality::Poor);
        let late = clock.compute(
            Some(deadline),
            None,
            NOW + Duration::seconds(12),
            Some(0),
            ConnectionQuality::Poor,
        );
        let recovered = clock.compute(
            Some(deadline),
            None,
            NOW + Duration::seconds(13),
            Some(0),
            ConnectionQuality::Excellent,
        );

        assert!(late.may_be_inaccurate);
        assert!(!recovered.may_be_inaccurate);
    }

    #[test]
    fn small_drift_is_applied_to_the_countdown() {
        let mut clock = ClockSync::new();
        // local clock runs two seconds ahead of the server
        let advisory = clock.observe_server_time(NOW - Duration::seconds(2), 0, NOW);

        let reading = clock.compute(
            Some(NOW + Duration::seconds(10)),
            None,
            NOW,
            Some(0),
            ConnectionQuality::Excellent,
        );

        assert_eq!(advisory, None);
        assert_eq!(clock.drift_offset_ms(), 2_000);
        assert_eq!(reading.remaining_secs, Some(12));
    }

    #[test]
    fn large_drift_is_not_applied_and_advises_once() {
        let mut clock = ClockSync::new();

        let first = clock.observe_server_time(NOW + Duration::seconds(8), 200, NOW);
        let second = clock.observe_server_time(NOW + Duration::seconds(8), 200, NOW);

        let advisory = first.expect("drift advisory");
        assert_eq!(advisory.estimated_drift_ms, -8_100);
        assert_eq!(second, None);
        assert_eq!(clock.drift_offset_ms(), 0);
    }
}
