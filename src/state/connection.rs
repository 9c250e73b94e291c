use std::time::Duration;

use time::OffsetDateTime;

/// Round-trip time at or above which the link is considered poor.
pub const POOR_RTT: Duration = Duration::from_millis(2_000);
/// Round-trip time at or above which the link is considered good rather than excellent.
pub const GOOD_RTT: Duration = Duration::from_millis(500);

/// Coarse quality of the link to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Disconnected,
}

impl ConnectionQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Disconnected => "disconnected",
        }
    }
}

/// Classify a probe; `None` means unreachable or offline.
pub fn classify(rtt: Option<Duration>) -> ConnectionQuality {
    match rtt {
        None => ConnectionQuality::Disconnected,
        Some(rtt) if rtt >= POOR_RTT => ConnectionQuality::Poor,
        Some(rtt) if rtt >= GOOD_RTT => ConnectionQuality::Good,
        Some(_) => ConnectionQuality::Excellent,
    }
}

/// Result of one connection probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSample {
    pub latency_ms: Option<u64>,
    pub quality: ConnectionQuality,
    /// Local wall-clock time at which the probe completed.
    pub sampled_at: OffsetDateTime,
    /// Server time reported by the probe, used for drift estimation.
    pub server_time: Option<OffsetDateTime>,
    pub warnings: Vec<String>,
}

impl ConnectionSample {
    /// Sample for a successful probe.
    pub fn measured(rtt: Duration, server_time: OffsetDateTime, sampled_at: OffsetDateTime) -> Self {
        let quality = classify(Some(rtt));
        let mut warnings = Vec::new();
        if quality == ConnectionQuality::Poor {
            warnings.push(format!("high latency ({} ms)", rtt.as_millis()));
        }
        Self {
            latency_ms: Some(u64::try_from(rtt.as_millis()).unwrap_or(u64::MAX)),
            quality,
            sampled_at,
            server_time: Some(server_time),
            warnings,
        }
    }

    /// Sample for an unreachable store or an offline device.
    pub fn disconnected(reason: impl Into<String>, sampled_at: OffsetDateTime) -> Self {
        Self {
            latency_ms: None,
            quality: ConnectionQuality::Disconnected,
            sampled_at,
            server_time: None,
            warnings: vec![reason.into()],
        }
    }

    /// Sample assumed before the first probe completes.
    pub fn assumed(sampled_at: OffsetDateTime) -> Self {
        Self {
            latency_ms: None,
            quality: ConnectionQuality::Excellent,
            sampled_at,
            server_time: None,
            warnings: Vec::new(),
        }
    }
}

/// One-shot notices raised on quality edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAdvisory {
    /// Quality dropped from excellent to poor.
    Degraded,
    /// The store became unreachable.
    Lost,
}

impl ConnectionAdvisory {
    pub fn message(self) -> &'static str {
        match self {
            ConnectionAdvisory::Degraded => "connection quality degraded",
            ConnectionAdvisory::Lost => "connection lost",
        }
    }
}

/// Tracks quality transitions and decides when an advisory is due.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    last: ConnectionQuality,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self {
            last: ConnectionQuality::Excellent,
        }
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.last
    }

    /// Record a new sample, returning the advisory its transition triggers.
    pub fn record(&mut self, sample: &ConnectionSample) -> Option<ConnectionAdvisory> {
        let previous = std::mem::replace(&mut self.last, sample.quality);
        match (previous, sample.quality) {
            (ConnectionQuality::Disconnected, ConnectionQuality::Disconnected) => None,
            (_, ConnectionQuality::Disconnected) => Some(ConnectionAdvisory::Lost),
            (ConnectionQuality::Excellent, ConnectionQuality::Poor) => {
                Some(ConnectionAdvisory::Degraded)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2026-03-01 18:00:00 UTC);

    fn sample(rtt_ms: u64) -> ConnectionSample {
        ConnectionSample::measured(Duration::from_millis(rtt_ms), NOW, NOW)
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(None), ConnectionQuality::Disconnected);
        assert_eq!(classify(Some(Duration::from_millis(2_000))), ConnectionQuality::Poor);
        assert_eq!(classify(Some(Duration::from_millis(1_999))), ConnectionQuality::Good);
        assert_eq!(classify(Some(Duration::from_millis(500))), ConnectionQuality::Good);
        assert_eq!(classify(Some(Duration::from_millis(499))), ConnectionQuality::Excellent);
    }

    #[test]
    fn slow_probe_followed_by_fast_probe_fires_exactly_one_advisory() {
        let mut monitor = ConnectionMonitor::new();

        let advisories: Vec<_> = [sample(2_200), sample(100)]
            .iter()
            .filter_map(|sample| monitor.record(sample))
            .collect();

        assert_eq!(advisories, vec![ConnectionAdvisory::Degraded]);
        assert_eq!(monitor.quality(), ConnectionQuality::Excellent);
    }

    #[test]
    fn lost_advisory_is_not_repeated_while_disconnected() {
        let mut monitor = ConnectionMonitor::new();

        let first = monitor.record(&ConnectionSample::disconnected("probe timed out", NOW));
        let second = monitor.record(&ConnectionSample::disconnected("probe timed out", NOW));

        assert_eq!(first, Some(ConnectionAdvisory::Lost));
        assert_eq!(second, None);
    }

    #[test]
    fn persistent_poor_quality_does_not_repeat_the_degraded_advisory() {
        let mut monitor = ConnectionMonitor::new();

        assert_eq!(monitor.record(&sample(2_500)), Some(ConnectionAdvisory::Degraded));
        assert_eq!(monitor.record(&sample(3_000)), None);
        assert!(sample(3_000).warnings[0].contains("3000"));
    }
}
