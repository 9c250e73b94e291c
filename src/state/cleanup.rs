use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tokio::time::Instant;

/// Why a cleanup run was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CleanupRefusal {
    #[error("a cleanup run is already in progress")]
    InFlight,
    #[error("cleanup ran {elapsed:?} ago; wait at least {min_spacing:?} between runs")]
    TooSoon {
        elapsed: Duration,
        min_spacing: Duration,
    },
}

/// Rate limit shared by the periodic and manual cleanup runs.
#[derive(Debug, Clone)]
pub struct CleanupGate {
    min_spacing: Duration,
    last_started: Option<Instant>,
    in_flight: bool,
}

impl CleanupGate {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_started: None,
            in_flight: false,
        }
    }

    /// Claim a run starting at `now`.
    pub fn try_begin(&mut self, now: Instant) -> Result<(), CleanupRefusal> {
        if self.in_flight {
            return Err(CleanupRefusal::InFlight);
        }
        if let Some(last) = self.last_started {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_spacing {
                return Err(CleanupRefusal::TooSoon {
                    elapsed,
                    min_spacing: self.min_spacing,
                });
            }
        }
        self.in_flight = true;
        self.last_started = Some(now);
        Ok(())
    }

    /// Release the in-flight claim.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    /// Claim a run on a shared gate; the claim is released when the returned guard drops,
    /// including when the run is cancelled midway.
    pub fn claim(gate: &Mutex<CleanupGate>, now: Instant) -> Result<CleanupClaim<'_>, CleanupRefusal> {
        gate.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_begin(now)?;
        Ok(CleanupClaim { gate })
    }
}

/// In-flight cleanup run on a shared [`CleanupGate`].
#[must_use = "the run is released as soon as the claim drops"]
pub struct CleanupClaim<'a> {
    gate: &'a Mutex<CleanupGate>,
}

impl Drop for CleanupClaim<'_> {
    fn drop(&mut self) {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish();
    }
}
