//! Injectable wall clock so timers, deadlines and drift logic can be driven deterministically.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use time::OffsetDateTime;

/// Source of wall-clock time used for deadlines and freshness bookkeeping.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> OffsetDateTime;
}

/// Shared handle to a time source.
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Time source backed by the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Time source that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<OffsetDateTime>,
}

impl ManualTimeSource {
    /// Start the manual clock at `start`.
    pub fn new(start: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: OffsetDateTime) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = to;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared system clock.
pub fn system() -> SharedTimeSource {
    Arc::new(SystemTimeSource)
}
