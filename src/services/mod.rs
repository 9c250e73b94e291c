/// Advance requests, tie-breaks and the auto-advance countdown.
pub mod advance_service;
/// Periodic and manual store maintenance.
pub mod cleanup_service;
/// Local countdown ticking and drift handling.
pub mod clock_service;
/// Store reachability probes and connection advisories.
pub mod connection_monitor;
/// Owner of the coordination tasks.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Fixed-interval refresh fallback.
pub mod polling_service;
/// Read path, suggestions and votes.
pub mod round_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Store connection with retry and backoff.
pub mod storage_supervisor;
/// Stale-data watchdog loop.
pub mod watchdog_service;

#[cfg(test)]
pub(crate) mod test_support;
