use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    services::{
        advance_service, cleanup_service, clock_service, connection_monitor, polling_service,
        round_service, sse_events, watchdog_service,
    },
    state::SharedState,
};

/// Owns every coordination task of an agent. Dropping the handle aborts them all, so no
/// timer outlives the agent.
pub struct CoordinatorHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Spawn the refresher, timer loops and advance loop, then request the first snapshot.
    pub fn spawn(state: SharedState) -> Self {
        let tasks = vec![
            tokio::spawn(round_service::run_refresher(state.clone())),
            tokio::spawn(clock_service::run(state.clone())),
            tokio::spawn(connection_monitor::run(state.clone())),
            tokio::spawn(watchdog_service::run(state.clone())),
            tokio::spawn(polling_service::run(state.clone())),
            tokio::spawn(cleanup_service::run(state.clone())),
            tokio::spawn(advance_service::run(state.clone())),
            tokio::spawn(forward_degraded_changes(state.clone())),
        ];
        state.request_refresh();
        info!(tasks = tasks.len(), "coordination tasks started");
        Self { tasks }
    }

    /// Abort every task and wait for them to wind down.
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("coordination tasks stopped");
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn forward_degraded_changes(state: SharedState) {
    let mut degraded = state.degraded_watcher();
    while degraded.changed().await.is_ok() {
        let value = *degraded.borrow_and_update();
        sse_events::broadcast_system_status(&state, value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::AppConfig, services::test_support::Harness};

    #[tokio::test(start_paused = true)]
    async fn spawn_fetches_first_snapshot_and_shutdown_stops_tasks() {
        let harness = Harness::host(AppConfig::default()).await;

        let coordinator = CoordinatorHandle::spawn(harness.state.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.state.snapshot().is_some());

        let handles: Vec<_> = coordinator.tasks.iter().map(|task| task.abort_handle()).collect();
        coordinator.shutdown().await;
        assert!(handles.iter().all(|handle| handle.is_finished()));
    }
}
