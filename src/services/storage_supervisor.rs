use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{round_store::RoundStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Connect to the store with exponential backoff, keeping the agent degraded until it succeeds.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoundStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(store) => {
                state.install_round_store(store).await;
                info!(attempt, "store connection established; leaving degraded mode");
                state.request_refresh();
                return;
            }
            Err(err) => {
                warn!(
                    attempt,
                    retry_in = ?delay,
                    error = %err,
                    "store connection attempt failed; staying in degraded mode"
                );
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
