use std::future::Future;

use crate::{
    error::ServiceError,
    state::{Plan, SharedState, state_machine::RoundEvent},
};

/// Run an advance request as a planned transition, then ask for a fresh snapshot so the
/// store's outcome replaces the locally planned phase.
///
/// The refresh is only requested on success; a failed request leaves the cached view alone.
pub async fn run_transition_with_refresh<F, Fut, T>(
    state: &SharedState,
    event: RoundEvent,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce(Plan) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let value = state.run_transition(event, work).await?;
    state.request_refresh();
    Ok(value)
}
