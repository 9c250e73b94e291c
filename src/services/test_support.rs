//! Fixtures shared by the service tests.

use std::sync::Arc;

use time::macros::datetime;
use uuid::Uuid;

use crate::{
    config::{AgentIdentity, AppConfig},
    dao::{models::PhaseEntity, round_store::memory::MemoryRoundStore},
    services::round_service,
    state::{
        AppState, SharedState,
        time_source::{ManualTimeSource, TimeSource},
    },
};

pub(crate) struct Harness {
    pub state: SharedState,
    pub store: MemoryRoundStore,
    pub clock: Arc<ManualTimeSource>,
    pub table_id: Uuid,
    pub round_id: Uuid,
}

impl Harness {
    /// Agent acting as the host of a fresh table whose first round waits in the lobby.
    pub async fn host(config: AppConfig) -> Self {
        let clock = ManualTimeSource::new(datetime!(2026-03-01 18:00:00 UTC));
        let store = MemoryRoundStore::new(clock.clone());
        let identity = AgentIdentity {
            table_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
        };
        let round = store
            .create_table(identity.table_id, "Friday", identity.participant_id, "host", true)
            .await;

        let state = AppState::new(config, identity, clock.clone());
        state.install_round_store(Arc::new(store.clone())).await;

        Self {
            state,
            store,
            clock,
            table_id: identity.table_id,
            round_id: round.id,
        }
    }

    /// Second agent at the same table, sharing the store and the clock.
    pub async fn guest(&self) -> SharedState {
        let identity = AgentIdentity {
            table_id: self.table_id,
            participant_id: Uuid::new_v4(),
        };
        self.store
            .join_table(self.table_id, identity.participant_id, "guest");
        let state = AppState::new(self.state.config().clone(), identity, self.clock.clone());
        state.install_round_store(Arc::new(self.store.clone())).await;
        state
    }

    /// Overwrite the current round's phase and refresh the host's view.
    pub async fn force_phase(&self, phase: PhaseEntity) {
        let mut round = self
            .store
            .rounds_of(self.table_id)
            .await
            .pop()
            .expect("table has a round");
        round.phase = phase;
        round.deadline = match phase {
            PhaseEntity::Suggest | PhaseEntity::Vote => {
                Some(self.clock.now() + std::time::Duration::from_secs(30))
            }
            PhaseEntity::Lobby | PhaseEntity::Result => None,
        };
        self.store.put_round(round).await;
        round_service::refresh(&self.state)
            .await
            .expect("refresh succeeds");
    }
}
