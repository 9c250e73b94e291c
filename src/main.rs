//! Roundtable agent entrypoint wiring config, the store, the coordination tasks and the
//! local HTTP/SSE surface.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roundtable_agent::{
    config::{AgentIdentity, AppConfig, StoreKind},
    dao::round_store::{RoundStore, memory::MemoryRoundStore},
    routes,
    services::{coordinator::CoordinatorHandle, storage_supervisor},
    state::{AppState, SharedState, time_source},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let identity = AgentIdentity::from_env().context("reading agent identity")?;
    let store_kind = StoreKind::from_env().context("selecting store backend")?;
    let time = time_source::system();

    let app_state = AppState::new(config, identity, time.clone());
    info!(
        table_id = %identity.table_id,
        participant_id = %identity.participant_id,
        ?store_kind,
        "starting roundtable agent"
    );

    match store_kind {
        StoreKind::Memory => {
            let store = MemoryRoundStore::new(time);
            store
                .create_table(
                    identity.table_id,
                    "Demo table",
                    identity.participant_id,
                    "Host",
                    app_state.config().auto_advance_default,
                )
                .await;
            tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
                let store = store.clone();
                async move { Ok(Arc::new(store) as Arc<dyn RoundStore>) }
            }));
        }
        StoreKind::Rest => spawn_rest_supervisor(app_state.clone())?,
    }

    let coordinator = CoordinatorHandle::spawn(app_state.clone());
    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    coordinator.shutdown().await;
    Ok(())
}

#[cfg(feature = "rest-store")]
fn spawn_rest_supervisor(state: SharedState) -> anyhow::Result<()> {
    use roundtable_agent::dao::{
        round_store::rest::{RestConfig, RestRoundStore},
        storage::StorageError,
    };

    let rest_config = RestConfig::from_env().context("reading REST store configuration")?;
    tokio::spawn(storage_supervisor::run(state, move || {
        let config = rest_config.clone();
        async move {
            RestRoundStore::connect(config)
                .await
                .map(|store| Arc::new(store) as Arc<dyn RoundStore>)
                .map_err(StorageError::from)
        }
    }));
    Ok(())
}

#[cfg(not(feature = "rest-store"))]
fn spawn_rest_supervisor(_state: SharedState) -> anyhow::Result<()> {
    anyhow::bail!("built without the `rest-store` feature; set ROUNDTABLE_STORE=memory")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
