//! Quiz Duel Back binary entrypoint wiring REST, WebSocket and the profile service.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::{profile_store::ProfileStore, question_bank::QuestionPool, storage::StorageError};
use services::storage_supervisor;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let questions = QuestionPool::from_dir(config.questions_dir());
    let app_state = AppState::new(config.rules().clone(), Arc::new(questions));

    let profile_store_url = env::var("PROFILE_STORE_URL").ok();
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        let result = connect_profile_store(profile_store_url.as_deref());
        async move { result }
    }));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
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

    Ok(())
}

/// Pick the profile store backend: the remote service when a URL is configured, otherwise an
/// in-process store that enrolls participants on first sight.
fn connect_profile_store(url: Option<&str>) -> Result<Arc<dyn ProfileStore>, StorageError> {
    match url {
        #[cfg(feature = "http-profile-store")]
        Some(url) => {
            info!(%url, "using remote profile service");
            Ok(Arc::new(dao::profile_store::http::HttpProfileStore::new(url)?))
        }
        #[cfg(not(feature = "http-profile-store"))]
        Some(_) => Err(StorageError::Rejected(
            "PROFILE_STORE_URL requires the `http-profile-store` feature".into(),
        )),
        None => {
            info!("PROFILE_STORE_URL not set; using in-memory profiles");
            Ok(Arc::new(
                dao::profile_store::memory::MemoryProfileStore::with_auto_enroll(),
            ))
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
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
                tracing::warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
