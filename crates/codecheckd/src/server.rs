//! Server wiring: shared state, router and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use codecheck_core::{
    CheckRegistry, CompletionSource, MemoryCheckRegistry, Orchestrator, PipelineCompletion,
    SimulatedCompletion, Stager, UploadPolicy,
};
use codecheck_github::GitHubClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{CompletionMode, Config};
use crate::routes;

/// Room for multipart boundaries and part headers on top of the file cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// How long shutdown waits for armed checks to finish cleanup.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn CheckRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub policy: Arc<UploadPolicy>,
    pub stager: Stager,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, policy: UploadPolicy, stager: Stager) -> Self {
        Self {
            registry: Arc::clone(orchestrator.registry()),
            orchestrator,
            policy: Arc::new(policy),
            stager,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.policy.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/api/upload", post(routes::upload))
        .route("/api/check/:id", get(routes::get_check))
        .route("/api/checks", get(routes::list_checks))
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the production collaborators and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;

    let github = Arc::new(
        GitHubClient::new(config.github()?).context("Failed to configure GitHub client")?,
    );
    let completion: Arc<dyn CompletionSource> = match config.completion_mode {
        CompletionMode::Simulated => Arc::new(SimulatedCompletion::new(config.completion_delay())),
        CompletionMode::Pipeline => Arc::new(PipelineCompletion::new(
            github.clone(),
            config.pipeline_polling(),
        )),
    };
    let registry = Arc::new(MemoryCheckRegistry::with_capacity(config.registry_capacity));
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        github,
        completion,
        config.orchestrator(),
    ));
    let state = AppState::new(
        Arc::clone(&orchestrator),
        config.upload_policy(),
        config.stager(),
    );

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(
        %addr,
        completion_mode = ?config.completion_mode,
        staging_dir = %state.stager.dir().display(),
        "codecheckd listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.close();
    let stats = orchestrator.stats();
    info!(inflight = stats.inflight_checks, "Waiting for in-flight checks");
    if tokio::time::timeout(SHUTDOWN_GRACE, orchestrator.wait_idle())
        .await
        .is_err()
    {
        warn!(
            inflight = orchestrator.inflight_checks(),
            "Shutting down with checks still in flight; their repositories may remain"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
