//! HTTP service: frame scoring and event forwarding.

mod error;
mod routes;
mod training;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use attention_core::pipeline::{AttentionPipeline, SessionStore};
use attention_core::ports::EventSink;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use error::ApiError;
pub use training::{spawn_training, TrainingJob, TrainingStatus};

/// Largest accepted upload.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared request state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<AttentionPipeline>,
    sink: Arc<dyn EventSink>,
    training: watch::Receiver<TrainingStatus>,
}

impl AppState {
    /// State over `pipeline`, forwarding through `sink`.
    #[must_use]
    pub fn new(
        pipeline: Arc<AttentionPipeline>,
        sink: Arc<dyn EventSink>,
        training: watch::Receiver<TrainingStatus>,
    ) -> Self {
        Self {
            pipeline,
            sink,
            training,
        }
    }
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/debug/status", get(routes::debug_status))
        .route("/analyze/frame", post(routes::analyze_frame))
        .route("/events", post(routes::forward_event))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Periodically drops sessions idle for longer than the store's TTL.
pub fn spawn_sweeper(store: Arc<SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(Instant::now());
            if evicted > 0 {
                info!(evicted, active = store.len(), "Evicted idle sessions");
            } else {
                debug!(active = store.len(), "No idle sessions");
            }
        }
    })
}

/// Serves `state` on `addr` until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")
}
