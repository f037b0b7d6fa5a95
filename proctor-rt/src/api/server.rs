//! HTTP server setup and routing

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::service::ProctorService;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<ProctorService>,
}

impl AppContext {
    pub fn new(service: Arc<ProctorService>) -> Self {
        Self { service }
    }
}

/// Build the application router
///
/// `/health` is public; every other route requires a bearer token.
pub fn build_router(ctx: AppContext) -> Router {
    let protected = Router::new()
        .route("/sessions", post(super::handlers::schedule_session))
        .route("/sessions/:id", get(super::handlers::get_session))
        .route("/sessions/:id/start", post(super::handlers::start_session))
        .route("/sessions/:id/end", post(super::handlers::end_session))
        .route("/sessions/:id/cancel", post(super::handlers::cancel_session))
        .route("/sessions/:id/access", get(super::handlers::access_decision))
        .route("/sessions/:id/events", get(super::handlers::list_detection_events))
        .route("/sessions/:id/detections", post(super::handlers::ingest_detection))
        .route("/sessions/:id/stream", get(super::sse::session_stream))
        .route("/connections/leave", post(super::handlers::leave))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            super::auth::auth_middleware,
        ));

    let public = Router::new().route("/health", get(super::handlers::health));

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until Ctrl-C or SIGTERM
pub async fn run(ctx: AppContext, bind_addr: &str) -> Result<()> {
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    info!("proctor-rt listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Config(format!("Server error: {}", e)))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
