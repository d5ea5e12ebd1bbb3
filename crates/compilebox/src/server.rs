use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{RunnerError, RunnerResult};
use crate::handlers;
use crate::rate_limit::{self, RateLimiter};
use crate::registry::LanguageRegistry;
use crate::supervisor::Supervisor;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<LanguageRegistry>,
    /// `None` disables the per-client budget on `/compile`.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub job_timeout: Duration,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState) -> Router {
    let mut compile_routes = Router::new().route("/compile", post(handlers::compile));
    if let Some(limiter) = &state.rate_limiter {
        compile_routes = compile_routes.route_layer(middleware::from_fn_with_state(
            Arc::clone(limiter),
            rate_limit::limit,
        ));
    }

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/languages", get(handlers::languages))
        .merge(compile_routes)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Any origin, the usual verbs, JSON bodies.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::PUT,
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

/// Serve until SIGINT or SIGTERM, then let in-flight requests finish.
pub async fn serve(listener: TcpListener, app: Router) -> RunnerResult<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| RunnerError::Server(e.to_string()))?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();

    tokio::select! {
        _ = recv_signal(&mut sigterm) => info!("received SIGTERM, shutting down"),
        _ = recv_signal(&mut sigint) => info!("received SIGINT, shutting down"),
    }
}

/// Await a signal if registered, or pend forever if registration failed.
async fn recv_signal(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}
