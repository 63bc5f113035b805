//! The HTTP front end: a two-route `axum` app wired to the request
//! pipeline. `GET /*path` is the entire public surface — everything
//! about transforms, fallbacks, and cache-clear triggers is decided by
//! [`crate::pipeline::RequestPipeline`]; this module's only job is
//! translating `ServeOutcome` into a response and wiring up `tower-http`
//! tracing, matching the teacher's own preference for thin HTTP glue
//! over hand-rolled routing.

use crate::error::AppError;
use crate::imaging::backend::RealCodec;
use crate::pipeline::{RequestPipeline, ServeOutcome};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RequestPipeline<RealCodec>>,
    dev_mode: bool,
}

impl AppState {
    pub fn new(pipeline: Arc<RequestPipeline<RealCodec>>, dev_mode: bool) -> Self {
        Self { pipeline, dev_mode }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/*path", get(serve_asset))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve `router` until a Ctrl-C/SIGTERM is received.
pub async fn run(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Every request lands here, wildcard path and all — the pipeline's
/// [`RequestPipeline::serve_url`] performs the split between asset path
/// and transform-parameter segments described in DESIGN.md OQ3.
///
/// The pipeline itself is synchronous (blocking file I/O, CPU-bound
/// resize/encode — spec.md §5's "no internal suspension visible to the
/// core"), so it runs on `spawn_blocking`'s thread pool rather than
/// inline on the async handler: a Lanczos3 resize or a cold-cache disk
/// read would otherwise stall the tokio reactor thread for every other
/// in-flight request.
async fn serve_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.serve_url(&path))
        .await
        .expect("pipeline worker thread panicked");

    match result {
        Ok(ServeOutcome::Served(outcome)) => {
            let mut response = outcome.bytes.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(outcome.mime));
            Ok(response)
        }
        Ok(ServeOutcome::Cleared) => Ok((StatusCode::OK, "cache cleared").into_response()),
        Err(error) => Err(AppError {
            error,
            dev_mode: state.dev_mode,
        }),
    }
}
