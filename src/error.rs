//! HTTP error glue: maps [`PipelineError`] onto a status code and body.
//!
//! Kept deliberately thin, following the status-code-mapping style of
//! `other_examples/.../ferrex/image_handlers.rs` (handlers return
//! `Result<_, StatusCode>` rather than a rich body). Since the pipeline
//! already recovers ordinary misses into the system default, anything
//! that reaches this glue is a genuine server-side failure — there is
//! no 404 case here by design.

use crate::pipeline::PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Unrecoverable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// A [`PipelineError`] paired with whether the running service is in
/// dev mode. The HTTP handler builds one of these from the raw pipeline
/// error and the request's `AppState`, rather than `PipelineError`
/// implementing `IntoResponse` itself — the body it renders depends on
/// config the error type alone doesn't carry.
pub struct AppError {
    pub error: PipelineError,
    pub dev_mode: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        tracing::error!(error = %self.error, "request failed");

        let body = if self.dev_mode {
            self.error.to_string()
        } else {
            "internal error".to_string()
        };
        (status, body).into_response()
    }
}
