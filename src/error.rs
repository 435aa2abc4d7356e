use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::{ConfigError, MissingSetting};
use crate::edge_config::EdgeConfigError;
use crate::flagship::FlagError;

/// Failures that abort a request. Everything else degrades to default values.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    MissingConfiguration(#[from] MissingSetting),

    #[error("flag client rejected its configuration: {0}")]
    ClientConfiguration(#[source] FlagError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");

        let body = Json(ErrorBody {
            error: "internal server error",
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    EdgeConfig(#[from] EdgeConfigError),

    #[error(transparent)]
    FlagClient(#[from] FlagError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
