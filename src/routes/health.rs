use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    status: u16,
    /// Whether both flag credentials are set. Requests fail with 500 until they are.
    credentials_configured: bool,
}

/// Liveness only; the flag service and the config store are not probed.
pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: StatusCode::OK.as_u16(),
        credentials_configured: state.config.flagship.credentials().is_ok(),
    })
}
