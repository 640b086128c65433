use axum::{extract::State, Json};
use serde::Serialize;

use crate::currency::{CurrencyStatus, RefreshCheck, RefreshTrigger};
use crate::http::response::ApiError;
use crate::http::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub read_only: bool,
    pub refresh_interval_secs: u64,
    pub currency: CurrencyStatus,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        read_only: state.config.security.read_only,
        refresh_interval_secs: state.config.currency.refresh_interval_secs,
        currency: state.currency.status(),
    })
}

/// Check the configuration store now.
pub async fn refresh_config(State(state): State<AppState>) -> Result<Json<RefreshCheck>, ApiError> {
    let check = state.currency.detector().check_now(RefreshTrigger::Forced).await?;
    tracing::info!(was_stale = check.was_stale, new_id = ?check.new_identifier, "Admin refresh check");
    Ok(Json(check))
}
