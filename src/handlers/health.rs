use axum::extract::State;
use serde::Serialize;

use crate::middleware::ApiResponse;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: u64,
}

/// Liveness probe. Does not consult the route table or any downstream service.
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthStatus> {
    ApiResponse::success(HealthStatus {
        status: "ok",
        service: "api-gateway",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
