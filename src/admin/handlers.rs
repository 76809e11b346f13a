use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::load_balancer::BackendStatus;
use crate::security::WindowSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_backends: usize,
    pub quarantined_backends: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let active = state.balancer.len();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if active > 0 { "operational" } else { "unavailable" },
        active_backends: active,
        quarantined_backends: state.breaker.len(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    Json(state.balancer.snapshot())
}

pub async fn get_quarantine(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "quarantined": state.breaker.quarantined() }))
}

pub async fn get_limiter(State(state): State<AppState>) -> Json<WindowSnapshot> {
    Json(state.limiter.snapshot())
}
