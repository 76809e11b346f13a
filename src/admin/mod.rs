//! Admin API: read-only views of the pool, quarantine, and limiter.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState, api_key: &str) -> Router {
    let api_key: Arc<str> = Arc::from(api_key);
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/quarantine", get(get_quarantine))
        .route("/admin/limiter", get(get_limiter))
        .layer(middleware::from_fn_with_state(api_key, admin_auth_middleware))
        .with_state(state)
}
