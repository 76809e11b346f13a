//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (request id, tracing, timeout)
//! - Admit each request through the rate limiter
//! - Select a backend, forward, and relay the response
//! - Keep outstanding counts honest when a request is cancelled midway
//! - Move failing backends into quarantine and re-dispatch to the rest
//! - Run the recovery loop and the optional admin API alongside the listener

use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{request::Parts, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{DispatchConfig, ProxyConfig, RateLimitConfig};
use crate::error::PoolError;
use crate::health::HttpProbe;
use crate::http::request::{request_id, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::resilience::CircuitBreaker;
use crate::security::rate_limit::{admit, SlidingWindowLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<SlidingWindowLimiter>,
    pub balancer: Arc<LoadBalancer>,
    pub breaker: Arc<CircuitBreaker>,
    pub rate_limit: RateLimitConfig,
    pub dispatch: DispatchConfig,
}

impl AppState {
    /// Build every component from configuration and register the
    /// configured backends. Any backend that cannot be added is fatal.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, PoolError> {
        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.rate_limit.limit_per_millisecond,
            Duration::from_millis(1),
        ));

        let balancer = Arc::new(LoadBalancer::new());
        for backend in &config.backends {
            balancer.add(backend)?;
        }

        let breaker = Arc::new(CircuitBreaker::new(
            balancer.clone(),
            Arc::new(HttpProbe::from_config(&config.health_check)),
            Duration::from_millis(config.health_check.interval_ms),
        ));

        Ok(Self {
            limiter,
            balancer,
            breaker,
            rate_limit: config.rate_limit.clone(),
            dispatch: config.dispatch.clone(),
        })
    }
}

/// HTTP server for the proxy.
pub struct ProxyServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
}

impl ProxyServer {
    /// Create a server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        let state = AppState::from_config(&config)?;
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Shared components, for inspection and tests.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until `shutdown` is triggered.
    ///
    /// The recovery loop runs for as long as the server does. The admin
    /// API is served on `admin_listener` when one is given.
    pub async fn run(
        self,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.state.balancer.len(),
            "HTTP server starting"
        );

        let recovery = self.state.breaker.spawn(shutdown.subscribe());

        let admin_task = match admin_listener {
            Some(admin_listener) => {
                let admin_addr = admin_listener.local_addr()?;
                let app = admin::setup_admin_router(self.state.clone(), &self.config.admin.api_key);
                let rx = shutdown.subscribe();
                tracing::info!(address = %admin_addr, "Admin API listening");
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(admin_listener, app)
                        .with_graceful_shutdown(wait_for(rx))
                        .await
                    {
                        tracing::error!(error = %e, "Admin API stopped with error");
                    }
                }))
            }
            None => None,
        };

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown.subscribe()))
            .await;

        // Make sure background tasks stop even if the listener failed.
        shutdown.trigger();
        let _ = recovery.await;
        if let Some(task) = admin_task {
            let _ = task.await;
        }

        tracing::info!("HTTP server stopped");
        result
    }
}

async fn wait_for(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}

/// Main proxy handler.
/// Admits the request, selects a backend, and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request).to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );

    // 1. Admission
    let pause = Duration::from_millis(state.rate_limit.retry_pause_ms);
    if !admit(&state.limiter, state.rate_limit.max_try_count, pause).await {
        tracing::warn!(request_id = %request_id, "Rate limit exceeded");
        metrics::record_rate_limited();
        metrics::record_request(429, "none", start_time);
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
    }

    // 2. Buffer the body so the request can be re-dispatched
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.dispatch.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let status = body_error_status(&e);
            tracing::warn!(request_id = %request_id, error = %e, status = %status, "Failed to read request body");
            state.limiter.restore(1);
            metrics::record_request(status.as_u16(), "none", start_time);
            return status.into_response();
        }
    };

    // 3. Dispatch loop
    let max_attempts = state.dispatch.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let (mut in_flight, handle) = match state.balancer.checkout() {
            Ok(selected) => selected,
            Err(e) => {
                tracing::warn!(request_id = %request_id, attempt, error = %e, "No backend available");
                state.limiter.restore(1);
                metrics::record_request(503, "none", start_time);
                return (StatusCode::SERVICE_UNAVAILABLE, "No backends available").into_response();
            }
        };

        let backend = in_flight.id().to_string();

        match handle.forward(upstream_request(&parts, &body)).await {
            Ok(response) if !response.status().is_server_error() => {
                drop(in_flight);
                state.limiter.restore(1);
                metrics::record_request(response.status().as_u16(), &backend, start_time);

                let (parts, body) = response.into_parts();
                return Response::from_parts(parts, Body::new(body));
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(request_id = %request_id, backend = %backend, attempt, status = %status, "Backend returned server error");
                in_flight.disarm();
                quarantine(&state, &backend);

                if attempt == max_attempts {
                    metrics::record_request(status.as_u16(), &backend, start_time);
                    let (parts, body) = response.into_parts();
                    return Response::from_parts(parts, Body::new(body));
                }
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, backend = %backend, attempt, error = %e, "Upstream error");
                in_flight.disarm();
                quarantine(&state, &backend);
            }
        }
    }

    metrics::record_request(502, "none", start_time);
    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
}

/// 413 when the body outgrew the buffer limit, 400 for any other read
/// failure (client abort, broken chunked encoding).
fn body_error_status(error: &axum::Error) -> StatusCode {
    let too_large = error
        .source()
        .is_some_and(|source| source.is::<LengthLimitError>());
    if too_large {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Copy of the inbound request for one dispatch attempt.
fn upstream_request(parts: &Parts, body: &Bytes) -> Request<Body> {
    let mut request = Request::new(Body::from(body.clone()));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.headers_mut() = parts.headers.clone();
    request
}

/// Move `backend` from the pool into quarantine.
///
/// A concurrent request may already have done so; that is not an error.
fn quarantine(state: &AppState, backend: &str) {
    match state.balancer.sub(backend) {
        Ok(handle) => {
            if let Err(e) = state.breaker.add(backend.to_string(), handle) {
                tracing::warn!(backend = %backend, error = %e, "Failed to quarantine backend");
            }
        }
        Err(e) => {
            tracing::debug!(backend = %backend, error = %e, "Backend already evicted");
        }
    }
    metrics::record_pool_sizes(state.balancer.len(), state.breaker.len());
}
