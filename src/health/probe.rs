//! Health probing for quarantined backends.
//!
//! # Responsibilities
//! - Ask a backend for a status code through its proxy handle
//! - Let the circuit breaker stay ignorant of how probing is done

use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::HealthCheckConfig;
use crate::load_balancer::ProxyHandle;

/// Something that can observe a backend's status code.
///
/// `None` means no status could be determined; the backend is treated as
/// still unhealthy.
pub trait HealthProbe: Send + Sync {
    fn probe<'a>(&'a self, id: &'a str, handle: &'a ProxyHandle) -> BoxFuture<'a, Option<StatusCode>>;
}

/// Real round trip: a bodiless GET to a fixed path.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.path.clone(), Duration::from_millis(config.timeout_ms))
    }
}

impl HealthProbe for HttpProbe {
    fn probe<'a>(&'a self, _id: &'a str, handle: &'a ProxyHandle) -> BoxFuture<'a, Option<StatusCode>> {
        handle.probe(&self.path, self.timeout).boxed()
    }
}

/// Only `200 OK` counts as healthy.
pub fn is_healthy(status: Option<StatusCode>) -> bool {
    status == Some(StatusCode::OK)
}
