//! Self-healing admission and dispatch layer for a pool of HTTP backends.
//!
//! Three components cooperate for every request:
//! - [`SlidingWindowLimiter`] decides whether the request is admitted
//! - [`LoadBalancer`] picks the backend with the fewest requests in flight
//! - [`CircuitBreaker`] quarantines backends that fail and puts them back
//!   once a health probe succeeds

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod sync;

pub use config::schema::ProxyConfig;
pub use error::{PoolError, PoolResult};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use load_balancer::LoadBalancer;
pub use resilience::CircuitBreaker;
pub use security::SlidingWindowLimiter;
