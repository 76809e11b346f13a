//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding failed (5xx or transport error):
//!     → LoadBalancer::sub (backend leaves the pool)
//!     → circuit_breaker.rs (backend enters quarantine)
//!     → recovery tick probes it
//!     → LoadBalancer::append once the probe succeeds
//! ```
//!
//! # Design Decisions
//! - The breaker never holds its own lock while touching the balancer
//! - Probes run concurrently, each bounded by its own timeout
//! - No backoff: every quarantined backend is probed on every tick

pub mod circuit_breaker;

pub use circuit_breaker::CircuitBreaker;
