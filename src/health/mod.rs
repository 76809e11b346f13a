//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Recovery tick (resilience::circuit_breaker)
//!     → probe.rs (HealthProbe for each quarantined backend)
//!     → 200 OK: backend returns to the pool
//!     → anything else: stays quarantined until the next tick
//! ```

pub mod probe;

pub use probe::{is_healthy, HealthProbe, HttpProbe};
