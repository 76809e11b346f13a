//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted
//!     → pool.rs (LoadBalancer::get under the pool lock)
//!     → least_conn.rs (pick backend with fewest outstanding requests)
//!     → backend.rs (count the request as in flight)
//!     → handle.rs (forward to the backend)
//!     → restore when the InFlight guard drops, sub + quarantine on failure
//! ```
//!
//! # Design Decisions
//! - Outstanding counts are a live gauge: incremented on select,
//!   decremented on completion
//! - A backend is either in the pool or in quarantine, never both
//! - Handles move between the two by value

pub mod backend;
pub mod handle;
pub mod least_conn;
pub mod pool;

pub use backend::{BackendStatus, BackendTarget};
pub use handle::{ForwardError, HttpClient, ProxyHandle};
pub use pool::{InFlight, LoadBalancer};
