//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Request received
//!     → rate_limit.rs (admit: bounded retries of try_take)
//!     → rejected after max_try_count attempts: 429 Too Many Requests
//!     → admitted: dispatch; budget restored when the backend succeeds
//! ```

pub mod rate_limit;

pub use rate_limit::{admit, Clock, ManualClock, MonotonicClock, SlidingWindowLimiter, WindowSnapshot};
