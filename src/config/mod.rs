//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, write_default_config, ConfigError};
pub use schema::{
    AdminConfig, DispatchConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, RateLimitConfig, TimeoutConfig,
};
