//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → converted into RetryPolicy / QueueSettings / ProbeSettings
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → changed retry section becomes a new RetryPolicy
//!     → executor swaps its default RetryPolicy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the retry policy is hot-swapped
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::{ObservabilityConfig, ProbeConfig, QueueConfig, RetryConfig, TransportConfig};
