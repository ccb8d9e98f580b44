//! Nova Runtime - hosting layer for the Nova bot framework.
//!
//! This crate provides:
//! - Layered configuration (`NovaConfig`, `ConfigLoader`) on figment
//! - Logging setup on `tracing-subscriber` and `tracing-appender`
//! - The runtime (`NovaRuntime`): a bounded event queue fed by platforms and
//!   drained by a pool of workers running the pipeline
//!
//! ```rust,ignore
//! use nova_runtime::NovaRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = NovaRuntime::builder()
//!         .platform(Arc::new(MyPlatform::new()))
//!         .plugin(Arc::new(MyPlugin))
//!         .build()
//!         .await?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, NovaConfig, Profile, RuntimeConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LogGuard, LoggingBuilder, SpanEvents};
pub use runtime::{NovaRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
