//! Gateway-wide plumbing shared by every service of the Barton gateway.
//!
//! - [`config`]: the configuration model and the layered file + environment loader.
//! - [`logging`]: installs the tracing subscriber described by the configuration.
//! - [`open_storage`]: opens the durable key/value store from its configuration section.
//!
//! ## Startup
//! ```rust,no_run
//! use barton_kernel::config::{GatewayConfig, load_config};
//! use barton_kernel::logging::Logger;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg: GatewayConfig = load_config(Some("/etc/barton/barton.toml"))?;
//! let _logger = Logger::init(&cfg.logging)?;
//! let storage = barton_kernel::open_storage(&cfg.storage)?;
//!
//! let devices = storage.namespace("devices")?;
//! for key in devices.keys()? {
//!     tracing::info!(%key, "Known device");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod logging;
mod storage;

pub use error::{ConfigError, ConfigErrorExt, LoggingError};
pub use storage::open_storage;
