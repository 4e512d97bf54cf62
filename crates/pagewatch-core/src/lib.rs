//! pagewatch-core — shared types and configuration for pagewatch.
//!
//! The severity scale in [`ComponentStatus`] mirrors the status page's own
//! component vocabulary; everything that crosses the wire uses those
//! integers, everything internal uses the ordered enum.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ComponentConfig, EndpointConfig, ExpectationConfig, MonitorConfig, StatusPageConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
