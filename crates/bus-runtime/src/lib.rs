//! # Bus Runtime
//!
//! Wiring for the `bus-runtime` binary.
//!
//! - `config` - `BUS_*` environment configuration
//! - `telemetry` - `tracing-subscriber` setup
//! - `orders` - the order-processing bus the binary runs

pub mod config;
pub mod orders;
pub mod telemetry;

pub use config::{ConfigError, RuntimeConfig};
pub use orders::{build_bus, build_container, OrderLedger};
pub use telemetry::{init_logging, TelemetryError};
