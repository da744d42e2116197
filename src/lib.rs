//! # Selene - Energy Management Runtime for EV Charging Sites
//!
//! Selene assembles a charging site from a single YAML configuration:
//! meters, chargers and vehicles are declared by name, grouped into load
//! points, and measured periodically. Measurements flow through a filtered
//! telemetry pipeline into InfluxDB and MQTT, charging events are pushed to
//! notification services, and an optional home energy manager adapter
//! exposes the load points over SEMP.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `logging`: Structured logging and tracing
//! - `setup`: Ordered process bootstrap
//! - `sponsor`: Sponsor token verification
//! - `mqtt`: Broker connection and sample publishing
//! - `scripting`: Named embedded script VMs
//! - `devices`: Device registry and built-in device types
//! - `core`: Site, load points and the SoC fallback delegate
//! - `pipe`: Sample stream filters (deduplication, rate limiting)
//! - `influx`: InfluxDB line protocol writer
//! - `push`: Event notification hub and messengers
//! - `hems`: Home energy manager adapters
//! - `vehicle`: Vehicle cloud integrations and OAuth token refresh

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod hems;
pub mod influx;
pub mod logging;
pub mod mqtt;
pub mod oauth;
pub mod pipe;
pub mod push;
pub mod scripting;
pub mod setup;
pub mod shutdown;
pub mod sponsor;
pub mod vehicle;


// Re-export commonly used types
pub use config::Config;
pub use core::{ChargeProgress, LoadPoint, Site};
pub use error::{Result, SeleneError};
pub use setup::{Runtime, bootstrap};
pub use shutdown::ShutdownSignal;
