//! Govee BLE light driver
//!
//! Configuration shared by the `govee-driver` binary. The protocol engine
//! lives in `govee-light`, the wire format and links in `govee-transport`.

pub mod config;

pub use config::{AppConfig, DeviceEntry};
