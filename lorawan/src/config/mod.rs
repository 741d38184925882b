//! Device configuration
//!
//! This module contains the static configuration of a Class A device and the
//! radio parameters that change while it runs:
//! - Device address and uplink options
//! - Receive window timing
//! - Runtime data rate, power and receive window parameters

/// Device configuration and radio state
pub mod device;

pub use device::{ConfigError, DevAddr, DeviceConfig, DeviceRadioState};
