//! Device-side facilities used by the MAC layer
//!
//! This module contains the power source model reported to the network in
//! DevStatusAns answers.

/// Power source and battery reporting
pub mod power;

pub use power::PowerSource;
