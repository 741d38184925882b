//! LoRaWAN protocol building blocks
//!
//! This module contains the pieces the Class A state machine is built from:
//! - Frame and MAC command wire codec
//! - Regional parameters
//! - Channel plan and duty-cycle admission control
//! - ADR back-off
//! - Airtime computation

/// ADR back-off procedure
pub mod adr;

/// Logical channels and sub-bands
pub mod channels;

/// MAC command codec
pub mod commands;

/// Duty-cycle admission control
pub mod duty_cycle;

/// MAC and frame headers
pub mod mac;

/// Airtime and symbol timing
pub mod phy;

/// Regional parameters
pub mod region;

pub use channels::{ChannelPlan, DutyCycle, LogicalChannel, SubBand};
pub use commands::{Direction, MacCommand};
pub use mac::{CodecError, FrameHeader, MacError, MacHeader, MType};
pub use region::{Eu868, Region};
