//! LoRaWAN Class A end-device MAC layer
//!
//! This crate implements the medium access control of a LoRaWAN 1.0 Class A
//! end device, independent of any radio chip or timer hardware.
//!
//! # Features
//! - Frame header and MAC command codec
//! - Two receive windows after every uplink
//! - Confirmed uplinks with retransmission and ACK timeout
//! - Per sub-band duty-cycle enforcement with random channel selection
//! - Network driven ADR (LinkAdrReq) and ADR back-off
//! - Regional parameters behind the [`lorawan::region::Region`] trait (EU868 provided)
//! - No unsafe code, `no_std`, no allocation
//!
//! # Example
//! ```no_run
//! use core::time::Duration;
//! use lorawan_mac::{
//!     class::ClassA,
//!     config::{DevAddr, DeviceConfig},
//!     lorawan::region::Eu868,
//! };
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! # fn run<R: lorawan_mac::radio::Radio>(radio: R) where R::Error: core::fmt::Debug {
//! let config = DeviceConfig::new(DevAddr(0x2601_1F42));
//! let mut device = ClassA::new(radio, Eu868::new(), config, SmallRng::seed_from_u64(1), ()).unwrap();
//!
//! let mut now = Duration::ZERO;
//! device.send(now, b"Hello, LoRaWAN!").unwrap();
//!
//! // the radio driver reports the end of the transmission...
//! device.on_tx_finished(now).unwrap();
//!
//! // ...and the main loop runs the receive windows
//! while let Some(deadline) = device.next_deadline() {
//!     now = deadline;
//!     device.handle_timers(now).unwrap();
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![no_std]

/// Device classes (Class A)
pub mod class;

/// Device configuration
pub mod config;

/// Device-side facilities reported to the network
pub mod device;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Radio hardware abstraction layer
pub mod radio;
