//! Radio hardware abstraction
//!
//! The MAC drives the transceiver through the [`Radio`] trait; drivers and
//! simulators implement it.

/// Radio trait and parameter types
pub mod traits;

pub use traits::{Radio, RadioState, RxConfig, RxQuality, TxConfig};
