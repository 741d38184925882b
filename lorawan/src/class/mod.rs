//! End-device classes
//!
//! Only Class A is implemented: every uplink is followed by two short
//! receive windows and the device sleeps the rest of the time.
//!
//! The MAC reports to the application through the [`MacEvents`] observer:
//! - the final outcome of every uplink
//! - new frames handed to the radio
//! - transmissions deferred by duty-cycle or receive windows
//! - application payloads received
//! - uplinks dropped before reaching the radio

use core::time::Duration;

use thiserror::Error;

/// Class A device implementation
pub mod class_a;
pub use class_a::ClassA;

/// Final outcome of an uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome<'a> {
    /// Acknowledged (confirmed) or sent without error (unconfirmed)
    pub success: bool,
    /// Number of times the frame went on air
    pub transmissions: u8,
    /// Time of the first transmission
    pub first_attempt: Duration,
    /// The PHY payload that was sent
    pub frame: &'a [u8],
}

/// Reason an uplink was dropped before transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendAbort {
    /// Frame does not fit the current data rate
    #[error("payload too large for the current data rate")]
    PayloadTooLarge,
    /// No enabled channel accepts the current data rate and power
    #[error("no channel compatible with the current data rate and power")]
    NoCompatibleChannel,
}

/// What `send` did with the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Handed to the radio
    Sent,
    /// Deferred, a timer will transmit it after the given delay
    Postponed(Duration),
    /// Dropped
    Aborted(SendAbort),
}

/// Observer of MAC activity
///
/// Every method has an empty default so implementors only pick what they
/// need.
#[allow(unused_variables)]
pub trait MacEvents {
    /// An uplink has been acknowledged, has run out of transmissions or has
    /// completed its receive windows
    fn transmission_finished(&mut self, outcome: &TxOutcome<'_>) {}

    /// A new frame was handed to the radio
    fn new_packet_sent(&mut self, frame: &[u8]) {}

    /// A transmission was deferred by `delay`
    fn transmission_postponed(&mut self, delay: Duration) {}

    /// A downlink for this device arrived, `payload` is the FRMPayload
    fn packet_received(&mut self, payload: &[u8]) {}

    /// An uplink was dropped
    fn transmission_aborted(&mut self, reason: SendAbort) {}
}

impl MacEvents for () {}
