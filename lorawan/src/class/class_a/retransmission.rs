use core::time::Duration;

use crate::lorawan::mac::Frame;

/// Bookkeeping for the uplink currently in flight
///
/// A frame stays here from its first transmission until it is acknowledged,
/// runs out of transmissions or is superseded by a new uplink. Retries send
/// the stored bytes again unchanged.
#[derive(Debug, Clone, Default)]
pub struct RetransmissionState {
    frame: Option<Frame>,
    first_attempt: Duration,
    waiting_ack: bool,
    nb_trans: u8,
    retries_left: u8,
}

impl RetransmissionState {
    /// Track `frame`, first sent at `now`, with `nb_trans` transmissions allowed
    pub fn start(&mut self, frame: Frame, now: Duration, confirmed: bool, nb_trans: u8) {
        self.frame = Some(frame);
        self.first_attempt = now;
        self.waiting_ack = confirmed;
        self.nb_trans = nb_trans;
        self.retries_left = nb_trans;
    }

    /// Forget the frame in flight
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Count one transmission of the stored frame
    pub fn record_transmission(&mut self) {
        self.retries_left = self.retries_left.saturating_sub(1);
    }

    /// Whether a frame is in flight
    pub fn is_active(&self) -> bool {
        self.frame.is_some()
    }

    /// Whether the frame in flight is confirmed and not yet acknowledged
    pub fn waiting_ack(&self) -> bool {
        self.frame.is_some() && self.waiting_ack
    }

    /// Whether another transmission is allowed
    pub fn can_retry(&self) -> bool {
        self.retries_left > 0
    }

    /// Transmissions left
    pub fn retries_left(&self) -> u8 {
        self.retries_left
    }

    /// Transmissions made so far
    pub fn transmissions(&self) -> u8 {
        self.nb_trans - self.retries_left
    }

    /// Time of the first transmission
    pub fn first_attempt(&self) -> Duration {
        self.first_attempt
    }

    /// Frame in flight
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}
