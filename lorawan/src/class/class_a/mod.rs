//! Class A end-device MAC
//!
//! Every uplink is followed by two receive windows:
//! - RX1 opens `receive_delay1` after the end of the transmission, on the
//!   uplink frequency and the data rate derived from the RX1 offset
//! - RX2 opens `receive_delay2` after the end of the transmission, on the
//!   configured RX2 frequency and data rate
//!
//! A downlink addressed to the device cancels RX2. Confirmed uplinks that
//! see no ACK in either window are sent again after a random ACK timeout
//! until `nb_trans` transmissions have been made.
//!
//! The state machine is driven from outside: the radio driver reports
//! `on_tx_finished`, `on_packet_received` and `on_reception_failed`, and the
//! owner calls `handle_timers` whenever `next_deadline` has passed.

use core::time::Duration;

use heapless::Vec;
use log::{debug, error, info, trace, warn};
use rand::{Rng, RngCore};

mod handlers;
/// Frame in flight and its transmission budget
pub mod retransmission;
/// Timer queue
pub mod timing;

use self::retransmission::RetransmissionState;
use self::timing::{Scheduler, TimerEvent, TimerId};
use super::{MacEvents, SendAbort, SendStatus, TxOutcome};
use crate::config::device::{ConfigError, DeviceConfig, DeviceRadioState};
use crate::device::power::PowerSource;
use crate::lorawan::adr::AdrBackoff;
use crate::lorawan::channels::{ChannelPlan, DutyCycle};
use crate::lorawan::commands::{Direction, MacCommand};
use crate::lorawan::mac::{
    CodecError, Frame, FrameHeader, MType, MacError, MacHeader, FHDR_BASE_SIZE, MAX_FOPTS_LEN,
    MAX_FRAME_SIZE, MHDR_SIZE,
};
use crate::lorawan::phy::{self, TxParams};
use crate::lorawan::region::Region;
use crate::radio::traits::{Radio, RadioState, RxConfig, RxQuality, TxConfig};

/// Largest application payload `send` accepts
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - MHDR_SIZE - FHDR_BASE_SIZE;

/// Bounds of the random wait after RX2 before a confirmed frame is resent
const ACK_TIMEOUT_MIN_US: u64 = 1_000_000;
const ACK_TIMEOUT_MAX_US: u64 = 3_000_000;

/// SNR reported before any downlink was received
const INITIAL_SNR_DB: i8 = 32;

const TIMER_SLOTS: usize = 16;

type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Class A state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing on air and no window ahead
    Idle,
    /// Uplink on air
    Transmitting,
    /// Waiting for RX1 window
    WaitingRx1,
    /// In RX1 window
    InRx1,
    /// Waiting for RX2 window
    WaitingRx2,
    /// In RX2 window
    InRx2,
}

/// Uplink waiting for the radio
#[derive(Debug, Clone)]
enum Uplink {
    /// Application payload, the frame is built when it goes on air
    New(Payload),
    /// Frame already sent at least once
    Retry(Frame),
}

impl Uplink {
    fn is_retry(&self) -> bool {
        matches!(self, Uplink::Retry(_))
    }
}

/// Class A device
pub struct ClassA<R: Radio, REG: Region, RNG: RngCore, EV: MacEvents = ()> {
    radio: R,
    region: REG,
    rng: RNG,
    events: EV,
    config: DeviceConfig,
    /// Parameters the network and the ADR back-off adjust
    state: DeviceRadioState,
    plan: ChannelPlan,
    adr: AdrBackoff,
    adr_ack_req: bool,
    f_cnt: u32,
    /// Answers and requests for the next new uplink
    mac_commands: Vec<MacCommand, MAX_FOPTS_LEN>,
    retx: RetransmissionState,
    timers: Scheduler<TIMER_SLOTS>,
    /// Uplink waiting for `next_tx`, or for the radio when no timer is set
    pending: Option<Uplink>,
    next_tx: Option<TimerId>,
    rx1_open: Option<TimerId>,
    rx1_close: Option<TimerId>,
    rx2_open: Option<TimerId>,
    rx2_close: Option<TimerId>,
    /// When RX2 of the last uplink opens (or would have opened)
    rx2_open_at: Option<Duration>,
    phase: State,
    last_snr_db: i8,
    last_link_margin: u8,
    last_gateway_count: u8,
}

impl<R, REG, RNG, EV> ClassA<R, REG, RNG, EV>
where
    R: Radio,
    REG: Region,
    RNG: RngCore,
    EV: MacEvents,
{
    /// Create a Class A device using the region's default channel plan
    pub fn new(
        radio: R,
        region: REG,
        config: DeviceConfig,
        rng: RNG,
        events: EV,
    ) -> Result<Self, ConfigError> {
        config.validate(&region)?;
        let state = DeviceRadioState::new(&config, &region);
        let plan = region.default_channel_plan();
        debug!(
            "class A device {:08X} at DR{}, {} dBm",
            config.dev_addr.0, state.data_rate, state.tx_power_dbm
        );

        Ok(Self {
            radio,
            region,
            rng,
            events,
            config,
            state,
            plan,
            adr: AdrBackoff::default(),
            adr_ack_req: false,
            f_cnt: 0,
            mac_commands: Vec::new(),
            retx: RetransmissionState::default(),
            timers: Scheduler::new(),
            pending: None,
            next_tx: None,
            rx1_open: None,
            rx1_close: None,
            rx2_open: None,
            rx2_close: None,
            rx2_open_at: None,
            phase: State::Idle,
            last_snr_db: INITIAL_SNR_DB,
            last_link_margin: 0,
            last_gateway_count: 0,
        })
    }

    /// Send an application payload
    ///
    /// A confirmed uplink still waiting for its ACK is declared failed first.
    /// The payload goes on air right away when a channel is free and no
    /// receive window is ahead, otherwise it is postponed; a later `send`
    /// replaces a postponed payload. While the radio is transmitting or
    /// receiving the payload is held and `Postponed(Duration::ZERO)` is
    /// returned; the actual delay is reported through
    /// `transmission_postponed` once the radio is done.
    pub fn send(&mut self, now: Duration, payload: &[u8]) -> Result<SendStatus, MacError<R::Error>> {
        if self.retx.waiting_ack() {
            warn!("new uplink before the previous confirmed one was acknowledged");
            self.finish(false);
        }

        let Ok(payload) = Payload::from_slice(payload) else {
            return Ok(self.abort(SendAbort::PayloadTooLarge, false));
        };
        self.send_uplink(now, Uplink::New(payload))
    }

    /// The radio finished transmitting: schedule both receive windows
    pub fn on_tx_finished(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        let rx1_at = now + self.config.receive_delay1;
        let rx2_at = now + self.config.receive_delay2;
        self.rx1_open = Some(self.schedule(rx1_at, TimerEvent::OpenRx1)?);
        self.rx2_open = Some(self.schedule(rx2_at, TimerEvent::OpenRx2)?);
        self.rx2_open_at = Some(rx2_at);
        trace!("RX1 at {} ms, RX2 at {} ms", rx1_at.as_millis(), rx2_at.as_millis());

        self.radio.sleep().map_err(MacError::Radio)?;
        self.phase = State::WaitingRx1;
        self.release_held(now)
    }

    /// The radio demodulated `frame`
    pub fn on_packet_received(
        &mut self,
        now: Duration,
        frame: &[u8],
        quality: RxQuality,
    ) -> Result<(), MacError<R::Error>> {
        self.radio.sleep().map_err(MacError::Radio)?;

        let downlink = match MacHeader::deserialize(frame) {
            Ok((mhdr, used)) if !mhdr.mtype.is_uplink() => {
                match FrameHeader::deserialize(&frame[used..], Direction::Downlink) {
                    Ok((header, len)) => Some((header, used + len)),
                    Err(err) => {
                        warn!("dropping malformed downlink: {}", err);
                        None
                    }
                }
            }
            Ok(_) => {
                debug!("ignoring uplink frame");
                None
            }
            Err(err) => {
                warn!("dropping malformed frame: {}", err);
                None
            }
        };

        match downlink {
            Some((header, used)) if header.dev_addr == self.config.dev_addr => {
                self.handle_downlink(now, &header, &frame[used..], quality)?
            }
            Some((header, _)) => {
                debug!("downlink for {:08X}, not for us", header.dev_addr.0);
                self.resolve_after_rx2(now)?
            }
            None => self.resolve_after_rx2(now)?,
        }
        self.release_held(now)
    }

    /// A reception started but could not be completed
    pub fn on_reception_failed(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        self.radio.sleep().map_err(MacError::Radio)?;
        self.resolve_after_rx2(now)?;
        self.release_held(now)
    }

    /// Run every timer due at `now`
    ///
    /// Each action sees its own deadline as the current time.
    pub fn handle_timers(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        while let Some(expired) = self.timers.pop_due(now) {
            trace!("{:?} due at {} ms", expired.event, expired.deadline.as_millis());
            match expired.event {
                TimerEvent::OpenRx1 => {
                    self.rx1_open = None;
                    self.open_first_window(expired.deadline)?
                }
                TimerEvent::CloseRx1 => self.close_first_window()?,
                TimerEvent::OpenRx2 => self.open_second_window(expired.deadline)?,
                TimerEvent::CloseRx2 => self.close_second_window(expired.deadline)?,
                TimerEvent::Transmit => self.transmit_pending(expired.deadline)?,
            }
        }
        Ok(())
    }

    /// Earliest time `handle_timers` has something to do
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    fn send_uplink(&mut self, now: Duration, uplink: Uplink) -> Result<SendStatus, MacError<R::Error>> {
        let retry = uplink.is_retry();
        let backoff = self.adr.before_uplink(
            &mut self.state,
            self.config.adr,
            &mut self.plan,
            &self.region,
        );
        self.adr_ack_req = backoff.ack_req;

        if !self.fits_data_rate(&uplink) {
            return Ok(self.abort(SendAbort::PayloadTooLarge, retry));
        }

        let candidates = self
            .plan
            .compatible_channels(self.state.data_rate, self.state.tx_power_dbm);
        if candidates.is_empty() {
            error!(
                "no channel for DR{} at {} dBm",
                self.state.data_rate, self.state.tx_power_dbm
            );
            return Ok(self.abort(SendAbort::NoCompatibleChannel, retry));
        }

        if self.radio_busy() {
            debug!("radio busy, uplink held");
            self.hold(uplink);
            return Ok(SendStatus::Postponed(Duration::ZERO));
        }

        let delay = self.next_transmission_delay(now, &candidates, retry);
        if delay.is_zero() && self.windows_end().is_none() {
            return self.transmit(now, uplink);
        }
        let Some(at) = now.checked_add(delay) else {
            return Ok(self.abort(SendAbort::NoCompatibleChannel, retry));
        };
        self.postpone(at, uplink)?;
        self.events.transmission_postponed(delay);
        info!("transmission postponed by {} ms", delay.as_millis());
        Ok(SendStatus::Postponed(delay))
    }

    fn next_transmission_delay(&mut self, now: Duration, candidates: &[u8], retry: bool) -> Duration {
        let mut delay = self.plan.min_wait_time(candidates, now).unwrap_or_default();
        let rx2_open_at = self.rx2_open_at.unwrap_or(now);

        if retry {
            let ack_timeout =
                Duration::from_micros(self.rng.gen_range(ACK_TIMEOUT_MIN_US..=ACK_TIMEOUT_MAX_US));
            delay = delay.max((rx2_open_at + ack_timeout).saturating_sub(now));
        } else if let Some(windows_end) = self.windows_end() {
            delay = delay.max(windows_end.saturating_sub(now));
        }
        delay
    }

    /// When the last receive window still scheduled closes
    fn windows_end(&self) -> Option<Duration> {
        let rx2_end = self
            .rx2_open
            .and_then(|id| self.timers.deadline(id))
            .map(|open| open + self.window_duration(self.state.rx2_data_rate));
        [self.rx1_close, self.rx2_close]
            .into_iter()
            .flatten()
            .filter_map(|id| self.timers.deadline(id))
            .chain(rx2_end)
            .max()
    }

    /// Whether the MACPayload of `uplink` fits the current data rate
    fn fits_data_rate(&self, uplink: &Uplink) -> bool {
        let mac_payload_len = match uplink {
            Uplink::New(payload) => FHDR_BASE_SIZE + self.mac_commands_len() + payload.len(),
            Uplink::Retry(frame) => frame.len() - MHDR_SIZE,
        };
        let max_mac_payload = self.region.max_mac_payload(self.state.data_rate).unwrap_or(0);
        if mac_payload_len > max_mac_payload {
            error!(
                "MACPayload of {} bytes exceeds {} bytes allowed at DR{}",
                mac_payload_len, max_mac_payload, self.state.data_rate
            );
            return false;
        }
        true
    }

    fn radio_busy(&self) -> bool {
        self.phase == State::Transmitting
            || matches!(self.radio.state(), RadioState::Tx | RadioState::Rx)
    }

    /// Keep `uplink` without a timer until the radio is free
    fn hold(&mut self, uplink: Uplink) {
        if let Some(id) = self.next_tx.take() {
            self.timers.cancel(id);
        }
        self.pending = Some(uplink);
    }

    /// Schedule a held uplink once the radio has finished
    fn release_held(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        if self.is_pending(self.next_tx) || self.radio_busy() {
            return Ok(());
        }
        if let Some(uplink) = self.pending.take() {
            debug!("radio free, scheduling held uplink");
            self.send_uplink(now, uplink)?;
        }
        Ok(())
    }

    fn postpone(&mut self, at: Duration, uplink: Uplink) -> Result<(), MacError<R::Error>> {
        if let Some(id) = self.next_tx.take() {
            if self.timers.cancel(id) {
                debug!("dropping previously postponed transmission");
            }
        }
        self.pending = Some(uplink);
        self.next_tx = Some(self.schedule(at, TimerEvent::Transmit)?);
        Ok(())
    }

    fn transmit_pending(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        self.next_tx = None;
        let Some(uplink) = self.pending.take() else {
            return Ok(());
        };
        if self.radio_busy() {
            debug!("reception in progress, transmission held");
            self.hold(uplink);
            return Ok(());
        }
        if let Some(windows_end) = self.windows_end() {
            // windows closing at the same deadline run first
            self.postpone(windows_end.max(now), uplink)?;
            return Ok(());
        }
        self.transmit(now, uplink)?;
        Ok(())
    }

    fn transmit(&mut self, now: Duration, uplink: Uplink) -> Result<SendStatus, MacError<R::Error>> {
        // answers queued or a lower data rate since `send`
        if !self.fits_data_rate(&uplink) {
            return Ok(self.abort(SendAbort::PayloadTooLarge, uplink.is_retry()));
        }
        let candidates = self
            .plan
            .compatible_channels(self.state.data_rate, self.state.tx_power_dbm);
        let Some(index) = self.plan.pick_channel_for_tx(&candidates, now, &mut self.rng) else {
            error!("no channel free at transmission time");
            return Ok(self.abort(SendAbort::NoCompatibleChannel, uplink.is_retry()));
        };

        match uplink {
            Uplink::New(payload) => {
                if self.retx.is_active() {
                    let success = !self.retx.waiting_ack();
                    self.finish(success);
                }
                let frame = self.build_frame(&payload)?;
                self.mac_commands.clear();
                self.clear_windows();
                self.retx
                    .start(frame.clone(), now, self.config.confirmed, self.state.nb_trans);

                self.send_to_phy(now, index, &frame)?;
                self.retx.record_transmission();
                self.events.new_packet_sent(&frame);
                self.f_cnt = self.f_cnt.wrapping_add(1);
                self.adr.record_uplink(&mut self.state);
            }
            Uplink::Retry(frame) => {
                self.clear_windows();
                self.send_to_phy(now, index, &frame)?;
                self.retx.record_transmission();
                info!(
                    "retransmission {} of {}",
                    self.retx.transmissions(),
                    self.state.nb_trans
                );
            }
        }
        Ok(SendStatus::Sent)
    }

    fn build_frame(&self, payload: &[u8]) -> Result<Frame, CodecError> {
        let mtype = if self.config.confirmed {
            MType::ConfirmedDataUp
        } else {
            MType::UnconfirmedDataUp
        };
        let mut header = FrameHeader::new(self.config.dev_addr, self.f_cnt as u16, self.config.f_port);
        header.f_ctrl.adr = self.config.adr;
        header.f_ctrl.adr_ack_req = self.adr_ack_req;
        for command in &self.mac_commands {
            header.add_command(*command)?;
        }

        let mut frame = Frame::new();
        frame
            .push(MacHeader::new(mtype).to_byte()?)
            .map_err(|_| CodecError::BufferTooSmall)?;
        header.serialize(Direction::Uplink, &mut frame)?;
        frame
            .extend_from_slice(payload)
            .map_err(|_| CodecError::BufferTooSmall)?;
        Ok(frame)
    }

    fn send_to_phy(&mut self, now: Duration, index: u8, frame: &[u8]) -> Result<(), MacError<R::Error>> {
        let channel = *self
            .plan
            .channel(index)
            .ok_or(ConfigError::ChannelIndex(index))?;
        let params = self.tx_params(self.state.data_rate)?;
        let config = TxConfig {
            power: self.state.tx_power_dbm,
            frequency: channel.frequency,
            params,
        };
        self.radio.transmit(frame, config).map_err(MacError::Radio)?;
        self.phase = State::Transmitting;

        let air_time = phy::time_on_air(frame.len(), &params);
        self.plan.register_transmission(&channel, now, air_time)?;
        info!(
            "uplink of {} bytes on {} Hz, DR{}, {} dBm, {} us on air",
            frame.len(),
            channel.frequency,
            self.state.data_rate,
            self.state.tx_power_dbm,
            air_time.as_micros()
        );

        // RX1 listens on the uplink frequency
        let rx1_dr = self.first_receive_window_data_rate();
        let rx1 = self
            .region
            .data_rate(rx1_dr)
            .ok_or(ConfigError::InvalidDataRate(rx1_dr))?;
        self.radio
            .configure_rx(RxConfig {
                frequency: channel.frequency,
                spreading_factor: rx1.spreading_factor,
            })
            .map_err(MacError::Radio)
    }

    fn tx_params(&self, data_rate: u8) -> Result<TxParams, ConfigError> {
        let modulation = self
            .region
            .data_rate(data_rate)
            .ok_or(ConfigError::InvalidDataRate(data_rate))?;
        let mut params = TxParams::for_data_rate(modulation);
        params.modulation.coding_rate = self.config.coding_rate;
        params.preamble_symbols = self.config.preamble_symbols;
        params.header_disabled = self.config.header_disabled;
        Ok(params)
    }

    /// Length of a receive window at `data_rate`
    fn window_duration(&self, data_rate: u8) -> Duration {
        self.region
            .data_rate(data_rate)
            .map(|dr| {
                phy::symbol_duration(dr.spreading_factor, dr.bandwidth)
                    * u32::from(self.config.receive_window_symbols)
            })
            .unwrap_or_default()
    }

    fn open_first_window(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        self.radio.standby().map_err(MacError::Radio)?;
        let close_at = now + self.window_duration(self.first_receive_window_data_rate());
        self.rx1_close = Some(self.schedule(close_at, TimerEvent::CloseRx1)?);
        self.phase = State::InRx1;
        Ok(())
    }

    fn close_first_window(&mut self) -> Result<(), MacError<R::Error>> {
        self.rx1_close = None;
        match self.radio.state() {
            RadioState::Tx => {
                error!("radio transmitting when RX1 closed");
                return Err(MacError::UnexpectedRadioState);
            }
            RadioState::Rx => debug!("RX1 closed during a reception"),
            RadioState::Standby => self.radio.sleep().map_err(MacError::Radio)?,
            RadioState::Sleep => {}
        }
        if self.phase == State::InRx1 {
            self.phase = State::WaitingRx2;
        }
        Ok(())
    }

    fn open_second_window(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        self.rx2_open = None;
        if self.radio.state() == RadioState::Rx {
            debug!("still receiving in RX1, RX2 skipped");
            return Ok(());
        }

        let rx2_dr = self.state.rx2_data_rate;
        let rx2 = self
            .region
            .data_rate(rx2_dr)
            .ok_or(ConfigError::InvalidDataRate(rx2_dr))?;
        self.radio.standby().map_err(MacError::Radio)?;
        self.radio
            .configure_rx(RxConfig {
                frequency: self.state.rx2_frequency,
                spreading_factor: rx2.spreading_factor,
            })
            .map_err(MacError::Radio)?;

        let close_at = now + self.window_duration(rx2_dr);
        self.rx2_close = Some(self.schedule(close_at, TimerEvent::CloseRx2)?);
        self.phase = State::InRx2;
        Ok(())
    }

    fn close_second_window(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        self.rx2_close = None;
        match self.radio.state() {
            RadioState::Rx => {
                debug!("RX2 closed during a reception");
                return Ok(());
            }
            RadioState::Standby => self.radio.sleep().map_err(MacError::Radio)?,
            RadioState::Tx | RadioState::Sleep => {}
        }
        self.phase = State::Idle;

        if self.retx.waiting_ack() {
            debug!("no ACK in either receive window");
            self.retry_or_fail(now)
        } else {
            if self.retx.is_active() {
                self.finish(true);
            }
            Ok(())
        }
    }

    fn handle_downlink(
        &mut self,
        now: Duration,
        header: &FrameHeader,
        payload: &[u8],
        quality: RxQuality,
    ) -> Result<(), MacError<R::Error>> {
        // the exchange is over, no window left to listen in
        self.clear_windows();
        self.phase = State::Idle;
        self.adr.reset(&mut self.state);
        self.last_snr_db = quality.snr;
        debug!(
            "downlink FCnt {} with {} commands, SNR {} dB",
            header.f_cnt,
            header.commands.len(),
            quality.snr
        );

        self.parse_commands(header);
        self.events.packet_received(payload);

        // RX2 is gone, settle the uplink now
        if self.retx.waiting_ack() {
            warn!("downlink without ACK for the confirmed uplink");
            self.retry_or_fail(now)
        } else {
            if self.retx.is_active() {
                self.finish(true);
            }
            Ok(())
        }
    }

    /// Settle the uplink in flight once no receive window is left
    fn resolve_after_rx2(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        if self.is_pending(self.rx2_open) || self.is_pending(self.rx2_close) {
            return Ok(());
        }
        self.phase = State::Idle;
        if self.retx.waiting_ack() {
            self.retry_or_fail(now)
        } else {
            if self.retx.is_active() {
                self.finish(true);
            }
            Ok(())
        }
    }

    fn retry_or_fail(&mut self, now: Duration) -> Result<(), MacError<R::Error>> {
        if self.retx.can_retry() {
            if let Some(frame) = self.retx.frame().cloned() {
                debug!("{} transmissions left", self.retx.retries_left());
                self.send_uplink(now, Uplink::Retry(frame))?;
                return Ok(());
            }
        }
        info!(
            "confirmed uplink failed after {} transmissions",
            self.retx.transmissions()
        );
        self.finish(false);
        Ok(())
    }

    /// Report the outcome of the uplink in flight and forget it
    fn finish(&mut self, success: bool) {
        if let Some(frame) = self.retx.frame() {
            let outcome = TxOutcome {
                success,
                transmissions: self.retx.transmissions(),
                first_attempt: self.retx.first_attempt(),
                frame: frame.as_slice(),
            };
            self.events.transmission_finished(&outcome);
        }
        self.retx.reset();
        if matches!(self.pending, Some(Uplink::Retry(_))) {
            self.pending = None;
            if let Some(id) = self.next_tx.take() {
                self.timers.cancel(id);
            }
        }
    }

    fn abort(&mut self, reason: SendAbort, retry: bool) -> SendStatus {
        warn!("uplink aborted: {}", reason);
        self.events.transmission_aborted(reason);
        if retry {
            self.finish(false);
        }
        SendStatus::Aborted(reason)
    }

    /// Cancel every receive window timer of the last uplink
    fn clear_windows(&mut self) {
        for id in [
            self.rx1_open.take(),
            self.rx1_close.take(),
            self.rx2_open.take(),
            self.rx2_close.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.timers.cancel(id);
        }
    }

    fn schedule(&mut self, at: Duration, event: TimerEvent) -> Result<TimerId, MacError<R::Error>> {
        self.timers.schedule(at, event).ok_or(MacError::TimerQueueFull)
    }

    fn is_pending(&self, id: Option<TimerId>) -> bool {
        id.map_or(false, |id| self.timers.is_pending(id))
    }

    fn mac_commands_len(&self) -> usize {
        self.mac_commands.iter().map(MacCommand::serialized_size).sum()
    }

    /// Queue a command for the next new uplink
    pub fn add_mac_command(&mut self, command: MacCommand) -> Result<(), CodecError> {
        command.validate()?;
        let len = self.mac_commands_len() + command.serialized_size();
        if len > MAX_FOPTS_LEN {
            return Err(CodecError::OptionsTooLong(len));
        }
        self.mac_commands
            .push(command)
            .map_err(|_| CodecError::OptionsTooLong(len))
    }

    /// Commands waiting for the next new uplink
    pub fn pending_mac_commands(&self) -> &[MacCommand] {
        &self.mac_commands
    }

    /// Set the uplink data rate
    pub fn set_data_rate(&mut self, data_rate: u8) -> Result<(), ConfigError> {
        if !self.region.is_data_rate_valid(data_rate) {
            return Err(ConfigError::InvalidDataRate(data_rate));
        }
        self.state.data_rate = data_rate;
        Ok(())
    }

    /// Current uplink data rate
    pub fn data_rate(&self) -> u8 {
        self.state.data_rate
    }

    /// Set the transmission power
    pub fn set_tx_power_dbm(&mut self, tx_power_dbm: i8) {
        self.state.tx_power_dbm = tx_power_dbm;
    }

    /// Current transmission power in dBm
    pub fn tx_power_dbm(&self) -> i8 {
        self.state.tx_power_dbm
    }

    /// Set how many times a confirmed uplink may be sent
    pub fn set_max_transmissions(&mut self, nb_trans: u8) -> Result<(), ConfigError> {
        if !(1..=15).contains(&nb_trans) {
            return Err(ConfigError::InvalidNbTrans(nb_trans));
        }
        self.state.nb_trans = nb_trans;
        Ok(())
    }

    /// Transmissions allowed per confirmed uplink
    pub fn max_transmissions(&self) -> u8 {
        self.state.nb_trans
    }

    /// Set the ADR bit of uplinks, which also lets the network drive the
    /// data rate and power
    pub fn set_uplink_adr_bit(&mut self, adr: bool) {
        self.config.adr = adr;
    }

    /// ADR bit of uplinks
    pub fn uplink_adr_bit(&self) -> bool {
        self.config.adr
    }

    /// Send the next new uplinks as confirmed or unconfirmed
    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.config.confirmed = confirmed;
    }

    /// Whether new uplinks are confirmed
    pub fn is_confirmed(&self) -> bool {
        self.config.confirmed
    }

    /// Set the power source reported in DevStatusAns
    pub fn set_power_source(&mut self, power_source: PowerSource) {
        self.config.power_source = power_source;
    }

    /// Margin from the last LinkCheckAns in dB
    pub fn last_link_margin(&self) -> u8 {
        self.last_link_margin
    }

    /// Gateway count from the last LinkCheckAns
    pub fn last_gateway_count(&self) -> u8 {
        self.last_gateway_count
    }

    /// Aggregated duty cycle set by the network
    pub fn aggregated_duty_cycle(&self) -> DutyCycle {
        self.state.aggregated_duty_cycle
    }

    /// Data rate of RX1 for the current uplink data rate
    pub fn first_receive_window_data_rate(&self) -> u8 {
        self.region
            .reply_data_rate(self.state.data_rate, self.state.rx1_dr_offset)
            .unwrap_or(self.state.data_rate)
    }

    /// Data rate of RX2
    pub fn second_receive_window_data_rate(&self) -> u8 {
        self.state.rx2_data_rate
    }

    /// Frequency of RX2 in Hz
    pub fn second_receive_window_frequency(&self) -> u32 {
        self.state.rx2_frequency
    }

    /// Offset between uplink and RX1 data rate
    pub fn rx1_dr_offset(&self) -> u8 {
        self.state.rx1_dr_offset
    }

    /// Frame counter of the next new uplink
    pub fn frame_counter(&self) -> u32 {
        self.f_cnt
    }

    /// Uplinks since the last downlink
    pub fn adr_ack_counter(&self) -> u16 {
        self.state.adr_ack_counter
    }

    /// Whether the last uplink asked the network for a downlink (ADRACKReq)
    pub fn adr_ack_requested(&self) -> bool {
        self.adr_ack_req
    }

    /// Whether a confirmed uplink is waiting for its ACK
    pub fn is_waiting_ack(&self) -> bool {
        self.retx.waiting_ack()
    }

    /// Whether an uplink is postponed or held until the radio is free
    pub fn has_pending_transmission(&self) -> bool {
        self.pending.is_some()
    }

    /// Receive window state
    pub fn state(&self) -> State {
        self.phase
    }

    /// Channel plan and duty-cycle bookkeeping
    pub fn channel_plan(&self) -> &ChannelPlan {
        &self.plan
    }

    /// Mutable access to the channel plan
    pub fn channel_plan_mut(&mut self) -> &mut ChannelPlan {
        &mut self.plan
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Radio driver
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the radio driver
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Event observer
    pub fn events(&self) -> &EV {
        &self.events
    }

    /// Mutable access to the event observer
    pub fn events_mut(&mut self) -> &mut EV {
        &mut self.events
    }
}
