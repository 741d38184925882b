#![allow(dead_code)]

use core::time::Duration;

use lorawan_mac::{
    class::{ClassA, MacEvents, SendAbort, SendStatus, TxOutcome},
    config::{DevAddr, DeviceConfig},
    lorawan::{
        commands::{Direction, MacCommand},
        mac::{Frame, FrameHeader, MType, MacHeader},
        region::Eu868,
    },
    radio::traits::{Radio, RadioState, RxConfig, TxConfig},
};
use rand::{rngs::SmallRng, SeedableRng};

/// Mock radio error type
#[derive(Debug)]
pub enum MockError {
    /// Generic error
    Error,
}

/// Mock radio for testing
pub struct MockRadio {
    state: RadioState,
    transmissions: Vec<(Vec<u8>, TxConfig)>,
    rx_configs: Vec<RxConfig>,
}

impl MockRadio {
    /// Create new mock radio
    pub fn new() -> Self {
        Self {
            state: RadioState::Sleep,
            transmissions: Vec::new(),
            rx_configs: Vec::new(),
        }
    }

    /// Force the transceiver state, e.g. to simulate a preamble lock
    pub fn set_state(&mut self, state: RadioState) {
        self.state = state;
    }

    /// Get last transmitted data
    pub fn get_last_tx(&self) -> Option<&[u8]> {
        self.transmissions.last().map(|(frame, _)| frame.as_slice())
    }

    /// Get the configuration of the last transmission
    pub fn get_last_tx_config(&self) -> Option<TxConfig> {
        self.transmissions.last().map(|(_, config)| *config)
    }

    /// Number of frames transmitted
    pub fn tx_count(&self) -> usize {
        self.transmissions.len()
    }

    /// Every frame transmitted, oldest first
    pub fn transmitted(&self) -> impl Iterator<Item = &[u8]> {
        self.transmissions.iter().map(|(frame, _)| frame.as_slice())
    }

    /// Receiver configurations, oldest first
    pub fn rx_configs(&self) -> &[RxConfig] {
        &self.rx_configs
    }
}

impl Radio for MockRadio {
    type Error = MockError;

    fn transmit(&mut self, frame: &[u8], config: TxConfig) -> Result<(), Self::Error> {
        self.transmissions.push((frame.to_vec(), config));
        self.state = RadioState::Tx;
        Ok(())
    }

    fn configure_rx(&mut self, config: RxConfig) -> Result<(), Self::Error> {
        self.rx_configs.push(config);
        Ok(())
    }

    fn standby(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Standby;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Sleep;
        Ok(())
    }

    fn state(&self) -> RadioState {
        self.state
    }
}

/// Outcome reported through `transmission_finished`
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub success: bool,
    pub transmissions: u8,
    pub first_attempt: Duration,
    pub frame: Vec<u8>,
}

/// Observer recording every MAC event
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub finished: Vec<Finished>,
    pub sent: Vec<Vec<u8>>,
    pub postponed: Vec<Duration>,
    pub received: Vec<Vec<u8>>,
    pub aborted: Vec<SendAbort>,
}

impl MacEvents for RecordingEvents {
    fn transmission_finished(&mut self, outcome: &TxOutcome<'_>) {
        self.finished.push(Finished {
            success: outcome.success,
            transmissions: outcome.transmissions,
            first_attempt: outcome.first_attempt,
            frame: outcome.frame.to_vec(),
        });
    }

    fn new_packet_sent(&mut self, frame: &[u8]) {
        self.sent.push(frame.to_vec());
    }

    fn transmission_postponed(&mut self, delay: Duration) {
        self.postponed.push(delay);
    }

    fn packet_received(&mut self, payload: &[u8]) {
        self.received.push(payload.to_vec());
    }

    fn transmission_aborted(&mut self, reason: SendAbort) {
        self.aborted.push(reason);
    }
}

pub type TestDevice = ClassA<MockRadio, Eu868, SmallRng, RecordingEvents>;

pub const DEV_ADDR: DevAddr = DevAddr(0x2601_1F42);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device with the default EU868 configuration
pub fn create_test_device() -> TestDevice {
    create_device_with(DeviceConfig::new(DEV_ADDR))
}

pub fn create_device_with(config: DeviceConfig) -> TestDevice {
    init_logger();
    ClassA::new(
        MockRadio::new(),
        Eu868::new(),
        config,
        SmallRng::seed_from_u64(0x5EED),
        RecordingEvents::default(),
    )
    .unwrap()
}

/// Run every timer up to `until`, completing transmissions as soon as they start
pub fn run_until(device: &mut TestDevice, until: Duration) {
    while let Some(deadline) = device.next_deadline() {
        if deadline > until {
            break;
        }
        device.handle_timers(deadline).unwrap();
        if device.radio().state() == RadioState::Tx {
            device.on_tx_finished(deadline).unwrap();
        }
    }
}

/// Run every pending timer
pub fn run_to_completion(device: &mut TestDevice) {
    run_until(device, Duration::MAX);
}

/// Unconfirmed downlink for `dev_addr`
pub fn downlink(dev_addr: DevAddr, ack: bool, commands: &[MacCommand], payload: &[u8]) -> Vec<u8> {
    let mut header = FrameHeader::new(dev_addr, 0, 1);
    header.f_ctrl.ack = ack;
    for command in commands {
        header.add_command(*command).unwrap();
    }

    let mut frame = Frame::new();
    frame
        .push(MacHeader::new(MType::UnconfirmedDataDown).to_byte().unwrap())
        .unwrap();
    header.serialize(Direction::Downlink, &mut frame).unwrap();
    frame.extend_from_slice(payload).unwrap();
    frame.to_vec()
}

/// Decode the MAC and frame headers of an uplink
pub fn parse_uplink(frame: &[u8]) -> (MacHeader, FrameHeader) {
    let (mhdr, used) = MacHeader::deserialize(frame).unwrap();
    let (fhdr, _) = FrameHeader::deserialize(&frame[used..], Direction::Uplink).unwrap();
    (mhdr, fhdr)
}

/// Send `payload` at `now`, completing the transmission immediately when it
/// goes on air
pub fn send_uplink(device: &mut TestDevice, now: Duration, payload: &[u8]) -> SendStatus {
    let status = device.send(now, payload).unwrap();
    if device.radio().state() == RadioState::Tx {
        device.on_tx_finished(now).unwrap();
    }
    status
}
