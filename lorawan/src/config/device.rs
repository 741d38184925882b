use core::time::Duration;

use thiserror::Error;

use crate::device::power::PowerSource;
use crate::lorawan::channels::DutyCycle;
use crate::lorawan::region::Region;

/// Device address, serialized big-endian in the frame header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr(pub u32);

impl DevAddr {
    /// Address from its four wire bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Wire representation
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<u32> for DevAddr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

/// Configuration validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Data rate not defined by the region
    #[error("data rate DR{0} is not defined in this region")]
    InvalidDataRate(u8),
    /// Number of transmissions outside 1..=15
    #[error("number of transmissions {0} outside 1..=15")]
    InvalidNbTrans(u8),
    /// Second window must open after the first
    #[error("receive delay 2 must be later than receive delay 1")]
    InvalidReceiveDelays,
    /// Receive windows need at least one symbol
    #[error("receive window must last at least one symbol")]
    InvalidWindowSymbols,
    /// Application port outside 1..=223
    #[error("application port {0} outside 1..=223")]
    InvalidPort(u8),
    /// Coding rate outside 1..=4 (4/5 to 4/8)
    #[error("coding rate {0} outside 1..=4")]
    InvalidCodingRate(u8),
    /// Channel slot outside the channel table
    #[error("channel index {0} outside the channel table")]
    ChannelIndex(u8),
    /// Frequency not covered by any sub-band
    #[error("frequency {0} Hz is not inside any sub-band")]
    FrequencyOutOfBand(u32),
    /// Sub-band table is full
    #[error("sub-band table is full")]
    SubBandTableFull,
}

/// Static configuration of a Class A end device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device address
    pub dev_addr: DevAddr,
    /// Whether the network may drive the data rate (ADR bit)
    pub adr: bool,
    /// Send confirmed uplinks
    pub confirmed: bool,
    /// Initial data rate
    pub data_rate: u8,
    /// Initial transmission power in dBm
    pub tx_power_dbm: i8,
    /// Transmissions per confirmed uplink
    pub nb_trans: u8,
    /// Delay between end of uplink and RX1 opening
    pub receive_delay1: Duration,
    /// Delay between end of uplink and RX2 opening
    pub receive_delay2: Duration,
    /// Length of a receive window in symbols
    pub receive_window_symbols: u8,
    /// Application port for uplinks
    pub f_port: u8,
    /// Coding rate index (1 = 4/5 ... 4 = 4/8)
    pub coding_rate: u8,
    /// Preamble length in symbols
    pub preamble_symbols: u16,
    /// Implicit header mode
    pub header_disabled: bool,
    /// How the device is powered, reported in DevStatusAns
    pub power_source: PowerSource,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            dev_addr: DevAddr::default(),
            adr: true,
            confirmed: false,
            data_rate: 0,
            tx_power_dbm: 14,
            nb_trans: 1,
            receive_delay1: Duration::from_secs(1),
            receive_delay2: Duration::from_secs(2),
            receive_window_symbols: 8,
            f_port: 1,
            coding_rate: 1,
            preamble_symbols: 8,
            header_disabled: false,
            power_source: PowerSource::External,
        }
    }
}

impl DeviceConfig {
    /// Default configuration for the device at `dev_addr`
    pub fn new(dev_addr: DevAddr) -> Self {
        Self {
            dev_addr,
            ..Self::default()
        }
    }

    /// Check the configuration against the region
    pub fn validate<REG: Region>(&self, region: &REG) -> Result<(), ConfigError> {
        if region.data_rate(self.data_rate).is_none() {
            return Err(ConfigError::InvalidDataRate(self.data_rate));
        }
        if !(1..=15).contains(&self.nb_trans) {
            return Err(ConfigError::InvalidNbTrans(self.nb_trans));
        }
        if self.receive_delay2 <= self.receive_delay1 {
            return Err(ConfigError::InvalidReceiveDelays);
        }
        if self.receive_window_symbols == 0 {
            return Err(ConfigError::InvalidWindowSymbols);
        }
        if !(1..=223).contains(&self.f_port) {
            return Err(ConfigError::InvalidPort(self.f_port));
        }
        if !(1..=4).contains(&self.coding_rate) {
            return Err(ConfigError::InvalidCodingRate(self.coding_rate));
        }
        Ok(())
    }
}

/// Radio parameters the network and the back-off procedure adjust at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRadioState {
    /// Current uplink data rate
    pub data_rate: u8,
    /// Current transmission power in dBm
    pub tx_power_dbm: i8,
    /// Transmissions per confirmed uplink
    pub nb_trans: u8,
    /// Aggregated duty cycle set by DutyCycleReq
    pub aggregated_duty_cycle: DutyCycle,
    /// Uplinks since the last downlink
    pub adr_ack_counter: u16,
    /// Offset between uplink and RX1 data rate
    pub rx1_dr_offset: u8,
    /// RX2 data rate
    pub rx2_data_rate: u8,
    /// RX2 frequency in Hz
    pub rx2_frequency: u32,
}

impl DeviceRadioState {
    /// Initial state from the configuration and the regional RX2 defaults
    pub fn new<REG: Region>(config: &DeviceConfig, region: &REG) -> Self {
        let (rx2_frequency, rx2_data_rate) = region.rx2_defaults();
        Self {
            data_rate: config.data_rate,
            tx_power_dbm: config.tx_power_dbm,
            nb_trans: config.nb_trans,
            aggregated_duty_cycle: DutyCycle::one_in(1),
            adr_ack_counter: 0,
            rx1_dr_offset: 0,
            rx2_data_rate,
            rx2_frequency,
        }
    }
}
