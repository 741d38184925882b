use crate::lorawan::phy::TxParams;

/// Radio modulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModulationParams {
    /// Spreading factor (SF7-SF12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz
    pub bandwidth: u32,
    /// Coding rate index (1 = 4/5, 2 = 4/6, 3 = 4/7, 4 = 4/8)
    pub coding_rate: u8,
}

/// Radio transmission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxConfig {
    /// Transmission power in dBm
    pub power: i8,
    /// Frequency in Hz
    pub frequency: u32,
    /// Airtime-relevant LoRa parameters
    pub params: TxParams,
}

/// Radio receive parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxConfig {
    /// Frequency in Hz
    pub frequency: u32,
    /// Spreading factor to listen for
    pub spreading_factor: u8,
}

/// Operating state of the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Transmitting
    Tx,
    /// Locked on a preamble and receiving
    Rx,
    /// Listening, nothing detected yet
    Standby,
    /// Powered down
    Sleep,
}

/// Link quality of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxQuality {
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Signal to noise ratio in dB
    pub snr: i8,
}

/// Physical layer seen from the MAC
///
/// The radio reports back through the MAC's `on_tx_finished`,
/// `on_packet_received` and `on_reception_failed` handlers.
pub trait Radio {
    /// Error type for radio operations
    type Error;

    /// Start transmitting `frame`
    fn transmit(&mut self, frame: &[u8], config: TxConfig) -> Result<(), Self::Error>;

    /// Tune the receiver for the next window
    fn configure_rx(&mut self, config: RxConfig) -> Result<(), Self::Error>;

    /// Put the radio into standby (listening) mode
    fn standby(&mut self) -> Result<(), Self::Error>;

    /// Put the radio into sleep mode
    fn sleep(&mut self) -> Result<(), Self::Error>;

    /// Current transceiver state
    fn state(&self) -> RadioState;
}
