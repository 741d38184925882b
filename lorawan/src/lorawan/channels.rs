//! Logical channel table and regulatory sub-bands
//!
//! Channels live in a fixed table of slots addressed by index; an empty slot
//! is a hole in the plan. Every channel belongs to the sub-band whose
//! frequency range contains it, and the sub-band carries the duty-cycle
//! bookkeeping shared by all of its channels.

use core::time::Duration;

use heapless::Vec;

use crate::config::device::ConfigError;

/// Number of channel slots
pub const MAX_CHANNELS: usize = 16;

/// Number of sub-bands a plan can hold
pub const MAX_SUB_BANDS: usize = 8;

/// Duty cycle expressed as one unit of airtime in `N`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyCycle {
    one_in: u32,
}

impl DutyCycle {
    /// Duty cycle of 1/`n`, `n` of zero is treated as one
    pub const fn one_in(n: u32) -> Self {
        Self {
            one_in: if n == 0 { 1 } else { n },
        }
    }

    /// Duty cycle of 1/2^`exponent`, as carried by DutyCycleReq
    pub fn from_exponent(exponent: u8) -> Self {
        Self::one_in(1u32 << exponent.min(31))
    }

    /// Denominator of the fraction
    pub fn denominator(&self) -> u32 {
        self.one_in
    }

    /// Duty cycle as a fraction of time
    pub fn fraction(&self) -> f32 {
        1.0 / self.one_in as f32
    }

    /// Time the band stays closed after `air_time` on it, counted from the
    /// start of the transmission
    pub fn off_period(&self, air_time: Duration) -> Duration {
        air_time * self.one_in
    }
}

/// A logical uplink channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalChannel {
    /// Center frequency in Hz
    pub frequency: u32,
    /// Minimum data rate
    pub min_dr: u8,
    /// Maximum data rate
    pub max_dr: u8,
    /// Whether uplinks may use the channel
    pub enabled: bool,
}

impl LogicalChannel {
    /// Enabled channel at `frequency` accepting `min_dr..=max_dr`
    pub fn new(frequency: u32, min_dr: u8, max_dr: u8) -> Self {
        Self {
            frequency,
            min_dr,
            max_dr,
            enabled: true,
        }
    }

    /// Whether the channel's data rate range covers `data_rate`
    pub fn supports(&self, data_rate: u8) -> bool {
        (self.min_dr..=self.max_dr).contains(&data_rate)
    }
}

/// A regulatory sub-band
#[derive(Debug, Clone, PartialEq)]
pub struct SubBand {
    /// Lower frequency bound in Hz
    pub first_frequency: u32,
    /// Upper frequency bound in Hz
    pub last_frequency: u32,
    /// Maximum duty cycle
    pub duty_cycle: DutyCycle,
    /// Maximum transmission power in dBm
    pub max_tx_power_dbm: i8,
    /// Earliest time a new transmission may start
    pub next_transmit_time: Duration,
}

impl SubBand {
    /// Sub-band spanning `first_frequency..last_frequency`
    pub fn new(
        first_frequency: u32,
        last_frequency: u32,
        duty_cycle: DutyCycle,
        max_tx_power_dbm: i8,
    ) -> Self {
        Self {
            first_frequency,
            last_frequency,
            duty_cycle,
            max_tx_power_dbm,
            next_transmit_time: Duration::ZERO,
        }
    }

    /// Whether `frequency` lies strictly inside the sub-band
    ///
    /// Both edges are excluded, so a channel sitting exactly on a boundary
    /// belongs to no sub-band.
    pub fn contains(&self, frequency: u32) -> bool {
        frequency > self.first_frequency && frequency < self.last_frequency
    }
}

/// Channel table plus the sub-bands its channels belong to
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    pub(crate) channels: [Option<LogicalChannel>; MAX_CHANNELS],
    pub(crate) sub_bands: Vec<SubBand, MAX_SUB_BANDS>,
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPlan {
    /// Empty plan with no channels and no sub-bands
    pub fn new() -> Self {
        Self {
            channels: [None; MAX_CHANNELS],
            sub_bands: Vec::new(),
        }
    }

    /// Channel in slot `index`, `None` for an empty or out of range slot
    pub fn channel(&self, index: u8) -> Option<&LogicalChannel> {
        self.channels.get(usize::from(index))?.as_ref()
    }

    /// Mutable access to the channel in slot `index`
    pub fn channel_mut(&mut self, index: u8) -> Option<&mut LogicalChannel> {
        self.channels.get_mut(usize::from(index))?.as_mut()
    }

    /// Put `channel` in slot `index`, replacing what was there
    pub fn set_channel(&mut self, index: u8, channel: LogicalChannel) -> Result<(), ConfigError> {
        let slot = self
            .channels
            .get_mut(usize::from(index))
            .ok_or(ConfigError::ChannelIndex(index))?;
        *slot = Some(channel);
        Ok(())
    }

    /// Empty slot `index`
    pub fn remove_channel(&mut self, index: u8) -> Result<(), ConfigError> {
        let slot = self
            .channels
            .get_mut(usize::from(index))
            .ok_or(ConfigError::ChannelIndex(index))?;
        *slot = None;
        Ok(())
    }

    /// Occupied slots with their index
    pub fn channels(&self) -> impl Iterator<Item = (u8, &LogicalChannel)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (i as u8, c)))
    }

    /// Register a sub-band
    pub fn add_sub_band(&mut self, sub_band: SubBand) -> Result<(), ConfigError> {
        self.sub_bands
            .push(sub_band)
            .map_err(|_| ConfigError::SubBandTableFull)
    }

    /// Registered sub-bands
    pub fn sub_bands(&self) -> &[SubBand] {
        &self.sub_bands
    }

    /// Sub-band containing `frequency`
    pub fn sub_band_for(&self, frequency: u32) -> Option<&SubBand> {
        self.sub_bands.iter().find(|sb| sb.contains(frequency))
    }

    pub(crate) fn sub_band_for_mut(&mut self, frequency: u32) -> Option<&mut SubBand> {
        self.sub_bands.iter_mut().find(|sb| sb.contains(frequency))
    }

    /// Whether some sub-band contains `frequency`
    pub fn is_frequency_valid(&self, frequency: u32) -> bool {
        self.sub_band_for(frequency).is_some()
    }

    /// Enable or disable uplinks on every occupied slot according to `mask`
    pub fn apply_channel_mask(&mut self, mask: u16) {
        for (i, slot) in self.channels.iter_mut().enumerate() {
            if let Some(channel) = slot {
                channel.enabled = mask & (1 << i) != 0;
            }
        }
    }

    /// Mask with a bit set for every occupied slot
    pub fn occupied_mask(&self) -> u16 {
        self.channels()
            .fold(0, |mask, (i, _)| mask | 1 << i)
    }
}
