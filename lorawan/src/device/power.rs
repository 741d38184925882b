//! Power source reporting for LoRaWAN devices
//!
//! This module maps the device power supply to the values reported in a
//! DevStatusAns:
//! - Battery level byte
//! - Demodulation margin of the last downlink

/// Battery byte for an externally powered device
pub const BATTERY_EXTERNAL: u8 = 0;

/// Battery byte when the level cannot be measured
pub const BATTERY_UNKNOWN: u8 = 255;

/// How the device is powered
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSource {
    /// Mains or other external supply
    External,
    /// Battery with known remaining energy
    Battery {
        /// Remaining energy as a fraction of full capacity (0.0 - 1.0)
        energy_fraction: f32,
    },
    /// Battery whose level cannot be measured
    Unmeasured,
}

impl Default for PowerSource {
    fn default() -> Self {
        PowerSource::External
    }
}

impl PowerSource {
    /// Battery field of DevStatusAns
    ///
    /// 0 means external power, 1 to 254 scale from empty to full and 255
    /// means the level is unknown.
    pub fn battery_level(&self) -> u8 {
        match *self {
            PowerSource::External => BATTERY_EXTERNAL,
            PowerSource::Battery { energy_fraction } => {
                if !(0.0..=1.0).contains(&energy_fraction) {
                    return BATTERY_UNKNOWN;
                }
                let level = energy_fraction * 253.0 + 1.5;
                (level as u8).clamp(1, 254)
            }
            PowerSource::Unmeasured => BATTERY_UNKNOWN,
        }
    }
}

/// Margin field of DevStatusAns: the last SNR clamped to the signed 6-bit range
pub fn status_margin(last_snr_db: i8) -> i8 {
    last_snr_db.clamp(-32, 31)
}
