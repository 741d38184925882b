use super::channels::{ChannelPlan, DutyCycle, LogicalChannel, SubBand};

/// Modulation behind a data rate index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataRate {
    /// Spreading factor (SF7-SF12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz
    pub bandwidth: u32,
}

impl DataRate {
    const fn new(spreading_factor: u8, bandwidth: u32) -> Self {
        Self {
            spreading_factor,
            bandwidth,
        }
    }
}

/// Regional parameters the MAC layer depends on
pub trait Region {
    /// Modulation for a data rate index, `None` if the index is undefined
    fn data_rate(&self, index: u8) -> Option<DataRate>;

    /// Maximum MACPayload size for a data rate
    fn max_mac_payload(&self, data_rate: u8) -> Option<usize>;

    /// RX1 data rate for an uplink data rate and RX1 offset
    fn reply_data_rate(&self, data_rate: u8, rx1_dr_offset: u8) -> Option<u8>;

    /// Output power in dBm for a TXPower index
    fn tx_power_dbm(&self, index: u8) -> Option<i8>;

    /// Default transmission power in dBm
    fn default_tx_power_dbm(&self) -> i8;

    /// Number of channels every device supports out of the box
    fn default_channel_count(&self) -> u8;

    /// Channel plan with the default channels and the regulatory sub-bands
    fn default_channel_plan(&self) -> ChannelPlan;

    /// RX2 frequency in Hz and data rate
    fn rx2_defaults(&self) -> (u32, u8);

    /// Whether a data rate index is defined
    fn is_data_rate_valid(&self, index: u8) -> bool {
        self.data_rate(index).is_some()
    }
}

/// EU 863-870 MHz ISM band
#[derive(Debug, Clone, Copy, Default)]
pub struct Eu868;

const EU868_DATA_RATES: [DataRate; 7] = [
    DataRate::new(12, 125_000),
    DataRate::new(11, 125_000),
    DataRate::new(10, 125_000),
    DataRate::new(9, 125_000),
    DataRate::new(8, 125_000),
    DataRate::new(7, 125_000),
    DataRate::new(7, 250_000),
];

const EU868_MAX_MAC_PAYLOAD: [usize; 7] = [59, 59, 59, 123, 230, 230, 230];

/// Number of RX1 data rate offsets defined
const EU868_RX1_DR_OFFSETS: u8 = 6;

const EU868_MAX_TX_POWER_INDEX: u8 = 7;

const EU868_DEFAULT_FREQUENCIES: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

/// (first, last, one in N duty cycle, max dBm)
const EU868_SUB_BANDS: [(u32, u32, u32, i8); 6] = [
    (863_000_000, 865_000_000, 1000, 14),
    (865_000_000, 868_000_000, 100, 14),
    (868_000_000, 868_600_000, 100, 14),
    (868_700_000, 869_200_000, 1000, 14),
    (869_400_000, 869_650_000, 10, 27),
    (869_700_000, 870_000_000, 100, 14),
];

impl Eu868 {
    /// Create the EU868 region
    pub fn new() -> Self {
        Self
    }
}

impl Region for Eu868 {
    fn data_rate(&self, index: u8) -> Option<DataRate> {
        EU868_DATA_RATES.get(usize::from(index)).copied()
    }

    fn max_mac_payload(&self, data_rate: u8) -> Option<usize> {
        EU868_MAX_MAC_PAYLOAD.get(usize::from(data_rate)).copied()
    }

    fn reply_data_rate(&self, data_rate: u8, rx1_dr_offset: u8) -> Option<u8> {
        if !self.is_data_rate_valid(data_rate) || rx1_dr_offset >= EU868_RX1_DR_OFFSETS {
            return None;
        }
        Some(data_rate.saturating_sub(rx1_dr_offset))
    }

    fn tx_power_dbm(&self, index: u8) -> Option<i8> {
        if index > EU868_MAX_TX_POWER_INDEX {
            return None;
        }
        Some(self.default_tx_power_dbm() - 2 * index as i8)
    }

    fn default_tx_power_dbm(&self) -> i8 {
        14
    }

    fn default_channel_count(&self) -> u8 {
        EU868_DEFAULT_FREQUENCIES.len() as u8
    }

    fn default_channel_plan(&self) -> ChannelPlan {
        let mut plan = ChannelPlan::new();
        for (first, last, one_in, max_dbm) in EU868_SUB_BANDS {
            // the table fits the plan's sub-band capacity
            let _ = plan.add_sub_band(SubBand::new(first, last, DutyCycle::one_in(one_in), max_dbm));
        }
        for (index, frequency) in EU868_DEFAULT_FREQUENCIES.into_iter().enumerate() {
            let _ = plan.set_channel(index as u8, LogicalChannel::new(frequency, 0, 5));
        }
        plan
    }

    fn rx2_defaults(&self) -> (u32, u8) {
        (869_525_000, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_data_rate_matrix() {
        let region = Eu868::new();
        assert_eq!(region.reply_data_rate(5, 0), Some(5));
        assert_eq!(region.reply_data_rate(5, 5), Some(0));
        assert_eq!(region.reply_data_rate(2, 4), Some(0));
        assert_eq!(region.reply_data_rate(6, 1), Some(5));
        assert_eq!(region.reply_data_rate(5, 6), None);
        assert_eq!(region.reply_data_rate(7, 0), None);
    }

    #[test]
    fn test_tx_power_table() {
        let region = Eu868::new();
        assert_eq!(region.tx_power_dbm(0), Some(14));
        assert_eq!(region.tx_power_dbm(2), Some(10));
        assert_eq!(region.tx_power_dbm(7), Some(0));
        assert_eq!(region.tx_power_dbm(8), None);
    }

    #[test]
    fn test_data_rates() {
        let region = Eu868::new();
        assert_eq!(region.data_rate(0), Some(DataRate::new(12, 125_000)));
        assert_eq!(region.data_rate(6), Some(DataRate::new(7, 250_000)));
        assert!(region.data_rate(7).is_none());
        assert_eq!(region.max_mac_payload(3), Some(123));
    }
}
