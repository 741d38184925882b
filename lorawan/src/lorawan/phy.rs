use core::time::Duration;

use super::region::DataRate;
use crate::radio::traits::ModulationParams;

/// Low data rate optimisation is mandatory above this symbol time
const LOW_DATA_RATE_SYMBOL_NS: u64 = 16_000_000;

/// Parameters of a LoRa transmission that determine its airtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxParams {
    /// Modulation parameters
    pub modulation: ModulationParams,
    /// Preamble length in symbols
    pub preamble_symbols: u16,
    /// Implicit header mode
    pub header_disabled: bool,
    /// Payload CRC present
    pub crc_enabled: bool,
    /// Low data rate optimisation (DE)
    pub low_data_rate_optimization: bool,
}

impl TxParams {
    /// Explicit header, CRC on, 8 preamble symbols and coding rate 4/5
    ///
    /// Low data rate optimisation is switched on when a symbol lasts longer
    /// than 16 ms.
    pub fn for_data_rate(data_rate: DataRate) -> Self {
        Self {
            modulation: ModulationParams {
                spreading_factor: data_rate.spreading_factor,
                bandwidth: data_rate.bandwidth,
                coding_rate: 1,
            },
            preamble_symbols: 8,
            header_disabled: false,
            crc_enabled: true,
            low_data_rate_optimization: symbol_nanos(data_rate.spreading_factor, data_rate.bandwidth)
                > LOW_DATA_RATE_SYMBOL_NS,
        }
    }
}

fn symbol_nanos(spreading_factor: u8, bandwidth: u32) -> u64 {
    if bandwidth == 0 {
        return 0;
    }
    (1u64 << spreading_factor) * 1_000_000_000 / u64::from(bandwidth)
}

/// Duration of one symbol, 2^SF / BW
pub fn symbol_duration(spreading_factor: u8, bandwidth: u32) -> Duration {
    Duration::from_nanos(symbol_nanos(spreading_factor, bandwidth))
}

/// Time on air of a `payload_len` byte PHY payload
pub fn time_on_air(payload_len: usize, params: &TxParams) -> Duration {
    let sf = i64::from(params.modulation.spreading_factor);
    let t_sym = symbol_nanos(params.modulation.spreading_factor, params.modulation.bandwidth);

    // (n_preamble + 4.25) symbols, kept in quarter symbols
    let preamble = (4 * u64::from(params.preamble_symbols) + 17) * t_sym / 4;

    let de = i64::from(params.low_data_rate_optimization);
    let crc = i64::from(params.crc_enabled);
    let header = i64::from(params.header_disabled);
    let numerator = 8 * payload_len as i64 - 4 * sf + 28 + 16 * crc - 20 * header;
    let denominator = 4 * (sf - 2 * de);
    let blocks = if numerator > 0 && denominator > 0 {
        (numerator + denominator - 1) / denominator
    } else {
        0
    };
    let payload_symbols = 8 + blocks as u64 * (u64::from(params.modulation.coding_rate) + 4);

    Duration::from_nanos(preamble + payload_symbols * t_sym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_on_air_reference_values() {
        let mut params = TxParams {
            modulation: ModulationParams {
                spreading_factor: 7,
                bandwidth: 125_000,
                coding_rate: 1,
            },
            preamble_symbols: 8,
            header_disabled: false,
            crc_enabled: true,
            low_data_rate_optimization: false,
        };
        let toa = |params: &TxParams, len| time_on_air(len, params).as_micros();

        assert_eq!(toa(&params, 10), 41_216);
        params.modulation.spreading_factor = 8;
        assert_eq!(toa(&params, 10), 72_192);
        params.header_disabled = true;
        assert_eq!(toa(&params, 10), 72_192);
        params.modulation.coding_rate = 2;
        assert_eq!(toa(&params, 10), 78_336);
        params.preamble_symbols = 10;
        assert_eq!(toa(&params, 10), 82_432);
        params.low_data_rate_optimization = true;
        assert_eq!(toa(&params, 10), 82_432);
        params.modulation.spreading_factor = 10;
        assert_eq!(toa(&params, 10), 280_576);
        params.modulation.bandwidth = 250_000;
        assert_eq!(toa(&params, 10), 140_288);
        params.modulation.bandwidth = 500_000;
        assert_eq!(toa(&params, 10), 70_144);
        params.header_disabled = false;
        assert_eq!(toa(&params, 10), 82_432);
        params.preamble_symbols = 8;
        assert_eq!(toa(&params, 10), 78_336);
        params.modulation.spreading_factor = 12;
        assert_eq!(toa(&params, 10), 264_192);
        assert_eq!(toa(&params, 50), 657_408);
        params.modulation.bandwidth = 125_000;
        assert_eq!(toa(&params, 50), 2_629_632);
        params.modulation.coding_rate = 1;
        assert_eq!(toa(&params, 50), 2_301_952);
    }

    #[test]
    fn test_low_data_rate_optimization_follows_symbol_time() {
        let sf = |spreading_factor| DataRate {
            spreading_factor,
            bandwidth: 125_000,
        };
        assert!(TxParams::for_data_rate(sf(12)).low_data_rate_optimization);
        assert!(TxParams::for_data_rate(sf(11)).low_data_rate_optimization);
        assert!(!TxParams::for_data_rate(sf(10)).low_data_rate_optimization);
        assert_eq!(symbol_duration(7, 125_000), Duration::from_micros(1024));
    }
}
