//! Duty-cycle admission control
//!
//! Airtime is accounted per sub-band: a transmission on any channel closes
//! its whole sub-band for `air_time / duty_cycle`, so every channel sharing
//! the sub-band reports the same wait time.

use core::time::Duration;

use heapless::Vec;
use log::{debug, trace, warn};
use rand::{Rng, RngCore};

use super::channels::{ChannelPlan, LogicalChannel, MAX_CHANNELS};
use crate::config::device::ConfigError;

/// Channel indices eligible for an uplink
pub type Candidates = Vec<u8, MAX_CHANNELS>;

impl ChannelPlan {
    /// Time left before `channel` may transmit
    ///
    /// A channel outside every sub-band can never transmit and reports
    /// `Duration::MAX`.
    pub fn wait_time_for(&self, channel: &LogicalChannel, now: Duration) -> Duration {
        match self.sub_band_for(channel.frequency) {
            Some(sub_band) => sub_band.next_transmit_time.saturating_sub(now),
            None => {
                warn!("frequency {} Hz is out of band", channel.frequency);
                Duration::MAX
            }
        }
    }

    /// Account `air_time` spent on `channel` starting at `now`
    pub fn register_transmission(
        &mut self,
        channel: &LogicalChannel,
        now: Duration,
        air_time: Duration,
    ) -> Result<(), ConfigError> {
        let sub_band = self
            .sub_band_for_mut(channel.frequency)
            .ok_or(ConfigError::FrequencyOutOfBand(channel.frequency))?;
        sub_band.next_transmit_time = now + sub_band.duty_cycle.off_period(air_time);
        debug!(
            "{} Hz: {} us on air, sub-band closed until {} ms",
            channel.frequency,
            air_time.as_micros(),
            sub_band.next_transmit_time.as_millis()
        );
        Ok(())
    }

    /// Enabled channels supporting `data_rate` in a sub-band allowing `tx_power_dbm`
    pub fn compatible_channels(&self, data_rate: u8, tx_power_dbm: i8) -> Candidates {
        let mut candidates = Candidates::new();
        for (index, channel) in self.channels() {
            if !channel.enabled || !channel.supports(data_rate) {
                continue;
            }
            let Some(sub_band) = self.sub_band_for(channel.frequency) else {
                continue;
            };
            if tx_power_dbm <= sub_band.max_tx_power_dbm {
                // one entry per slot, never more than MAX_CHANNELS
                let _ = candidates.push(index);
            }
        }
        trace!("{} compatible channels for DR{}", candidates.len(), data_rate);
        candidates
    }

    /// Shortest wait across `candidates`, `None` when there are none
    pub fn min_wait_time(&self, candidates: &[u8], now: Duration) -> Option<Duration> {
        candidates
            .iter()
            .filter_map(|&i| self.channel(i))
            .map(|channel| self.wait_time_for(channel, now))
            .min()
    }

    /// Pick uniformly at random among `candidates` that may transmit right now
    pub fn pick_channel_for_tx<R: RngCore>(
        &self,
        candidates: &[u8],
        now: Duration,
        rng: &mut R,
    ) -> Option<u8> {
        let ready: Candidates = candidates
            .iter()
            .copied()
            .filter(|&i| {
                self.channel(i)
                    .map(|channel| self.wait_time_for(channel, now).is_zero())
                    .unwrap_or(false)
            })
            .collect();
        if ready.is_empty() {
            debug!("no channel free for transmission");
            return None;
        }
        Some(ready[rng.gen_range(0..ready.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::region::{Eu868, Region};
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_wait_time_saturates_at_zero() {
        let plan = Eu868::new().default_channel_plan();
        let channel = *plan.channel(0).unwrap();
        assert_eq!(plan.wait_time_for(&channel, Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_wait_time_shared_by_sub_band() {
        let mut plan = Eu868::new().default_channel_plan();
        plan.set_channel(3, LogicalChannel::new(869_500_000, 0, 5)).unwrap();
        let (ch0, ch1, ch3) = (
            *plan.channel(0).unwrap(),
            *plan.channel(1).unwrap(),
            *plan.channel(3).unwrap(),
        );
        let start = Duration::from_secs(1);
        plan.register_transmission(&ch0, start, Duration::from_millis(100))
            .unwrap();

        // 100 ms at 1% closes 868.0-868.6 MHz for 10 s from the start
        assert_eq!(plan.wait_time_for(&ch0, start), Duration::from_secs(10));
        assert_eq!(plan.wait_time_for(&ch1, start), Duration::from_secs(10));
        assert_eq!(plan.wait_time_for(&ch3, start), Duration::ZERO);
        assert_eq!(
            plan.wait_time_for(&ch1, Duration::from_secs(6)),
            Duration::from_secs(5)
        );
        assert_eq!(plan.min_wait_time(&[0, 1, 3], start), Some(Duration::ZERO));
        assert_eq!(plan.min_wait_time(&[0, 1], start), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_pick_skips_busy_sub_band() {
        let mut plan = Eu868::new().default_channel_plan();
        plan.set_channel(3, LogicalChannel::new(869_500_000, 0, 5)).unwrap();
        let busy = *plan.channel(0).unwrap();
        plan.register_transmission(&busy, Duration::ZERO, Duration::from_millis(50))
            .unwrap();

        let candidates = plan.compatible_channels(0, 14);
        assert_eq!(candidates.as_slice(), &[0, 1, 2, 3]);

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(
                plan.pick_channel_for_tx(&candidates, Duration::from_millis(100), &mut rng),
                Some(3)
            );
        }
    }
}
