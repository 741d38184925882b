//! ADR back-off
//!
//! The device counts uplinks since the last downlink. Past `ADR_ACK_LIMIT`
//! it asks the network for a sign of life (ADRACKReq) and every further
//! `ADR_ACK_DELAY` uplinks it falls back one step towards the most robust
//! transmission settings.

use log::{debug, info};

use super::channels::ChannelPlan;
use super::region::Region;
use crate::config::device::DeviceRadioState;

/// Uplinks without downlink before ADRACKReq is set
pub const ADR_ACK_LIMIT: u16 = 64;

/// Uplinks between two back-off steps once the limit is reached
pub const ADR_ACK_DELAY: u16 = 32;

/// One step of the back-off procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackoffStep {
    /// Transmission power raised back to the default
    TxPowerRestored(i8),
    /// Data rate lowered to the given value
    DataRateLowered(u8),
    /// nbTrans reset to 1 and default channels re-enabled
    DefaultChannelsRestored,
}

/// Outcome of the back-off check made before an uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdrAckStatus {
    /// Value of the ADRACKReq bit for the uplink
    pub ack_req: bool,
    /// Step applied, if any
    pub step: Option<BackoffStep>,
}

/// ADR back-off controller
#[derive(Debug, Clone, Copy)]
pub struct AdrBackoff {
    limit: u16,
    delay: u16,
}

impl Default for AdrBackoff {
    fn default() -> Self {
        Self::new(ADR_ACK_LIMIT, ADR_ACK_DELAY)
    }
}

impl AdrBackoff {
    /// Controller with custom limit and delay
    pub fn new(limit: u16, delay: u16) -> Self {
        Self { limit, delay }
    }

    /// Run before a new uplink is sent
    ///
    /// Once the counter reaches `limit + delay` one back-off step is applied
    /// (only when ADR is enabled) and the counter falls back to `limit`.
    pub fn before_uplink<REG: Region>(
        &self,
        state: &mut DeviceRadioState,
        adr_enabled: bool,
        plan: &mut ChannelPlan,
        region: &REG,
    ) -> AdrAckStatus {
        let ack_req = state.adr_ack_counter >= self.limit;

        let mut step = None;
        if state.adr_ack_counter >= self.limit.saturating_add(self.delay) {
            if adr_enabled {
                step = Some(self.step(state, plan, region));
            }
            state.adr_ack_counter = self.limit;
        }

        AdrAckStatus { ack_req, step }
    }

    /// Apply the highest priority back-off step
    pub fn step<REG: Region>(
        &self,
        state: &mut DeviceRadioState,
        plan: &mut ChannelPlan,
        region: &REG,
    ) -> BackoffStep {
        let default_power = region.default_tx_power_dbm();
        let step = if state.tx_power_dbm < default_power {
            state.tx_power_dbm = default_power;
            BackoffStep::TxPowerRestored(default_power)
        } else if state.data_rate > 0 {
            state.data_rate -= 1;
            BackoffStep::DataRateLowered(state.data_rate)
        } else {
            state.nb_trans = 1;
            for index in 0..region.default_channel_count() {
                if let Some(channel) = plan.channel_mut(index) {
                    channel.enabled = true;
                }
            }
            BackoffStep::DefaultChannelsRestored
        };
        info!("ADR back-off: {:?}", step);
        step
    }

    /// Count a new uplink
    pub fn record_uplink(&self, state: &mut DeviceRadioState) {
        state.adr_ack_counter = state.adr_ack_counter.saturating_add(1);
    }

    /// A downlink reached the device
    pub fn reset(&self, state: &mut DeviceRadioState) {
        if state.adr_ack_counter != 0 {
            debug!("ADR ack counter reset from {}", state.adr_ack_counter);
        }
        state.adr_ack_counter = 0;
    }
}
