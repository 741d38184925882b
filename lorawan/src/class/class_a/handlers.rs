//! Handling of MAC commands received in downlinks
//!
//! Every request queues exactly one answer for the next new uplink. A
//! request is only applied when all of its fields are acceptable.

use log::{debug, info, warn};
use rand::RngCore;

use super::ClassA;
use crate::class::MacEvents;
use crate::device::power::status_margin;
use crate::lorawan::channels::{DutyCycle, LogicalChannel, MAX_CHANNELS};
use crate::lorawan::commands::MacCommand;
use crate::lorawan::mac::FrameHeader;
use crate::lorawan::region::Region;
use crate::radio::traits::Radio;

/// Field value meaning "keep the current setting" in LinkAdrReq
const KEEP_CURRENT: u8 = 0x0F;

/// Channels 0 to 15 are addressed by the mask
const CH_MASK_CNTL_BANK: u8 = 0;
/// Every defined channel is enabled whatever the mask
const CH_MASK_CNTL_ALL_ON: u8 = 6;

impl<R, REG, RNG, EV> ClassA<R, REG, RNG, EV>
where
    R: Radio,
    REG: Region,
    RNG: RngCore,
    EV: MacEvents,
{
    /// Process the ACK bit and the FOpts commands of a downlink for us
    pub(super) fn parse_commands(&mut self, header: &FrameHeader) {
        if self.retx.waiting_ack() && header.f_ctrl.ack {
            info!("ACK received");
            self.finish(true);
        }
        for command in header.commands.iter() {
            self.handle_command(*command);
        }
    }

    fn handle_command(&mut self, command: MacCommand) {
        debug!("handling {:?}", command);
        match command {
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                self.last_link_margin = margin;
                self.last_gateway_count = gateway_count;
            }
            MacCommand::LinkAdrReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => self.on_link_adr_req(data_rate, tx_power, ch_mask, ch_mask_cntl, nb_trans),
            MacCommand::DutyCycleReq { max_duty_cycle } => {
                self.state.aggregated_duty_cycle = DutyCycle::from_exponent(max_duty_cycle);
                info!("aggregated duty cycle 1/{}", self.state.aggregated_duty_cycle.denominator());
                self.queue_answer(MacCommand::DutyCycleAns);
            }
            MacCommand::RxParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                frequency,
            } => self.on_rx_param_setup_req(rx1_dr_offset, rx2_data_rate, frequency),
            MacCommand::DevStatusReq => {
                let answer = MacCommand::DevStatusAns {
                    battery: self.config.power_source.battery_level(),
                    margin: status_margin(self.last_snr_db),
                };
                self.queue_answer(answer);
            }
            MacCommand::NewChannelReq {
                ch_index,
                frequency,
                max_dr,
                min_dr,
            } => self.on_new_channel_req(ch_index, frequency, min_dr, max_dr),
            MacCommand::RxTimingSetupReq { delay } => {
                debug!("RxTimingSetupReq delay {} acknowledged, not applied", delay);
                self.queue_answer(MacCommand::RxTimingSetupAns);
            }
            MacCommand::TxParamSetupReq { .. } => {
                debug!("TxParamSetupReq acknowledged, not applied");
                self.queue_answer(MacCommand::TxParamSetupAns);
            }
            MacCommand::DlChannelReq { ch_index, .. } => {
                debug!("DlChannelReq for channel {} rejected", ch_index);
                self.queue_answer(MacCommand::DlChannelAns {
                    uplink_frequency_exists: false,
                    channel_frequency_ok: false,
                });
            }
            other => warn!("unexpected {:?} in a downlink", other),
        }
    }

    fn queue_answer(&mut self, answer: MacCommand) {
        if let Err(err) = self.add_mac_command(answer) {
            warn!("dropping {:?}: {}", answer, err);
        }
    }

    fn on_link_adr_req(
        &mut self,
        data_rate: u8,
        tx_power: u8,
        ch_mask: u16,
        ch_mask_cntl: u8,
        nb_trans: u8,
    ) {
        let mut mask = ch_mask;
        let mut channel_mask_ack = true;
        let mut data_rate_ack = true;
        let mut power_ack = true;

        match ch_mask_cntl {
            CH_MASK_CNTL_BANK => {
                // every masked slot must hold a channel
                if (0..MAX_CHANNELS as u8).any(|i| mask & (1 << i) != 0 && self.plan.channel(i).is_none()) {
                    warn!("channel mask {:016b} enables undefined channels", mask);
                    channel_mask_ack = false;
                }
            }
            CH_MASK_CNTL_ALL_ON => mask = self.plan.occupied_mask(),
            _ => {
                warn!("unsupported ChMaskCntl {}", ch_mask_cntl);
                channel_mask_ack = false;
            }
        }
        if mask == 0 {
            warn!("channel mask disables every channel");
            channel_mask_ack = false;
        }

        if !self.config.adr {
            // only the channel mask may change
            data_rate_ack = false;
            power_ack = false;
            if channel_mask_ack {
                if self.masked_channel_supports(mask, self.state.data_rate) {
                    self.plan.apply_channel_mask(mask);
                } else {
                    warn!("channel mask leaves no channel for DR{}", self.state.data_rate);
                    channel_mask_ack = false;
                }
            }
        } else {
            if data_rate != KEEP_CURRENT && !self.masked_channel_supports(mask, data_rate) {
                warn!("DR{} not usable on the masked channels", data_rate);
                data_rate_ack = false;
            }
            if tx_power != KEEP_CURRENT && self.region.tx_power_dbm(tx_power).is_none() {
                warn!("undefined TXPower index {}", tx_power);
                power_ack = false;
            }

            if channel_mask_ack && data_rate_ack && power_ack {
                self.plan.apply_channel_mask(mask);
                if let Some(dbm) = self.region.tx_power_dbm(tx_power) {
                    self.state.tx_power_dbm = dbm;
                }
                self.state.nb_trans = nb_trans.max(1);
                if data_rate != KEEP_CURRENT {
                    self.state.data_rate = data_rate;
                }
                info!(
                    "LinkAdrReq applied: DR{}, {} dBm, nbTrans {}, mask {:016b}",
                    self.state.data_rate, self.state.tx_power_dbm, self.state.nb_trans, mask
                );
            }
        }

        self.queue_answer(MacCommand::LinkAdrAns {
            power_ack,
            data_rate_ack,
            channel_mask_ack,
        });
    }

    /// Whether a slot enabled by `mask` accepts `data_rate`
    ///
    /// An empty slot accepts any data rate the region defines.
    fn masked_channel_supports(&self, mask: u16, data_rate: u8) -> bool {
        (0..MAX_CHANNELS as u8)
            .filter(|i| mask & (1 << i) != 0)
            .any(|i| match self.plan.channel(i) {
                Some(channel) => channel.supports(data_rate),
                None => self.region.is_data_rate_valid(data_rate),
            })
    }

    fn on_rx_param_setup_req(&mut self, rx1_dr_offset: u8, rx2_data_rate: u8, frequency: u32) {
        let rx1_dr_offset_ack = self
            .region
            .reply_data_rate(self.state.data_rate, rx1_dr_offset)
            .is_some();
        let rx2_data_rate_ack = self.region.is_data_rate_valid(rx2_data_rate);
        let channel_ack = self.plan.is_frequency_valid(frequency);

        if rx1_dr_offset_ack && rx2_data_rate_ack && channel_ack {
            self.state.rx1_dr_offset = rx1_dr_offset;
            self.state.rx2_data_rate = rx2_data_rate;
            self.state.rx2_frequency = frequency;
            info!(
                "RX1 offset {}, RX2 DR{} on {} Hz",
                rx1_dr_offset, rx2_data_rate, frequency
            );
        } else {
            warn!(
                "RxParamSetupReq rejected: offset {}, DR {}, frequency {}",
                rx1_dr_offset_ack, rx2_data_rate_ack, channel_ack
            );
        }

        self.queue_answer(MacCommand::RxParamSetupAns {
            rx1_dr_offset_ack,
            rx2_data_rate_ack,
            channel_ack,
        });
    }

    fn on_new_channel_req(&mut self, ch_index: u8, frequency: u32, min_dr: u8, max_dr: u8) {
        let mut data_rate_range_ok = true;
        let mut channel_frequency_ok = true;

        // default channels can not be changed
        let editable = self.region.default_channel_count()..MAX_CHANNELS as u8;
        if !editable.contains(&ch_index) {
            warn!("NewChannelReq for channel {} refused", ch_index);
            data_rate_range_ok = false;
            channel_frequency_ok = false;
        }
        if frequency != 0 && !self.plan.is_frequency_valid(frequency) {
            warn!("NewChannelReq frequency {} Hz out of band", frequency);
            channel_frequency_ok = false;
        }
        if !self.region.is_data_rate_valid(min_dr)
            || !self.region.is_data_rate_valid(max_dr)
            || max_dr < min_dr
        {
            warn!("NewChannelReq data rate range DR{}-DR{} invalid", min_dr, max_dr);
            data_rate_range_ok = false;
        }

        if data_rate_range_ok && channel_frequency_ok {
            let mut channel = LogicalChannel::new(frequency, min_dr, max_dr);
            // a zero frequency defines a disabled slot
            channel.enabled = frequency != 0;
            if self.plan.set_channel(ch_index, channel).is_ok() {
                info!(
                    "channel {} on {} Hz, DR{}-DR{}",
                    ch_index, frequency, min_dr, max_dr
                );
            }
        }

        self.queue_answer(MacCommand::NewChannelAns {
            data_rate_range_ok,
            channel_frequency_ok,
        });
    }
}
