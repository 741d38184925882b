//! MAC commands carried in the FOpts field of the frame header
//!
//! Each command starts with a one byte command identifier (CID). Requests and
//! answers of the same family share the CID, so decoding needs to know the
//! direction of the frame the command was found in.

use heapless::Vec;

use super::mac::CodecError;

/// Frame direction, used to tell apart requests and answers sharing a CID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// End device to network
    Uplink,
    /// Network to end device
    Downlink,
}

/// MAC command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandIdentifier {
    /// LinkCheckReq / LinkCheckAns
    LinkCheck = 0x02,
    /// LinkADRReq / LinkADRAns
    LinkAdr = 0x03,
    /// DutyCycleReq / DutyCycleAns
    DutyCycle = 0x04,
    /// RXParamSetupReq / RXParamSetupAns
    RxParamSetup = 0x05,
    /// DevStatusReq / DevStatusAns
    DevStatus = 0x06,
    /// NewChannelReq / NewChannelAns
    NewChannel = 0x07,
    /// RXTimingSetupReq / RXTimingSetupAns
    RxTimingSetup = 0x08,
    /// TxParamSetupReq / TxParamSetupAns
    TxParamSetup = 0x09,
    /// DlChannelReq / DlChannelAns
    DlChannel = 0x0A,
}

impl CommandIdentifier {
    /// Look up a CID byte
    pub fn from_byte(cid: u8) -> Option<Self> {
        match cid {
            0x02 => Some(Self::LinkCheck),
            0x03 => Some(Self::LinkAdr),
            0x04 => Some(Self::DutyCycle),
            0x05 => Some(Self::RxParamSetup),
            0x06 => Some(Self::DevStatus),
            0x07 => Some(Self::NewChannel),
            0x08 => Some(Self::RxTimingSetup),
            0x09 => Some(Self::TxParamSetup),
            0x0A => Some(Self::DlChannel),
            _ => None,
        }
    }
}

/// MAC command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacCommand {
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns {
        /// Demodulation margin of the last LinkCheckReq in dB
        margin: u8,
        /// Number of gateways that received the request
        gateway_count: u8,
    },
    /// Link ADR request
    LinkAdrReq {
        /// Data rate (0xF keeps the current one)
        data_rate: u8,
        /// TX power index (0xF keeps the current one)
        tx_power: u8,
        /// Channel mask
        ch_mask: u16,
        /// Channel mask control
        ch_mask_cntl: u8,
        /// Number of transmissions
        nb_trans: u8,
    },
    /// Link ADR answer
    LinkAdrAns {
        /// Power ACK
        power_ack: bool,
        /// Data rate ACK
        data_rate_ack: bool,
        /// Channel mask ACK
        channel_mask_ack: bool,
    },
    /// Duty cycle request
    DutyCycleReq {
        /// Aggregated duty cycle is 1 / 2^max_duty_cycle
        max_duty_cycle: u8,
    },
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RxParamSetupReq {
        /// RX1 data rate offset
        rx1_dr_offset: u8,
        /// RX2 data rate
        rx2_data_rate: u8,
        /// RX2 frequency in Hz
        frequency: u32,
    },
    /// RX parameter setup answer
    RxParamSetupAns {
        /// RX1 data rate offset ACK
        rx1_dr_offset_ack: bool,
        /// RX2 data rate ACK
        rx2_data_rate_ack: bool,
        /// Channel ACK
        channel_ack: bool,
    },
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// Demodulation margin of the last downlink, -32..=31 dB
        margin: i8,
    },
    /// New channel request
    NewChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz, 0 disables the channel
        frequency: u32,
        /// Maximum data rate
        max_dr: u8,
        /// Minimum data rate
        min_dr: u8,
    },
    /// New channel answer
    NewChannelAns {
        /// Data rate range OK
        data_rate_range_ok: bool,
        /// Channel frequency OK
        channel_frequency_ok: bool,
    },
    /// RX timing setup request
    RxTimingSetupReq {
        /// Delay (0-15)
        delay: u8,
    },
    /// RX timing setup answer
    RxTimingSetupAns,
    /// TX parameter setup request
    TxParamSetupReq {
        /// Downlink dwell time
        downlink_dwell_time: bool,
        /// Uplink dwell time
        uplink_dwell_time: bool,
        /// Maximum EIRP index
        max_eirp: u8,
    },
    /// TX parameter setup answer
    TxParamSetupAns,
    /// Downlink channel request
    DlChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz
        frequency: u32,
    },
    /// Downlink channel answer
    DlChannelAns {
        /// Uplink frequency exists
        uplink_frequency_exists: bool,
        /// Channel frequency OK
        channel_frequency_ok: bool,
    },
}

/// Largest 24-bit frequency field value, in 100 Hz units
const MAX_FREQUENCY_UNITS: u32 = 0x00FF_FFFF;

fn check_bits(field: &'static str, value: u32, bits: u8) -> Result<(), CodecError> {
    if value >> bits != 0 {
        return Err(CodecError::FieldOverflow { field, value, bits });
    }
    Ok(())
}

fn check_frequency(frequency: u32) -> Result<(), CodecError> {
    if frequency % 100 != 0 {
        return Err(CodecError::UnalignedFrequency(frequency));
    }
    if frequency / 100 > MAX_FREQUENCY_UNITS {
        return Err(CodecError::FieldOverflow {
            field: "frequency",
            value: frequency,
            bits: 24,
        });
    }
    Ok(())
}

fn read_frequency(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) * 100
}

fn frequency_bytes(frequency: u32) -> [u8; 3] {
    let units = (frequency / 100).to_le_bytes();
    [units[0], units[1], units[2]]
}

fn flags(bits: &[bool]) -> u8 {
    bits.iter().fold(0, |acc, bit| (acc << 1) | *bit as u8)
}

impl MacCommand {
    /// Build a LinkAdrReq, rejecting fields wider than their wire encoding
    pub fn link_adr_req(
        data_rate: u8,
        tx_power: u8,
        ch_mask: u16,
        ch_mask_cntl: u8,
        nb_trans: u8,
    ) -> Result<Self, CodecError> {
        let command = Self::LinkAdrReq {
            data_rate,
            tx_power,
            ch_mask,
            ch_mask_cntl,
            nb_trans,
        };
        command.validate()?;
        Ok(command)
    }

    /// Build a DutyCycleReq
    pub fn duty_cycle_req(max_duty_cycle: u8) -> Result<Self, CodecError> {
        let command = Self::DutyCycleReq { max_duty_cycle };
        command.validate()?;
        Ok(command)
    }

    /// Build an RxParamSetupReq
    pub fn rx_param_setup_req(
        rx1_dr_offset: u8,
        rx2_data_rate: u8,
        frequency: u32,
    ) -> Result<Self, CodecError> {
        let command = Self::RxParamSetupReq {
            rx1_dr_offset,
            rx2_data_rate,
            frequency,
        };
        command.validate()?;
        Ok(command)
    }

    /// Build a NewChannelReq
    pub fn new_channel_req(
        ch_index: u8,
        frequency: u32,
        min_dr: u8,
        max_dr: u8,
    ) -> Result<Self, CodecError> {
        let command = Self::NewChannelReq {
            ch_index,
            frequency,
            max_dr,
            min_dr,
        };
        command.validate()?;
        Ok(command)
    }

    /// Build a DevStatusAns
    pub fn dev_status_ans(battery: u8, margin: i8) -> Result<Self, CodecError> {
        let command = Self::DevStatusAns { battery, margin };
        command.validate()?;
        Ok(command)
    }

    /// Command identifier
    pub fn cid(&self) -> CommandIdentifier {
        match self {
            Self::LinkCheckReq | Self::LinkCheckAns { .. } => CommandIdentifier::LinkCheck,
            Self::LinkAdrReq { .. } | Self::LinkAdrAns { .. } => CommandIdentifier::LinkAdr,
            Self::DutyCycleReq { .. } | Self::DutyCycleAns => CommandIdentifier::DutyCycle,
            Self::RxParamSetupReq { .. } | Self::RxParamSetupAns { .. } => {
                CommandIdentifier::RxParamSetup
            }
            Self::DevStatusReq | Self::DevStatusAns { .. } => CommandIdentifier::DevStatus,
            Self::NewChannelReq { .. } | Self::NewChannelAns { .. } => CommandIdentifier::NewChannel,
            Self::RxTimingSetupReq { .. } | Self::RxTimingSetupAns => {
                CommandIdentifier::RxTimingSetup
            }
            Self::TxParamSetupReq { .. } | Self::TxParamSetupAns => CommandIdentifier::TxParamSetup,
            Self::DlChannelReq { .. } | Self::DlChannelAns { .. } => CommandIdentifier::DlChannel,
        }
    }

    /// Direction of the frames this command travels in
    pub fn direction(&self) -> Direction {
        match self {
            Self::LinkCheckReq
            | Self::LinkAdrAns { .. }
            | Self::DutyCycleAns
            | Self::RxParamSetupAns { .. }
            | Self::DevStatusAns { .. }
            | Self::NewChannelAns { .. }
            | Self::RxTimingSetupAns
            | Self::TxParamSetupAns
            | Self::DlChannelAns { .. } => Direction::Uplink,
            _ => Direction::Downlink,
        }
    }

    /// Serialized size in bytes, CID included
    pub fn serialized_size(&self) -> usize {
        1 + match self {
            Self::LinkCheckReq => 0,
            Self::LinkCheckAns { .. } => 2,
            Self::LinkAdrReq { .. } => 4,
            Self::LinkAdrAns { .. } => 1,
            Self::DutyCycleReq { .. } => 1,
            Self::DutyCycleAns => 0,
            Self::RxParamSetupReq { .. } => 4,
            Self::RxParamSetupAns { .. } => 1,
            Self::DevStatusReq => 0,
            Self::DevStatusAns { .. } => 2,
            Self::NewChannelReq { .. } => 5,
            Self::NewChannelAns { .. } => 1,
            Self::RxTimingSetupReq { .. } => 1,
            Self::RxTimingSetupAns => 0,
            Self::TxParamSetupReq { .. } => 1,
            Self::TxParamSetupAns => 0,
            Self::DlChannelReq { .. } => 4,
            Self::DlChannelAns { .. } => 1,
        }
    }

    /// Check every field fits its bit width on the wire
    pub fn validate(&self) -> Result<(), CodecError> {
        match *self {
            Self::LinkAdrReq {
                data_rate,
                tx_power,
                ch_mask_cntl,
                nb_trans,
                ..
            } => {
                check_bits("data_rate", data_rate.into(), 4)?;
                check_bits("tx_power", tx_power.into(), 4)?;
                check_bits("ch_mask_cntl", ch_mask_cntl.into(), 3)?;
                check_bits("nb_trans", nb_trans.into(), 4)
            }
            Self::DutyCycleReq { max_duty_cycle } => {
                check_bits("max_duty_cycle", max_duty_cycle.into(), 4)
            }
            Self::RxParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                frequency,
            } => {
                check_bits("rx1_dr_offset", rx1_dr_offset.into(), 3)?;
                check_bits("rx2_data_rate", rx2_data_rate.into(), 4)?;
                check_frequency(frequency)
            }
            Self::DevStatusAns { margin, .. } => {
                if !(-32..=31).contains(&margin) {
                    return Err(CodecError::FieldOverflow {
                        field: "margin",
                        value: margin as u32,
                        bits: 6,
                    });
                }
                Ok(())
            }
            Self::NewChannelReq {
                frequency,
                max_dr,
                min_dr,
                ..
            } => {
                check_bits("max_dr", max_dr.into(), 4)?;
                check_bits("min_dr", min_dr.into(), 4)?;
                check_frequency(frequency)
            }
            Self::RxTimingSetupReq { delay } => check_bits("delay", delay.into(), 4),
            Self::TxParamSetupReq { max_eirp, .. } => check_bits("max_eirp", max_eirp.into(), 4),
            Self::DlChannelReq { frequency, .. } => check_frequency(frequency),
            _ => Ok(()),
        }
    }

    /// Append the command to `out`, returning the number of bytes written
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<usize, CodecError> {
        self.validate()?;

        let mut buf = [0u8; 6];
        buf[0] = self.cid() as u8;
        match *self {
            Self::LinkCheckReq
            | Self::DutyCycleAns
            | Self::DevStatusReq
            | Self::RxTimingSetupAns
            | Self::TxParamSetupAns => {}
            Self::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                buf[1] = margin;
                buf[2] = gateway_count;
            }
            Self::LinkAdrReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => {
                buf[1] = data_rate << 4 | tx_power;
                buf[2..4].copy_from_slice(&ch_mask.to_le_bytes());
                buf[4] = ch_mask_cntl << 4 | nb_trans;
            }
            Self::LinkAdrAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => buf[1] = flags(&[power_ack, data_rate_ack, channel_mask_ack]),
            Self::DutyCycleReq { max_duty_cycle } => buf[1] = max_duty_cycle,
            Self::RxParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                frequency,
            } => {
                buf[1] = rx1_dr_offset << 4 | rx2_data_rate;
                buf[2..5].copy_from_slice(&frequency_bytes(frequency));
            }
            Self::RxParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => buf[1] = flags(&[rx1_dr_offset_ack, rx2_data_rate_ack, channel_ack]),
            Self::DevStatusAns { battery, margin } => {
                buf[1] = battery;
                buf[2] = (margin as u8) & 0x3F;
            }
            Self::NewChannelReq {
                ch_index,
                frequency,
                max_dr,
                min_dr,
            } => {
                buf[1] = ch_index;
                buf[2..5].copy_from_slice(&frequency_bytes(frequency));
                buf[5] = max_dr << 4 | min_dr;
            }
            Self::NewChannelAns {
                data_rate_range_ok,
                channel_frequency_ok,
            } => buf[1] = flags(&[data_rate_range_ok, channel_frequency_ok]),
            Self::RxTimingSetupReq { delay } => buf[1] = delay,
            Self::TxParamSetupReq {
                downlink_dwell_time,
                uplink_dwell_time,
                max_eirp,
            } => buf[1] = flags(&[downlink_dwell_time, uplink_dwell_time]) << 4 | max_eirp,
            Self::DlChannelReq {
                ch_index,
                frequency,
            } => {
                buf[1] = ch_index;
                buf[2..5].copy_from_slice(&frequency_bytes(frequency));
            }
            Self::DlChannelAns {
                uplink_frequency_exists,
                channel_frequency_ok,
            } => buf[1] = flags(&[uplink_frequency_exists, channel_frequency_ok]),
        }

        let size = self.serialized_size();
        out.extend_from_slice(&buf[..size])
            .map_err(|_| CodecError::BufferTooSmall)?;
        Ok(size)
    }

    /// Decode one command from the start of `bytes`
    ///
    /// Returns the command and the number of bytes consumed.
    pub fn decode(bytes: &[u8], direction: Direction) -> Result<(Self, usize), CodecError> {
        let cid_byte = *bytes.first().ok_or(CodecError::TruncatedBuffer {
            needed: 1,
            available: 0,
        })?;
        let cid = CommandIdentifier::from_byte(cid_byte)
            .ok_or(CodecError::UnrecognizedCommand(cid_byte))?;

        let payload_len = match (cid, direction) {
            (CommandIdentifier::LinkCheck, Direction::Uplink) => 0,
            (CommandIdentifier::LinkCheck, Direction::Downlink) => 2,
            (CommandIdentifier::LinkAdr, Direction::Uplink) => 1,
            (CommandIdentifier::LinkAdr, Direction::Downlink) => 4,
            (CommandIdentifier::DutyCycle, Direction::Uplink) => 0,
            (CommandIdentifier::DutyCycle, Direction::Downlink) => 1,
            (CommandIdentifier::RxParamSetup, Direction::Uplink) => 1,
            (CommandIdentifier::RxParamSetup, Direction::Downlink) => 4,
            (CommandIdentifier::DevStatus, Direction::Uplink) => 2,
            (CommandIdentifier::DevStatus, Direction::Downlink) => 0,
            (CommandIdentifier::NewChannel, Direction::Uplink) => 1,
            (CommandIdentifier::NewChannel, Direction::Downlink) => 5,
            (CommandIdentifier::RxTimingSetup, Direction::Uplink) => 0,
            (CommandIdentifier::RxTimingSetup, Direction::Downlink) => 1,
            (CommandIdentifier::TxParamSetup, Direction::Uplink) => 0,
            (CommandIdentifier::TxParamSetup, Direction::Downlink) => 1,
            (CommandIdentifier::DlChannel, Direction::Uplink) => 1,
            (CommandIdentifier::DlChannel, Direction::Downlink) => 4,
        };
        if bytes.len() < 1 + payload_len {
            return Err(CodecError::TruncatedBuffer {
                needed: 1 + payload_len,
                available: bytes.len(),
            });
        }
        let p = &bytes[1..=payload_len];
        let bit = |byte: u8, n: u8| byte & (1 << n) != 0;

        let command = match (cid, direction) {
            (CommandIdentifier::LinkCheck, Direction::Uplink) => Self::LinkCheckReq,
            (CommandIdentifier::LinkCheck, Direction::Downlink) => Self::LinkCheckAns {
                margin: p[0],
                gateway_count: p[1],
            },
            (CommandIdentifier::LinkAdr, Direction::Uplink) => Self::LinkAdrAns {
                power_ack: bit(p[0], 2),
                data_rate_ack: bit(p[0], 1),
                channel_mask_ack: bit(p[0], 0),
            },
            (CommandIdentifier::LinkAdr, Direction::Downlink) => Self::LinkAdrReq {
                data_rate: p[0] >> 4,
                tx_power: p[0] & 0x0F,
                ch_mask: u16::from_le_bytes([p[1], p[2]]),
                ch_mask_cntl: (p[3] >> 4) & 0x07,
                nb_trans: p[3] & 0x0F,
            },
            (CommandIdentifier::DutyCycle, Direction::Uplink) => Self::DutyCycleAns,
            (CommandIdentifier::DutyCycle, Direction::Downlink) => Self::DutyCycleReq {
                max_duty_cycle: p[0] & 0x0F,
            },
            (CommandIdentifier::RxParamSetup, Direction::Uplink) => Self::RxParamSetupAns {
                rx1_dr_offset_ack: bit(p[0], 2),
                rx2_data_rate_ack: bit(p[0], 1),
                channel_ack: bit(p[0], 0),
            },
            (CommandIdentifier::RxParamSetup, Direction::Downlink) => Self::RxParamSetupReq {
                rx1_dr_offset: (p[0] >> 4) & 0x07,
                rx2_data_rate: p[0] & 0x0F,
                frequency: read_frequency(&p[1..4]),
            },
            (CommandIdentifier::DevStatus, Direction::Uplink) => Self::DevStatusAns {
                battery: p[0],
                // sign-extend the 6-bit margin
                margin: ((p[1] << 2) as i8) >> 2,
            },
            (CommandIdentifier::DevStatus, Direction::Downlink) => Self::DevStatusReq,
            (CommandIdentifier::NewChannel, Direction::Uplink) => Self::NewChannelAns {
                data_rate_range_ok: bit(p[0], 1),
                channel_frequency_ok: bit(p[0], 0),
            },
            (CommandIdentifier::NewChannel, Direction::Downlink) => Self::NewChannelReq {
                ch_index: p[0],
                frequency: read_frequency(&p[1..4]),
                max_dr: p[4] >> 4,
                min_dr: p[4] & 0x0F,
            },
            (CommandIdentifier::RxTimingSetup, Direction::Uplink) => Self::RxTimingSetupAns,
            (CommandIdentifier::RxTimingSetup, Direction::Downlink) => Self::RxTimingSetupReq {
                delay: p[0] & 0x0F,
            },
            (CommandIdentifier::TxParamSetup, Direction::Uplink) => Self::TxParamSetupAns,
            (CommandIdentifier::TxParamSetup, Direction::Downlink) => Self::TxParamSetupReq {
                downlink_dwell_time: bit(p[0], 5),
                uplink_dwell_time: bit(p[0], 4),
                max_eirp: p[0] & 0x0F,
            },
            (CommandIdentifier::DlChannel, Direction::Uplink) => Self::DlChannelAns {
                uplink_frequency_exists: bit(p[0], 1),
                channel_frequency_ok: bit(p[0], 0),
            },
            (CommandIdentifier::DlChannel, Direction::Downlink) => Self::DlChannelReq {
                ch_index: p[0],
                frequency: read_frequency(&p[1..4]),
            },
        };

        Ok((command, 1 + payload_len))
    }
}
