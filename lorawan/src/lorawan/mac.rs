use heapless::Vec;
use thiserror::Error;

use super::commands::{Direction, MacCommand};
use crate::config::device::{ConfigError, DevAddr};

/// Maximum FOpts length in bytes
pub const MAX_FOPTS_LEN: usize = 15;

/// MAC header size in bytes
pub const MHDR_SIZE: usize = 1;

/// Frame header size without options: DevAddr, FCtrl, FCnt and FPort
pub const FHDR_BASE_SIZE: usize = 8;

/// Largest PHY payload handled by the MAC
pub const MAX_FRAME_SIZE: usize = 256;

/// A serialized PHY payload
pub type Frame = Vec<u8, MAX_FRAME_SIZE>;

/// Major version written in the MHDR of every uplink
pub const MAJOR_VERSION: u8 = 1;

/// Wire codec error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Input ended before the structure was complete
    #[error("truncated buffer: needed {needed} bytes, {available} available")]
    TruncatedBuffer {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },
    /// Command identifier unknown in this direction
    #[error("unrecognized MAC command identifier {0:#04x}")]
    UnrecognizedCommand(u8),
    /// Field value wider than its wire encoding
    #[error("field `{field}` value {value} does not fit in {bits} bits")]
    FieldOverflow {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u32,
        /// Field width
        bits: u8,
    },
    /// Frequency not a multiple of the 100 Hz wire step
    #[error("frequency {0} Hz is not a multiple of 100 Hz")]
    UnalignedFrequency(u32),
    /// Queued MAC commands do not fit in FOpts
    #[error("frame options are {0} bytes, at most 15 allowed")]
    OptionsTooLong(usize),
    /// Output buffer is full
    #[error("output buffer too small")]
    BufferTooSmall,
}

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MType {
    /// OTAA join request
    JoinRequest = 0x00,
    /// OTAA join accept
    JoinAccept = 0x20,
    /// Data uplink without acknowledgement
    UnconfirmedDataUp = 0x40,
    /// Data downlink without acknowledgement
    UnconfirmedDataDown = 0x60,
    /// Data uplink the network must acknowledge
    ConfirmedDataUp = 0x80,
    /// Data downlink the device must acknowledge
    ConfirmedDataDown = 0xA0,
    /// Rejoin request (LoRaWAN 1.1)
    RejoinRequest = 0xC0,
    /// Proprietary frame
    Proprietary = 0xE0,
}

impl MType {
    fn from_byte(byte: u8) -> Self {
        match byte & 0xE0 {
            0x00 => MType::JoinRequest,
            0x20 => MType::JoinAccept,
            0x40 => MType::UnconfirmedDataUp,
            0x60 => MType::UnconfirmedDataDown,
            0x80 => MType::ConfirmedDataUp,
            0xA0 => MType::ConfirmedDataDown,
            0xC0 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }

    /// Whether frames of this type travel from the device to the network
    pub fn is_uplink(&self) -> bool {
        matches!(
            self,
            MType::JoinRequest
                | MType::UnconfirmedDataUp
                | MType::ConfirmedDataUp
                | MType::RejoinRequest
        )
    }

    /// Whether frames of this type request an acknowledgement
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }
}

/// MAC header (MHDR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacHeader {
    /// Message type
    pub mtype: MType,
    /// Major version, two bits
    pub major: u8,
}

impl MacHeader {
    /// Create a header for the given message type
    pub fn new(mtype: MType) -> Self {
        Self {
            mtype,
            major: MAJOR_VERSION,
        }
    }

    /// Serialize to the single MHDR byte
    pub fn to_byte(&self) -> Result<u8, CodecError> {
        if self.major > 0x03 {
            return Err(CodecError::FieldOverflow {
                field: "major",
                value: self.major.into(),
                bits: 2,
            });
        }
        Ok(self.mtype as u8 | self.major)
    }

    /// Parse the MHDR at the start of `bytes`
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let byte = *bytes.first().ok_or(CodecError::TruncatedBuffer {
            needed: MHDR_SIZE,
            available: 0,
        })?;
        Ok((
            Self {
                mtype: MType::from_byte(byte),
                major: byte & 0x03,
            },
            MHDR_SIZE,
        ))
    }
}

/// Frame header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FCtrl {
    /// Adaptive data rate enabled
    pub adr: bool,
    /// Uplink only: the device asks the network for a downlink
    pub adr_ack_req: bool,
    /// Acknowledges the last confirmed frame
    pub ack: bool,
    /// Only meaningful in downlinks
    pub f_pending: bool,
}

impl FCtrl {
    fn to_byte(&self, f_opts_len: u8, direction: Direction) -> u8 {
        let mut byte = f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending && direction == Direction::Downlink {
            byte |= 0x10;
        }
        byte
    }

    fn from_byte(byte: u8, direction: Direction) -> (Self, u8) {
        let f_ctrl = Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: direction == Direction::Downlink && (byte & 0x10) != 0,
        };
        (f_ctrl, byte & 0x0F)
    }
}

/// Frame header (FHDR) followed by the FPort byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame control flags
    pub f_ctrl: FCtrl,
    /// Low 16 bits of the frame counter
    pub f_cnt: u16,
    /// Commands piggybacked in FOpts, in wire order
    pub commands: Vec<MacCommand, MAX_FOPTS_LEN>,
    /// Application port
    pub f_port: u8,
}

impl FrameHeader {
    /// Create an empty header for `dev_addr`
    pub fn new(dev_addr: DevAddr, f_cnt: u16, f_port: u8) -> Self {
        Self {
            dev_addr,
            f_ctrl: FCtrl::default(),
            f_cnt,
            commands: Vec::new(),
            f_port,
        }
    }

    /// Append a command to FOpts
    pub fn add_command(&mut self, command: MacCommand) -> Result<(), CodecError> {
        let len = self.f_opts_len() + command.serialized_size();
        if len > MAX_FOPTS_LEN {
            return Err(CodecError::OptionsTooLong(len));
        }
        self.commands
            .push(command)
            .map_err(|_| CodecError::OptionsTooLong(len))
    }

    /// Total size of the FOpts field
    pub fn f_opts_len(&self) -> usize {
        self.commands.iter().map(MacCommand::serialized_size).sum()
    }

    /// Size of the header on the wire, FPort included
    pub fn serialized_size(&self) -> usize {
        FHDR_BASE_SIZE + self.f_opts_len()
    }

    /// Append the header to `out`, returning the number of bytes written
    pub fn serialize<const N: usize>(
        &self,
        direction: Direction,
        out: &mut Vec<u8, N>,
    ) -> Result<usize, CodecError> {
        let f_opts_len = self.f_opts_len();
        if f_opts_len > MAX_FOPTS_LEN {
            return Err(CodecError::OptionsTooLong(f_opts_len));
        }

        let start = out.len();
        out.extend_from_slice(&self.dev_addr.to_bytes())
            .map_err(|_| CodecError::BufferTooSmall)?;
        out.push(self.f_ctrl.to_byte(f_opts_len as u8, direction))
            .map_err(|_| CodecError::BufferTooSmall)?;
        out.extend_from_slice(&self.f_cnt.to_le_bytes())
            .map_err(|_| CodecError::BufferTooSmall)?;
        for command in &self.commands {
            command.encode(out)?;
        }
        out.push(self.f_port)
            .map_err(|_| CodecError::BufferTooSmall)?;

        Ok(out.len() - start)
    }

    /// Parse a header from the start of `bytes`
    ///
    /// Commands with an identifier unknown in `direction` are logged and
    /// skipped one byte at a time; parsing carries on with the rest of FOpts.
    pub fn deserialize(bytes: &[u8], direction: Direction) -> Result<(Self, usize), CodecError> {
        if bytes.len() < FHDR_BASE_SIZE - 1 {
            return Err(CodecError::TruncatedBuffer {
                needed: FHDR_BASE_SIZE,
                available: bytes.len(),
            });
        }

        let dev_addr = DevAddr::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let (f_ctrl, f_opts_len) = FCtrl::from_byte(bytes[4], direction);
        let f_cnt = u16::from_le_bytes([bytes[5], bytes[6]]);

        let f_opts_len = usize::from(f_opts_len);
        let needed = FHDR_BASE_SIZE + f_opts_len;
        if bytes.len() < needed {
            return Err(CodecError::TruncatedBuffer {
                needed,
                available: bytes.len(),
            });
        }

        let f_opts = &bytes[7..7 + f_opts_len];
        let mut commands = Vec::new();
        let mut pos = 0;
        while pos < f_opts.len() {
            match MacCommand::decode(&f_opts[pos..], direction) {
                Ok((command, size)) => {
                    // FOpts is at most 15 bytes and every command takes at least one
                    let _ = commands.push(command);
                    pos += size;
                }
                Err(err @ CodecError::UnrecognizedCommand(_)) => {
                    log::warn!("skipping FOpts byte {}: {}", pos, err);
                    pos += 1;
                }
                Err(err) => return Err(err),
            }
        }

        let header = Self {
            dev_addr,
            f_ctrl,
            f_cnt,
            commands,
            f_port: bytes[7 + f_opts_len],
        };
        Ok((header, needed))
    }
}

/// MAC layer error
#[derive(Debug, Error)]
pub enum MacError<E> {
    /// Radio error
    #[error("radio error: {0:?}")]
    Radio(E),
    /// Wire codec error
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Invalid device configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No room left in the timer queue
    #[error("timer queue full")]
    TimerQueueFull,
    /// Radio was transmitting when a receive window closed
    #[error("radio transmitting while closing a receive window")]
    UnexpectedRadioState,
}
