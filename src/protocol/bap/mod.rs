//! BAP framing over CAN.
//!
//! ## Frame layouts
//!
//! Short message (payload ≤ 6 bytes), bit 7 of byte 0 clear:
//!
//! ```text
//! byte 0: 0 | opcode:3 | device_id[5:2]
//! byte 1: device_id[1:0] | function_id:6
//! byte 2..: payload
//! ```
//!
//! Long message start, then continuations:
//!
//! ```text
//! start:        1 0 | group:2 | index:4 , length , header[2] , payload[4]
//! continuation: 1 1 | group:2 | index:4 , payload[7]
//! ```
//!
//! `length` counts payload bytes only. The first continuation carries index 0
//! and the index wraps modulo 16. In-flight long messages are keyed by CAN id
//! plus group.
use crate::core::{BapPayload, MAX_BAP_PAYLOAD};
use crate::infra::codec::bits::{BitReader, BitWriter};

pub mod assembler;
pub mod builder;
pub mod channel;
pub mod router;

/// Largest payload carried by a single-frame message.
pub const SHORT_PAYLOAD_MAX: usize = 6;
/// Payload bytes carried by a long start frame.
pub const START_CHUNK: usize = 4;
/// Payload bytes carried by a continuation frame.
pub const CONTINUATION_CHUNK: usize = 7;
/// Largest payload a long message may announce.
pub const MAX_LONG_PAYLOAD: usize = MAX_BAP_PAYLOAD;

const LONG_FLAG: u8 = 0x80;
const CONTINUATION_FLAG: u8 = 0x40;

/// BAP operation code (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OpCode {
    /// Reset / Set.
    Set = 0,
    Get = 1,
    SetGet = 2,
    HeartbeatStatus = 3,
    Status = 4,
    StatusAck = 5,
    Ack = 6,
    Error = 7,
}

impl OpCode {
    /// Decode the low three bits of `raw`.
    pub const fn from_bits(raw: u8) -> Self {
        match raw & 0x07 {
            0 => OpCode::Set,
            1 => OpCode::Get,
            2 => OpCode::SetGet,
            3 => OpCode::HeartbeatStatus,
            4 => OpCode::Status,
            5 => OpCode::StatusAck,
            6 => OpCode::Ack,
            _ => OpCode::Error,
        }
    }

    /// Responses flow from the vehicle device; requests towards it.
    pub const fn is_response(self) -> bool {
        self as u8 >= OpCode::HeartbeatStatus as u8
    }
}

/// Two-byte BAP header: opcode, logical device and function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BapHeader {
    pub opcode: OpCode,
    /// Logical device (6 bits).
    pub device_id: u8,
    /// Function within the device (6 bits).
    pub function_id: u8,
}

impl BapHeader {
    pub const fn new(opcode: OpCode, device_id: u8, function_id: u8) -> Self {
        Self {
            opcode,
            device_id,
            function_id,
        }
    }

    /// Decode a header from its two wire bytes.
    pub fn decode(bytes: [u8; 2]) -> Self {
        let mut reader = BitReader::new(&bytes);
        // A two-byte buffer always holds these 16 bits.
        let device_hi = reader.read_u8(4).unwrap_or(0);
        let opcode = reader.read_u8(3).unwrap_or(0);
        let _long = reader.read_bool().unwrap_or(false);
        let function_id = reader.read_u8(6).unwrap_or(0);
        let device_lo = reader.read_u8(2).unwrap_or(0);
        Self {
            opcode: OpCode::from_bits(opcode),
            device_id: (device_hi << 2) | device_lo,
            function_id,
        }
    }

    /// Encode the header into its two wire bytes (long flag clear).
    pub fn encode(&self) -> [u8; 2] {
        let mut bytes = [0u8; 2];
        let mut writer = BitWriter::new(&mut bytes);
        let fields = [
            ((self.device_id >> 2) & 0x0F, 4),
            (self.opcode as u8, 3),
            (0, 1),
            (self.function_id & 0x3F, 6),
            (self.device_id & 0x03, 2),
        ];
        let written = fields
            .iter()
            .all(|&(value, bits)| writer.write_u8(value, bits).is_ok());
        debug_assert!(written);
        bytes
    }
}

/// Shape of a frame, read from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    Short,
    LongStart { group: u8, index: u8 },
    Continuation { group: u8, index: u8 },
}

impl FrameKind {
    pub const fn classify(first: u8) -> Self {
        let group = (first >> 4) & 0x03;
        let index = first & 0x0F;
        if first & LONG_FLAG == 0 {
            FrameKind::Short
        } else if first & CONTINUATION_FLAG == 0 {
            FrameKind::LongStart { group, index }
        } else {
            FrameKind::Continuation { group, index }
        }
    }

    /// Control byte for a long start frame.
    pub const fn start_byte(group: u8) -> u8 {
        LONG_FLAG | ((group & 0x03) << 4)
    }

    /// Control byte for a continuation frame.
    pub const fn continuation_byte(group: u8, index: u8) -> u8 {
        LONG_FLAG | CONTINUATION_FLAG | ((group & 0x03) << 4) | (index & 0x0F)
    }
}

/// A complete logical BAP message, whatever its framing on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BapMessage {
    pub header: BapHeader,
    pub payload: BapPayload,
}

impl BapMessage {
    pub fn new(header: BapHeader, payload: &[u8]) -> Self {
        Self {
            header,
            payload: BapPayload::from_slice(payload),
        }
    }

    #[inline]
    pub fn function_id(&self) -> u8 {
        self.header.function_id
    }

    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    #[inline]
    pub fn device_id(&self) -> u8 {
        self.header.device_id
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Fits a single frame.
    pub fn is_short(&self) -> bool {
        self.payload.len() <= SHORT_PAYLOAD_MAX
    }
}
