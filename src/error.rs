//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (frame encoding, payload
//! decoding, channel registration, profile persistence, etc.).
//!
//! Nothing received from the bus escapes the receive path as an error: decode
//! failures are counted by the component that observed them. These types are
//! returned by egress and configuration calls only.
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while turning a BAP message into CAN frames.
pub enum BapEncodeError {
    /// Payload does not fit the long-message length byte or the reassembly buffer.
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    /// Function identifier does not fit the 6-bit header field.
    #[error("Invalid function id {function_id:#04x}")]
    InvalidFunctionId { function_id: u8 },
    /// Device identifier does not fit the 6-bit header field.
    #[error("Invalid device id {device_id:#04x}")]
    InvalidDeviceId { device_id: u8 },
    /// Record encoding failed while filling the payload buffer.
    #[error("BitWrite error: {err}")]
    BitWriteError { err: BitWriterError },
    /// Profile slot outside the range the request accepts.
    #[error("Invalid profile index {index}")]
    InvalidProfileIndex { index: u8 },
}

impl From<BitWriterError> for BapEncodeError {
    fn from(err: BitWriterError) -> Self {
        BapEncodeError::BitWriteError { err }
    }
}

#[derive(Debug, Error)]
/// Errors encountered when sending a BAP message (encode + transmit).
pub enum BapSendError<E: core::fmt::Debug> {
    /// Message could not be encoded into frames.
    #[error("Encoding failed: {0}")]
    Encode(BapEncodeError),
    /// CAN layer refused or failed to send a frame. Never retried here.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}

impl<E: core::fmt::Debug> From<BapEncodeError> for BapSendError<E> {
    fn from(err: BapEncodeError) -> Self {
        BapSendError::Encode(err)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while decoding a function payload into a typed structure.
pub enum DecodeError {
    /// Payload is shorter than the fixed layout of the function.
    #[error("Payload too short -> needed: {needed}, got: {got}")]
    TooShort { needed: usize, got: usize },
    /// Array header announces a record layout this stack does not know.
    #[error("Unsupported record address {record_address}")]
    UnsupportedRecordAddress { record_address: u8 },
    /// Bit-level access on the payload failed.
    #[error("BitReader error: {0}")]
    Bits(#[from] BitReaderError),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while populating the routing table.
pub enum RouterError {
    /// The fixed channel table is already full.
    #[error("Channel table full (max {max})")]
    TableFull { max: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while registering an observer.
pub enum SubscribeError {
    /// The bounded subscriber list is already full.
    #[error("Subscriber list full (max {max})")]
    ListFull { max: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors raised while loading or saving the persisted profile image.
pub enum StoreError<E: core::fmt::Debug> {
    /// Image is shorter than the fixed layout.
    #[error("Truncated image -> expected: {expected}, got: {got}")]
    Truncated { expected: usize, got: usize },
    /// Image does not start with the expected marker.
    #[error("Bad magic {found:#06x}")]
    BadMagic { found: u16 },
    /// Image was written by an incompatible layout version.
    #[error("Unsupported version {found}")]
    UnsupportedVersion { found: u8 },
    /// Stored checksum does not match the image contents.
    #[error("CRC mismatch -> stored: {stored:#010x}, computed: {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },
    /// Bit-level write failed while serializing a record.
    #[error("BitWrite error: {0}")]
    Write(BitWriterError),
    /// A stored record could not be decoded.
    #[error("Record decode error: {0}")]
    Decode(DecodeError),
    /// Storage backend reported a failure.
    #[error("Storage backend error: {0:?}")]
    Backend(E),
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors ending the receive task.
pub enum DriveError<E: core::fmt::Debug> {
    /// The CAN driver failed or was closed.
    #[error("CAN receive error: {0:?}")]
    Receive(E),
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised during bitwise buffer reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when required.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}
//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised during bitwise writes into a buffer.
pub enum BitWriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when the operation requires it.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}
