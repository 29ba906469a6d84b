//! Traits bridging typed BAP payloads and raw byte buffers.
use crate::error::{BitWriterError, DecodeError};

//==================================================================================BAP_DATA
/// Implemented by every typed function payload (plug, charge, climate,
/// profile records).
pub trait BapData: Sized {
    /// Smallest payload the fixed layout can be decoded from.
    const MIN_LEN: usize;

    /// Decode a payload. Trailing optional fields absent from a short
    /// payload keep their defaults.
    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError>;

    /// Serialize into `buffer`, returning the number of bytes written.
    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError>;

    /// Reject payloads shorter than [`Self::MIN_LEN`].
    fn check_len(payload: &[u8]) -> Result<(), DecodeError> {
        if payload.len() < Self::MIN_LEN {
            return Err(DecodeError::TooShort {
                needed: Self::MIN_LEN,
                got: payload.len(),
            });
        }
        Ok(())
    }
}
