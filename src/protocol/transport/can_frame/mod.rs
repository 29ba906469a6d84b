//! In-memory representation of a classic CAN frame as seen by the BAP stack.
use embedded_can::{ExtendedId, Frame, Id, StandardId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw frame as read from, or written to, the CAN bus. Immutable once received.
pub struct CanFrame {
    /// 11-bit or 29-bit identifier stored inside a `u32`.
    pub id: u32,
    /// `true` for 29-bit identifiers.
    pub extended: bool,
    /// Payload buffer; bytes past `len` are zero.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Build a frame, truncating `payload` to eight bytes.
    pub fn from_parts(id: u32, extended: bool, payload: &[u8]) -> Self {
        let len = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            extended,
            data,
            len,
        }
    }

    /// Frame on a 29-bit identifier.
    pub fn new_extended(id: u32, payload: &[u8]) -> Self {
        Self::from_parts(id & ExtendedId::MAX.as_raw(), true, payload)
    }

    /// Frame on an 11-bit identifier.
    pub fn new_standard(id: u16, payload: &[u8]) -> Self {
        Self::from_parts((id & StandardId::MAX.as_raw()) as u32, false, payload)
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        Some(match id.into() {
            Id::Standard(id) => Self::from_parts(id.as_raw() as u32, false, data),
            Id::Extended(id) => Self::from_parts(id.as_raw(), true, data),
        })
    }

    /// Remote frames never carry BAP traffic.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        self.extended
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        if self.extended {
            ExtendedId::new(self.id)
                .map(Id::Extended)
                .unwrap_or(Id::Extended(ExtendedId::MAX))
        } else {
            StandardId::new(self.id as u16)
                .map(Id::Standard)
                .unwrap_or(Id::Standard(StandardId::MAX))
        }
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}
