//! Plain data types shared by the codec, the BAP transport and the domain
//! layer: the bounded payload buffer and the provenance tag attached to
//! every piece of vehicle state.

/// Largest reassembled BAP payload accepted by this stack.
pub const MAX_BAP_PAYLOAD: usize = 128;

/// Fixed-capacity buffer carrying a BAP payload without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BapPayload {
    pub len: usize,
    pub data: [u8; MAX_BAP_PAYLOAD],
}

#[cfg(feature = "defmt")]
impl defmt::Format for BapPayload {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:02x}", self.as_slice())
    }
}

impl Default for BapPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl BapPayload {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; MAX_BAP_PAYLOAD],
        }
    }

    /// Build a buffer from a slice, truncating to [`MAX_BAP_PAYLOAD`].
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut payload = Self::new();
        payload.copy_from_slice(slice);
        payload
    }

    /// Number of valid bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the buffer.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Copy bytes into the buffer and update `len`.
    #[inline]
    pub fn copy_from_slice(&mut self, slice: &[u8]) {
        let clamped = slice.len().min(MAX_BAP_PAYLOAD);
        self.data[..clamped].copy_from_slice(&slice[..clamped]);
        self.len = clamped;
    }

    /// Append bytes after the current content. Returns the number of bytes
    /// actually stored, which is short only when the buffer is full.
    #[inline]
    pub fn extend_from_slice(&mut self, slice: &[u8]) -> usize {
        let room = MAX_BAP_PAYLOAD - self.len;
        let take = slice.len().min(room);
        self.data[self.len..self.len + take].copy_from_slice(&slice[..take]);
        self.len += take;
        take
    }

    /// Immutable view over the populated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Origin of a piece of vehicle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataSource {
    /// Nothing received yet.
    #[default]
    None,
    /// Standard 11-bit CAN broadcast.
    CanStd,
    /// BAP message on an extended identifier.
    Bap,
    /// Derived from other values.
    Computed,
}

impl DataSource {
    /// Precedence used when two sources report the same logical field.
    pub const fn rank(self) -> u8 {
        match self {
            DataSource::None => 0,
            DataSource::Computed => 1,
            DataSource::CanStd => 2,
            DataSource::Bap => 3,
        }
    }
}
