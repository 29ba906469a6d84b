//! Storage surviving deep sleep (RTC memory, flash page, EEPROM...).

/// Byte-oriented retained storage. A single image is stored at a time.
pub trait RetainedStorage {
    type Error: core::fmt::Debug;
    /// Copy the stored image into `buf`, returning its length (0 when empty).
    fn load(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    /// Replace the stored image.
    fn store(&mut self, image: &[u8]) -> Result<(), Self::Error>;
}
