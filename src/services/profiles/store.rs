//! Profile cache image kept across deep sleep.
//!
//! ```text
//! magic:u16 | version:u8 | slot[PROFILE_COUNT] | crc32
//! slot = valid:u8 | record (19 bytes) | name_len:u8 | name, zero padded to 31
//! ```
//!
//! Integers are little-endian. The CRC (ISO-HDLC) covers everything before it.
use crc::{Crc, CRC_32_ISO_HDLC};

use super::profile::{ChargingProfile, MAX_PROFILE_NAME, PROFILE_COUNT, PROFILE_RECORD_LEN};
use crate::error::{BitWriterError, StoreError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::BapData;
use crate::protocol::transport::traits::retained::RetainedStorage;

pub const STORE_MAGIC: u16 = 0x4B50;
pub const STORE_VERSION: u8 = 1;
pub const SLOT_LEN: usize = 1 + PROFILE_RECORD_LEN + 1 + MAX_PROFILE_NAME;
const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 4;
pub const IMAGE_LEN: usize = HEADER_LEN + SLOT_LEN * PROFILE_COUNT + CRC_LEN;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Serialize the cache, checksum included.
pub fn encode_image(
    profiles: &[ChargingProfile; PROFILE_COUNT],
    image: &mut [u8; IMAGE_LEN],
) -> Result<(), BitWriterError> {
    image.fill(0);
    let mut writer = BitWriter::new(&mut image[..HEADER_LEN]);
    writer.write_u16(STORE_MAGIC, 16)?;
    writer.write_u8(STORE_VERSION, 8)?;

    for (profile, slot) in profiles
        .iter()
        .zip(image[HEADER_LEN..HEADER_LEN + SLOT_LEN * PROFILE_COUNT].chunks_exact_mut(SLOT_LEN))
    {
        slot[0] = profile.valid as u8;
        profile.to_payload(&mut slot[1..])?;
    }

    let body_len = IMAGE_LEN - CRC_LEN;
    let crc = CRC32.checksum(&image[..body_len]);
    image[body_len..].copy_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Validate and decode an image produced by [`encode_image`].
pub fn decode_image<E: core::fmt::Debug>(
    image: &[u8],
) -> Result<[ChargingProfile; PROFILE_COUNT], StoreError<E>> {
    if image.len() < IMAGE_LEN {
        return Err(StoreError::Truncated {
            expected: IMAGE_LEN,
            got: image.len(),
        });
    }
    let image = &image[..IMAGE_LEN];

    let mut reader = BitReader::new(image);
    let magic = reader
        .read_u16(16)
        .map_err(|err| StoreError::Decode(err.into()))?;
    let version = reader
        .read_u8(8)
        .map_err(|err| StoreError::Decode(err.into()))?;
    if magic != STORE_MAGIC {
        return Err(StoreError::BadMagic { found: magic });
    }
    if version != STORE_VERSION {
        return Err(StoreError::UnsupportedVersion { found: version });
    }

    let body_len = IMAGE_LEN - CRC_LEN;
    let mut stored = [0u8; CRC_LEN];
    stored.copy_from_slice(&image[body_len..]);
    let stored = u32::from_le_bytes(stored);
    let computed = CRC32.checksum(&image[..body_len]);
    if stored != computed {
        return Err(StoreError::CrcMismatch { stored, computed });
    }

    let mut profiles: [ChargingProfile; PROFILE_COUNT] = Default::default();
    for (profile, slot) in profiles
        .iter_mut()
        .zip(image[HEADER_LEN..body_len].chunks_exact(SLOT_LEN))
    {
        *profile = ChargingProfile::from_payload(&slot[1..]).map_err(StoreError::Decode)?;
        profile.valid = slot[0] != 0;
    }
    Ok(profiles)
}

/// Save-before-sleep half of the contract.
pub fn save_profiles<S: RetainedStorage>(
    storage: &mut S,
    profiles: &[ChargingProfile; PROFILE_COUNT],
) -> Result<(), StoreError<S::Error>> {
    let mut image = [0u8; IMAGE_LEN];
    encode_image(profiles, &mut image).map_err(StoreError::Write)?;
    storage.store(&image).map_err(StoreError::Backend)
}

/// Load-at-boot half. `Ok(None)` when nothing was stored yet.
pub fn load_profiles<S: RetainedStorage>(
    storage: &mut S,
) -> Result<Option<[ChargingProfile; PROFILE_COUNT]>, StoreError<S::Error>> {
    let mut image = [0u8; IMAGE_LEN];
    let len = storage.load(&mut image).map_err(StoreError::Backend)?;
    if len == 0 {
        return Ok(None);
    }
    decode_image(&image[..len.min(IMAGE_LEN)]).map(Some)
}
