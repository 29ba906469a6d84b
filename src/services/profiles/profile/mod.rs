//! Charging/climate profile record and the ProfilesArray (0x19) codec.
//!
//! ## STATUS array layout
//!
//! | Byte      | Content                                                    |
//! |-----------|------------------------------------------------------------|
//! | 0         | ASG id (high nibble), transaction id (low nibble)          |
//! | 1         | Total elements in the vehicle list                         |
//! | 2         | LargeIdx, PosTransmit, Backward, Shift, record address     |
//! | 3 (3..5)  | Start index (16 bit with LargeIdx)                         |
//! | 4 (5..7)  | Element count (16 bit with LargeIdx)                       |
//!
//! Each element is optionally prefixed by its position, then carries either a
//! full record (address 0: 19 bytes, name length, name) or a compact record
//! (address 6: operation, operation2, max current, target SOC).
use heapless::Vec;

use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::BapData;
use crate::protocol::battery_control::payload::{
    temperature_from_raw, temperature_to_raw, TEMP_DEFAULT_RAW,
};

/// Slot 0 holds immediate operations, slots 1 to 3 the user timers.
pub const PROFILE_COUNT: usize = 4;
/// Fixed part of a full record, name excluded.
pub const PROFILE_RECORD_LEN: usize = 19;
pub const COMPACT_RECORD_LEN: usize = 4;
pub const MAX_PROFILE_NAME: usize = 31;

pub const MAX_CURRENT_A: u8 = 32;
pub const MAX_LEAD_TIME_MIN: u8 = 120;

/// Bits of [`ChargingProfile::operation`].
pub mod operation {
    pub const CHARGE: u8 = 0x01;
    pub const CLIMATE: u8 = 0x02;
    /// Climate may run from the traction battery without external supply.
    pub const CLIMATE_WITHOUT_SUPPLY: u8 = 0x04;
    pub const AUTO_DEFROST: u8 = 0x08;
    pub const SEAT_HEATER_FRONT_LEFT: u8 = 0x10;
    pub const SEAT_HEATER_FRONT_RIGHT: u8 = 0x20;
    pub const SEAT_HEATER_REAR_LEFT: u8 = 0x40;
    pub const SEAT_HEATER_REAR_RIGHT: u8 = 0x80;
}

/// Bits of the array header flag byte.
pub mod array_flags {
    pub const LARGE_IDX: u8 = 0x80;
    pub const POS_TRANSMIT: u8 = 0x40;
    pub const BACKWARD: u8 = 0x20;
    pub const SHIFT: u8 = 0x10;
    pub const RECORD_ADDR_MASK: u8 = 0x0F;
}

pub const RECORD_ADDR_FULL: u8 = 0x00;
pub const RECORD_ADDR_COMPACT: u8 = 0x06;

//==================================================================================ChargingProfile

/// One vehicle-resident profile.
///
/// `valid` is set only when a full record has been received from the
/// vehicle (or restored from a store written from one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingProfile {
    pub operation: u8,
    pub operation2: u8,
    /// Amps, 0 to 32.
    pub max_current: u8,
    pub min_charge_level: u8,
    pub min_range: u16,
    /// Percent, 0 to 100.
    pub target_soc: u8,
    pub target_charge_duration: u8,
    pub target_range: u16,
    pub range_unit: u8,
    pub range_calc_setup: u8,
    /// See [`temperature_from_raw`].
    pub temperature_raw: u8,
    pub temperature_unit: u8,
    /// Minutes, 0 to 120.
    pub lead_time_min: u8,
    pub hold_time_plug_min: u8,
    pub hold_time_battery_min: u8,
    pub provider_data_id: u16,
    pub name: Vec<u8, MAX_PROFILE_NAME>,
    pub valid: bool,
}

impl Default for ChargingProfile {
    fn default() -> Self {
        Self {
            operation: 0,
            operation2: 0,
            max_current: MAX_CURRENT_A,
            min_charge_level: 0,
            min_range: 0,
            target_soc: 80,
            target_charge_duration: 0,
            target_range: 0,
            range_unit: 0,
            range_calc_setup: 0,
            temperature_raw: TEMP_DEFAULT_RAW,
            temperature_unit: 0,
            lead_time_min: 30,
            hold_time_plug_min: 30,
            hold_time_battery_min: 10,
            provider_data_id: 0,
            name: Vec::new(),
            valid: false,
        }
    }
}

impl ChargingProfile {
    fn has_flag(&self, flag: u8) -> bool {
        self.operation & flag != 0
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.operation |= flag;
        } else {
            self.operation &= !flag;
        }
    }

    pub fn enable_charging(&self) -> bool {
        self.has_flag(operation::CHARGE)
    }

    pub fn enable_climate(&self) -> bool {
        self.has_flag(operation::CLIMATE)
    }

    pub fn allow_battery(&self) -> bool {
        self.has_flag(operation::CLIMATE_WITHOUT_SUPPLY)
    }

    pub fn set_enable_charging(&mut self, on: bool) {
        self.set_flag(operation::CHARGE, on);
    }

    pub fn set_enable_climate(&mut self, on: bool) {
        self.set_flag(operation::CLIMATE, on);
    }

    pub fn set_allow_battery(&mut self, on: bool) {
        self.set_flag(operation::CLIMATE_WITHOUT_SUPPLY, on);
    }

    pub fn temperature_c(&self) -> f32 {
        temperature_from_raw(self.temperature_raw)
    }

    /// Clamped to 15.5 to 30.0 °C.
    pub fn set_temperature_c(&mut self, celsius: f32) {
        self.temperature_raw = temperature_to_raw(celsius);
    }

    pub fn set_max_current(&mut self, amps: u8) {
        self.max_current = amps.min(MAX_CURRENT_A);
    }

    pub fn set_target_soc(&mut self, percent: u8) {
        self.target_soc = percent.min(100);
    }

    pub fn set_lead_time(&mut self, minutes: u8) {
        self.lead_time_min = minutes.min(MAX_LEAD_TIME_MIN);
    }

    /// Name bytes are truncated to [`MAX_PROFILE_NAME`].
    pub fn set_name(&mut self, name: &[u8]) {
        let take = name.len().min(MAX_PROFILE_NAME);
        self.name = Vec::from_slice(&name[..take]).unwrap_or_default();
    }

    /// Same record contents, whatever the cache validity flag says.
    pub fn same_record(&self, other: &Self) -> bool {
        let mut this = self.clone();
        this.valid = other.valid;
        this == *other
    }

    /// Bytes taken by this profile in a full-format array element.
    pub fn encoded_len(&self) -> usize {
        PROFILE_RECORD_LEN + 1 + self.name.len()
    }
}

/// Full record, name length and name. Decoding never sets `valid`; that is
/// the caller's decision.
impl BapData for ChargingProfile {
    const MIN_LEN: usize = PROFILE_RECORD_LEN;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::check_len(payload)?;
        let mut reader = BitReader::new(payload);
        let mut profile = ChargingProfile {
            operation: reader.read_u8(8)?,
            operation2: reader.read_u8(8)?,
            max_current: reader.read_u8(8)?,
            min_charge_level: reader.read_u8(8)?,
            min_range: reader.read_u16(16)?,
            target_soc: reader.read_u8(8)?,
            target_charge_duration: reader.read_u8(8)?,
            target_range: reader.read_u16(16)?,
            range_unit: reader.read_u8(8)?,
            range_calc_setup: reader.read_u8(8)?,
            temperature_raw: reader.read_u8(8)?,
            temperature_unit: reader.read_u8(8)?,
            lead_time_min: reader.read_u8(8)?,
            hold_time_plug_min: reader.read_u8(8)?,
            hold_time_battery_min: reader.read_u8(8)?,
            provider_data_id: reader.read_u16(16)?,
            ..Default::default()
        };

        if reader.remaining_bytes() >= 1 {
            let announced = reader.read_u8(8)? as usize;
            let available = announced.min(reader.remaining_bytes());
            let name = reader.read_slice(available)?;
            profile.set_name(name);
        }
        Ok(profile)
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.operation, 8)?;
        writer.write_u8(self.operation2, 8)?;
        writer.write_u8(self.max_current, 8)?;
        writer.write_u8(self.min_charge_level, 8)?;
        writer.write_u16(self.min_range, 16)?;
        writer.write_u8(self.target_soc, 8)?;
        writer.write_u8(self.target_charge_duration, 8)?;
        writer.write_u16(self.target_range, 16)?;
        writer.write_u8(self.range_unit, 8)?;
        writer.write_u8(self.range_calc_setup, 8)?;
        writer.write_u8(self.temperature_raw, 8)?;
        writer.write_u8(self.temperature_unit, 8)?;
        writer.write_u8(self.lead_time_min, 8)?;
        writer.write_u8(self.hold_time_plug_min, 8)?;
        writer.write_u8(self.hold_time_battery_min, 8)?;
        writer.write_u16(self.provider_data_id, 16)?;
        writer.write_u8(self.name.len() as u8, 8)?;
        writer.write_slice(&self.name)?;
        Ok(writer.byte_len())
    }
}

//==================================================================================CompactProfile

/// Record address 6: the four fields the vehicle pushes on quick changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompactProfile {
    pub operation: u8,
    pub operation2: u8,
    pub max_current: u8,
    pub target_soc: u8,
}

impl CompactProfile {
    /// The compact projection of a full record.
    pub fn of(profile: &ChargingProfile) -> Self {
        Self {
            operation: profile.operation,
            operation2: profile.operation2,
            max_current: profile.max_current,
            target_soc: profile.target_soc,
        }
    }

    /// Overwrite the matching fields. Leaves `valid` alone.
    pub fn apply_to(&self, profile: &mut ChargingProfile) {
        profile.operation = self.operation;
        profile.operation2 = self.operation2;
        profile.max_current = self.max_current;
        profile.target_soc = self.target_soc;
    }
}

impl BapData for CompactProfile {
    const MIN_LEN: usize = COMPACT_RECORD_LEN;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::check_len(payload)?;
        let mut reader = BitReader::new(payload);
        Ok(Self {
            operation: reader.read_u8(8)?,
            operation2: reader.read_u8(8)?,
            max_current: reader.read_u8(8)?,
            target_soc: reader.read_u8(8)?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.operation, 8)?;
        writer.write_u8(self.operation2, 8)?;
        writer.write_u8(self.max_current, 8)?;
        writer.write_u8(self.target_soc, 8)?;
        Ok(writer.byte_len())
    }
}

//==================================================================================Field updates

/// Partial modification applied during a read-modify-write. Only the fields
/// whose `update_*` flag is set are touched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProfileFieldUpdate {
    pub update_operation: bool,
    pub operation: u8,
    pub update_max_current: bool,
    pub max_current: u8,
    pub update_target_soc: bool,
    pub target_soc: u8,
    pub update_temperature: bool,
    /// °C.
    pub temperature: f32,
    pub update_lead_time: bool,
    pub lead_time_min: u8,
}

impl ProfileFieldUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: u8) -> Self {
        self.update_operation = true;
        self.operation = operation;
        self
    }

    pub fn with_max_current(mut self, amps: u8) -> Self {
        self.update_max_current = true;
        self.max_current = amps;
        self
    }

    pub fn with_target_soc(mut self, percent: u8) -> Self {
        self.update_target_soc = true;
        self.target_soc = percent;
        self
    }

    pub fn with_temperature(mut self, celsius: f32) -> Self {
        self.update_temperature = true;
        self.temperature = celsius;
        self
    }

    pub fn with_lead_time(mut self, minutes: u8) -> Self {
        self.update_lead_time = true;
        self.lead_time_min = minutes;
        self
    }

    /// Values are clamped by the profile setters.
    pub fn apply_to(&self, profile: &mut ChargingProfile) {
        if self.update_operation {
            profile.operation = self.operation;
        }
        if self.update_max_current {
            profile.set_max_current(self.max_current);
        }
        if self.update_target_soc {
            profile.set_target_soc(self.target_soc);
        }
        if self.update_temperature {
            profile.set_temperature_c(self.temperature);
        }
        if self.update_lead_time {
            profile.set_lead_time(self.lead_time_min);
        }
    }
}

//==================================================================================Array codec

/// Decoded array header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArrayHeader {
    pub asg_id: u8,
    pub transaction_id: u8,
    pub total_elements: u8,
    pub flags: u8,
    pub start_index: u16,
    pub element_count: u16,
}

impl ArrayHeader {
    pub const LEN: usize = 5;
    pub const LARGE_LEN: usize = 7;

    pub fn record_address(&self) -> u8 {
        self.flags & array_flags::RECORD_ADDR_MASK
    }

    pub fn pos_transmit(&self) -> bool {
        self.flags & array_flags::POS_TRANSMIT != 0
    }

    pub fn large_index(&self) -> bool {
        self.flags & array_flags::LARGE_IDX != 0
    }

    /// Decode the STATUS header, returning it with its length.
    pub fn decode(payload: &[u8]) -> Result<(Self, usize), DecodeError> {
        if payload.len() < Self::LEN {
            return Err(DecodeError::TooShort {
                needed: Self::LEN,
                got: payload.len(),
            });
        }
        let mut reader = BitReader::new(payload);
        let transaction_id = reader.read_u8(4)?;
        let asg_id = reader.read_u8(4)?;
        let total_elements = reader.read_u8(8)?;
        let flags = reader.read_u8(8)?;
        let index_bits = if flags & array_flags::LARGE_IDX != 0 {
            if payload.len() < Self::LARGE_LEN {
                return Err(DecodeError::TooShort {
                    needed: Self::LARGE_LEN,
                    got: payload.len(),
                });
            }
            16
        } else {
            8
        };
        let start_index = reader.read_u16(index_bits)?;
        let element_count = reader.read_u16(index_bits)?;
        let header = Self {
            asg_id,
            transaction_id,
            total_elements,
            flags,
            start_index,
            element_count,
        };
        Ok((header, reader.byte_position()))
    }
}

/// One record carried by an array message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayRecord {
    Full(ChargingProfile),
    Compact(CompactProfile),
}

/// Walk a STATUS array payload, calling `visit` with `(position, record)`
/// for every complete element. Elements cut short by the end of the payload
/// end the walk. Returns the number of elements visited.
pub fn decode_profile_array(
    payload: &[u8],
    mut visit: impl FnMut(u16, ArrayRecord),
) -> Result<usize, DecodeError> {
    let (header, header_len) = ArrayHeader::decode(payload)?;
    let record_address = header.record_address();
    if record_address != RECORD_ADDR_FULL && record_address != RECORD_ADDR_COMPACT {
        return Err(DecodeError::UnsupportedRecordAddress { record_address });
    }

    let mut rest = &payload[header_len..];
    let mut visited = 0;
    for i in 0..header.element_count {
        let (position, body) = if header.pos_transmit() {
            let Some((&pos, body)) = rest.split_first() else {
                break;
            };
            (pos as u16, body)
        } else {
            (header.start_index.wrapping_add(i), rest)
        };

        let consumed = if record_address == RECORD_ADDR_COMPACT {
            if body.len() < COMPACT_RECORD_LEN {
                break;
            }
            visit(
                position,
                ArrayRecord::Compact(CompactProfile::from_payload(&body[..COMPACT_RECORD_LEN])?),
            );
            COMPACT_RECORD_LEN
        } else {
            if body.len() < PROFILE_RECORD_LEN {
                break;
            }
            let name_len = body.get(PROFILE_RECORD_LEN).copied().unwrap_or(0) as usize;
            let element_len = (PROFILE_RECORD_LEN + 1 + name_len).min(body.len());
            visit(
                position,
                ArrayRecord::Full(ChargingProfile::from_payload(&body[..element_len])?),
            );
            element_len
        };

        visited += 1;
        let advance = consumed + usize::from(header.pos_transmit());
        rest = &rest[advance.min(rest.len())..];
    }
    Ok(visited)
}

/// SET_GET payload writing one full record at `index`: header
/// `[0x00, PosTransmit | full, index, 1]`, the position byte, then the record.
pub fn encode_profile_write(
    index: u8,
    profile: &ChargingProfile,
    buffer: &mut [u8],
) -> Result<usize, BitWriterError> {
    let mut writer = BitWriter::new(buffer);
    writer.write_u8(0x00, 8)?;
    writer.write_u8(array_flags::POS_TRANSMIT | RECORD_ADDR_FULL, 8)?;
    writer.write_u8(index, 8)?;
    writer.write_u8(1, 8)?;
    writer.write_u8(index, 8)?;
    let header_len = writer.byte_len();
    let record_len = profile.to_payload(&mut buffer[header_len..])?;
    Ok(header_len + record_len)
}

//==================================================================================Events

/// Profile traffic handed from the receive context to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    /// Full record for a slot; the cache becomes valid.
    Full { index: u8, profile: ChargingProfile },
    /// Compact record for a slot; validity unchanged.
    Compact { index: u8, record: CompactProfile },
    /// The vehicle answered a ProfilesArray request with an error.
    Rejected,
}
