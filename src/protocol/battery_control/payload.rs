//! Fixed-layout payloads of the Battery Control device: plug (0x10),
//! charge (0x11) and climate (0x12) state broadcasts.
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::BapData;

//==================================================================================Temperature

/// Lowest settable cabin temperature (°C).
pub const TEMP_MIN_C: f32 = 15.5;
/// Highest settable cabin temperature (°C).
pub const TEMP_MAX_C: f32 = 30.0;
/// Raw encoding of 22.0 °C.
pub const TEMP_DEFAULT_RAW: u8 = 120;

/// `raw` is tenths of a degree above 10 °C.
pub fn temperature_from_raw(raw: u8) -> f32 {
    (raw as f32 + 100.0) / 10.0
}

/// Encode a cabin temperature, clamped to the settable range.
pub fn temperature_to_raw(celsius: f32) -> u8 {
    if celsius.is_nan() {
        return TEMP_DEFAULT_RAW;
    }
    let clamped = celsius.clamp(TEMP_MIN_C, TEMP_MAX_C);
    (clamped * 10.0 - 100.0 + 0.5) as u8
}

//==================================================================================Enums

/// Charging plug detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlugConnection {
    Unplugged,
    Plugged,
    #[default]
    Init,
    Other(u8),
}

impl PlugConnection {
    pub const fn from_nibble(raw: u8) -> Self {
        match raw & 0x0F {
            0x0 => Self::Unplugged,
            0x1 => Self::Plugged,
            0xF => Self::Init,
            other => Self::Other(other),
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            Self::Unplugged => 0x0,
            Self::Plugged => 0x1,
            Self::Init => 0xF,
            Self::Other(raw) => raw & 0x0F,
        }
    }
}

/// Power supply on the charging plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupplyState {
    Inactive,
    Active,
    StationConnected,
    #[default]
    Init,
    Other(u8),
}

impl SupplyState {
    pub const fn from_nibble(raw: u8) -> Self {
        match raw & 0x0F {
            0x0 => Self::Inactive,
            0x1 => Self::Active,
            0x2 => Self::StationConnected,
            0xF => Self::Init,
            other => Self::Other(other),
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            Self::Inactive => 0x0,
            Self::Active => 0x1,
            Self::StationConnected => 0x2,
            Self::Init => 0xF,
            Self::Other(raw) => raw & 0x0F,
        }
    }
}

/// What the charger is doing with the supplied power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeMode {
    Off,
    Ac,
    Dc,
    Conditioning,
    AcAndConditioning,
    DcAndConditioning,
    #[default]
    Init,
    Other(u8),
}

impl ChargeMode {
    pub const fn from_nibble(raw: u8) -> Self {
        match raw & 0x0F {
            0x0 => Self::Off,
            0x1 => Self::Ac,
            0x2 => Self::Dc,
            0x3 => Self::Conditioning,
            0x4 => Self::AcAndConditioning,
            0x5 => Self::DcAndConditioning,
            0xF => Self::Init,
            other => Self::Other(other),
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            Self::Off => 0x0,
            Self::Ac => 0x1,
            Self::Dc => 0x2,
            Self::Conditioning => 0x3,
            Self::AcAndConditioning => 0x4,
            Self::DcAndConditioning => 0x5,
            Self::Init => 0xF,
            Self::Other(raw) => raw & 0x0F,
        }
    }
}

/// Progress of the charging process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeStatus {
    #[default]
    Init,
    Idle,
    Running,
    Conservation,
    AbortedTempLow,
    AbortedDeviceError,
    AbortedNoPower,
    AbortedNotInPark,
    Completed,
    NoError,
    Other(u8),
}

impl ChargeStatus {
    pub const fn from_nibble(raw: u8) -> Self {
        match raw & 0x0F {
            0x0 => Self::Init,
            0x1 => Self::Idle,
            0x2 => Self::Running,
            0x3 => Self::Conservation,
            0x4 => Self::AbortedTempLow,
            0x5 => Self::AbortedDeviceError,
            0x6 => Self::AbortedNoPower,
            0x7 => Self::AbortedNotInPark,
            0x8 => Self::Completed,
            0x9 => Self::NoError,
            other => Self::Other(other),
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            Self::Init => 0x0,
            Self::Idle => 0x1,
            Self::Running => 0x2,
            Self::Conservation => 0x3,
            Self::AbortedTempLow => 0x4,
            Self::AbortedDeviceError => 0x5,
            Self::AbortedNoPower => 0x6,
            Self::AbortedNotInPark => 0x7,
            Self::Completed => 0x8,
            Self::NoError => 0x9,
            Self::Other(raw) => raw & 0x0F,
        }
    }
}

//==================================================================================Plug

/// Function 0x10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlugState {
    pub lock_setup: u8,
    /// 0 unlocked, 1 locked, 2 error.
    pub lock_state: u8,
    pub supply: SupplyState,
    pub plug: PlugConnection,
}

impl PlugState {
    pub fn is_plugged(&self) -> bool {
        self.plug == PlugConnection::Plugged
    }

    pub fn has_supply(&self) -> bool {
        matches!(
            self.supply,
            SupplyState::Active | SupplyState::StationConnected
        )
    }

    /// The vehicle has reported a real plug state.
    pub fn is_valid(&self) -> bool {
        self.plug != PlugConnection::Init
    }
}

impl BapData for PlugState {
    const MIN_LEN: usize = 2;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::check_len(payload)?;
        let mut reader = BitReader::new(payload);
        let lock_state = reader.read_u8(4)?;
        let lock_setup = reader.read_u8(4)?;
        let plug = PlugConnection::from_nibble(reader.read_u8(4)?);
        let supply = SupplyState::from_nibble(reader.read_u8(4)?);
        Ok(Self {
            lock_setup,
            lock_state,
            supply,
            plug,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.lock_state, 4)?;
        writer.write_u8(self.lock_setup, 4)?;
        writer.write_u8(self.plug.to_nibble(), 4)?;
        writer.write_u8(self.supply.to_nibble(), 4)?;
        Ok(writer.byte_len())
    }
}

//==================================================================================Charge

/// Function 0x11. Only mode, status and SOC are mandatory; the rest keep
/// their defaults when the broadcast is shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChargeState {
    pub mode: ChargeMode,
    pub status: ChargeStatus,
    /// State of charge, percent.
    pub soc: u8,
    pub remaining_time_min: u8,
    pub current_range: u8,
    pub range_unit: u8,
    pub charging_amps: u8,
    pub battery_climate_state: u8,
    pub start_reason: u8,
    /// Target SOC nibble as broadcast.
    pub target_soc: u8,
}

impl ChargeState {
    pub fn is_charging(&self) -> bool {
        !matches!(self.mode, ChargeMode::Off | ChargeMode::Init)
            && self.status == ChargeStatus::Running
    }
}

impl BapData for ChargeState {
    const MIN_LEN: usize = 2;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::check_len(payload)?;
        let mut reader = BitReader::new(payload);
        let mut state = ChargeState {
            status: ChargeStatus::from_nibble(reader.read_u8(4)?),
            mode: ChargeMode::from_nibble(reader.read_u8(4)?),
            soc: reader.read_u8(8)?,
            ..Default::default()
        };

        if reader.remaining_bytes() >= 1 {
            state.remaining_time_min = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 1 {
            state.current_range = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 1 {
            state.range_unit = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 1 {
            state.charging_amps = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 1 {
            reader.advance(4)?;
            state.battery_climate_state = reader.read_u8(4)?;
        }

        // byte 7 is not interpreted
        if reader.remaining_bytes() < 2 {
            return Ok(state);
        }
        reader.advance(8)?;
        state.target_soc = reader.read_u8(4)?;
        state.start_reason = reader.read_u8(4)?;
        Ok(state)
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.status.to_nibble(), 4)?;
        writer.write_u8(self.mode.to_nibble(), 4)?;
        writer.write_u8(self.soc, 8)?;
        writer.write_u8(self.remaining_time_min, 8)?;
        writer.write_u8(self.current_range, 8)?;
        writer.write_u8(self.range_unit, 8)?;
        writer.write_u8(self.charging_amps, 8)?;
        writer.write_u8(0, 4)?;
        writer.write_u8(self.battery_climate_state, 4)?;
        writer.write_u8(0, 8)?;
        writer.write_u8(self.target_soc, 4)?;
        writer.write_u8(self.start_reason, 4)?;
        Ok(writer.byte_len())
    }
}

//==================================================================================Climate

/// Function 0x12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClimateState {
    pub active: bool,
    pub auto_defrost: bool,
    pub heating: bool,
    pub cooling: bool,
    pub ventilation: bool,
    pub fuel_heating: bool,
    /// See [`temperature_from_raw`].
    pub temperature_raw: u8,
    pub temperature_unit: u8,
    pub remaining_min: u16,
    pub climate_state: u8,
}

impl ClimateState {
    pub fn temperature_c(&self) -> f32 {
        temperature_from_raw(self.temperature_raw)
    }
}

impl BapData for ClimateState {
    const MIN_LEN: usize = 1;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::check_len(payload)?;
        let mut reader = BitReader::new(payload);
        let mut state = ClimateState {
            active: reader.read_bool()?,
            auto_defrost: reader.read_bool()?,
            heating: reader.read_bool()?,
            cooling: reader.read_bool()?,
            ventilation: reader.read_bool()?,
            fuel_heating: reader.read_bool()?,
            ..Default::default()
        };
        reader.advance(2)?;

        if reader.remaining_bytes() >= 1 {
            state.temperature_raw = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 1 {
            state.temperature_unit = reader.read_u8(8)?;
        }
        if reader.remaining_bytes() >= 2 {
            state.remaining_min = reader.read_u16(16)?;
        }
        if reader.remaining_bytes() >= 1 {
            reader.advance(4)?;
            state.climate_state = reader.read_u8(4)?;
        }
        Ok(state)
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        for flag in [
            self.active,
            self.auto_defrost,
            self.heating,
            self.cooling,
            self.ventilation,
            self.fuel_heating,
        ] {
            writer.write_bool(flag)?;
        }
        writer.write_u8(0, 2)?;
        writer.write_u8(self.temperature_raw, 8)?;
        writer.write_u8(self.temperature_unit, 8)?;
        writer.write_u16(self.remaining_min, 16)?;
        writer.write_u8(0, 4)?;
        writer.write_u8(self.climate_state, 4)?;
        Ok(writer.byte_len())
    }
}
