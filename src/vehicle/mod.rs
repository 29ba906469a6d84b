//! Vehicle state aggregate shared between the receive and control contexts.
//!
//! Each logical field carries its [`DataSource`] and update time. BAP values
//! win over standard-CAN values for the same field while they are fresh.
//! Access from outside goes through [`SharedVehicleState`], whose only
//! accessors take the lock.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::{Duration, Instant};

use crate::core::DataSource;
use crate::protocol::bap::assembler::AssemblerStats;
use crate::protocol::bap::router::RouterStats;
use crate::protocol::battery_control::payload::{ChargeState, ClimateState, PlugState};

/// The bus counts as active while the last frame is younger than this.
pub const BUS_ACTIVITY_WINDOW_MS: u64 = 5_000;
/// A BAP value shields its field from standard-CAN writes for this long.
pub const BAP_FRESHNESS_MS: u64 = 10_000;

//==================================================================================Tracked

/// A value with its provenance and last update time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tracked<T> {
    pub value: T,
    pub source: DataSource,
    pub updated_at: Option<Instant>,
}

impl<T> Tracked<T> {
    /// Unconditional write.
    pub fn set(&mut self, value: T, source: DataSource, now: Instant) {
        self.value = value;
        self.source = source;
        self.updated_at = Some(now);
    }

    /// Write unless a higher-ranked source wrote within `freshness`.
    /// Returns whether the value was taken.
    pub fn offer(&mut self, value: T, source: DataSource, now: Instant, freshness: Duration) -> bool {
        let shielded = self.source.rank() > source.rank() && !self.is_stale(now, freshness);
        if shielded {
            return false;
        }
        self.set(value, source, now);
        true
    }

    /// Never written, or not written for longer than `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.updated_at {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => true,
        }
    }

    pub fn has_data(&self) -> bool {
        self.source != DataSource::None
    }
}

//==================================================================================Slices

/// Battery and charging fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatterySlice {
    /// Percent.
    pub soc: Tracked<f32>,
    pub charging: Tracked<bool>,
    /// Last full charge broadcast.
    pub details: Tracked<ChargeState>,
}

/// Cabin climate fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimateSlice {
    pub active: Tracked<bool>,
    /// °C.
    pub inside_temp: Tracked<f32>,
    /// Last full climate broadcast.
    pub details: Tracked<ClimateState>,
}

/// Receive-path counters published for the control context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BapDiagnostics {
    pub router: RouterStats,
    pub assembler: AssemblerStats,
    pub pending_count: usize,
}

//==================================================================================VehicleState

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleState {
    pub plug: Tracked<PlugState>,
    pub battery: BatterySlice,
    pub climate: ClimateSlice,
    /// Time of the last frame of any kind seen on the bus.
    pub last_can_activity: Option<Instant>,
    pub frames_seen: u32,
    pub diagnostics: BapDiagnostics,
}

impl VehicleState {
    pub fn new() -> Self {
        Self::default()
    }

    fn freshness() -> Duration {
        Duration::from_millis(BAP_FRESHNESS_MS)
    }

    pub fn apply_bap_plug(&mut self, plug: PlugState, now: Instant) {
        self.plug.set(plug, DataSource::Bap, now);
    }

    pub fn apply_bap_charge(&mut self, charge: ChargeState, now: Instant) {
        self.battery.soc.set(charge.soc as f32, DataSource::Bap, now);
        self.battery
            .charging
            .set(charge.is_charging(), DataSource::Bap, now);
        self.battery.details.set(charge, DataSource::Bap, now);
    }

    pub fn apply_bap_climate(&mut self, climate: ClimateState, now: Instant) {
        self.climate.active.set(climate.active, DataSource::Bap, now);
        self.climate
            .inside_temp
            .set(climate.temperature_c(), DataSource::Bap, now);
        self.climate.details.set(climate, DataSource::Bap, now);
    }

    /// SOC decoded from a standard-CAN broadcast.
    pub fn offer_std_soc(&mut self, soc: f32, now: Instant) -> bool {
        self.battery
            .soc
            .offer(soc, DataSource::CanStd, now, Self::freshness())
    }

    /// Cabin temperature decoded from a standard-CAN broadcast.
    pub fn offer_std_inside_temp(&mut self, celsius: f32, now: Instant) -> bool {
        self.climate
            .inside_temp
            .offer(celsius, DataSource::CanStd, now, Self::freshness())
    }

    /// Charging flag derived from other signals.
    pub fn offer_computed_charging(&mut self, charging: bool, now: Instant) -> bool {
        self.battery
            .charging
            .offer(charging, DataSource::Computed, now, Self::freshness())
    }

    pub fn record_can_activity(&mut self, now: Instant) {
        self.last_can_activity = Some(now);
        self.frames_seen = self.frames_seen.wrapping_add(1);
    }

    /// Some frame was seen within [`BUS_ACTIVITY_WINDOW_MS`].
    pub fn is_bus_active(&self, now: Instant) -> bool {
        self.last_can_activity.is_some_and(|at| {
            now.saturating_duration_since(at) < Duration::from_millis(BUS_ACTIVITY_WINDOW_MS)
        })
    }

    //==================================================================================Getters
    pub fn plug_state(&self) -> PlugState {
        self.plug.value
    }

    pub fn is_plugged(&self) -> bool {
        self.plug.value.is_plugged()
    }

    pub fn soc(&self) -> f32 {
        self.battery.soc.value
    }

    pub fn is_charging(&self) -> bool {
        self.battery.charging.value
    }

    pub fn is_climate_active(&self) -> bool {
        self.climate.active.value
    }

    pub fn inside_temp(&self) -> f32 {
        self.climate.inside_temp.value
    }
}

//==================================================================================Shared

/// Vehicle state behind a critical-section mutex.
///
/// The closure passed to [`Self::lock`] must not lock again: the inner
/// `RefCell` rejects nested borrows. Keep closures to decode-and-copy work.
pub struct SharedVehicleState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<VehicleState>>,
}

impl Default for SharedVehicleState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedVehicleState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(VehicleState::new())),
        }
    }

    /// Run `f` with exclusive access to the state.
    pub fn lock<R>(&self, f: impl FnOnce(&mut VehicleState) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> VehicleState {
        self.lock(|state| *state)
    }

    pub fn plug_state(&self) -> PlugState {
        self.lock(|state| state.plug_state())
    }

    pub fn soc(&self) -> f32 {
        self.lock(|state| state.soc())
    }

    pub fn is_charging(&self) -> bool {
        self.lock(|state| state.is_charging())
    }

    pub fn is_climate_active(&self) -> bool {
        self.lock(|state| state.is_climate_active())
    }

    pub fn is_bus_active(&self, now: Instant) -> bool {
        self.lock(|state| state.is_bus_active(now))
    }
}
