//! Battery Control device (BAP device 0x25): plug, charge and climate
//! broadcasts in, charge/climate commands and profile requests out.
//!
//! The channel is shared by reference between the receive context, which
//! calls [`BapChannel::process_message`], and the control context, which
//! issues requests. Counters are atomics for that reason.
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::Instant;

use crate::core::MAX_BAP_PAYLOAD;
use crate::error::{BapEncodeError, BapSendError, SubscribeError};
use crate::infra::codec::traits::BapData;
use crate::protocol::bap::channel::BapChannel;
use crate::protocol::bap::{BapHeader, BapMessage, OpCode};
use crate::protocol::transport::traits::bap_sender::BapSender;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::{CAN_ID_BATTERY_RX, CAN_ID_BATTERY_TX};
use crate::services::profiles::profile::{
    decode_profile_array, encode_profile_write, ArrayRecord, ChargingProfile, ProfileEvent,
    MAX_CURRENT_A, PROFILE_COUNT,
};
use crate::vehicle::SharedVehicleState;

pub mod payload;
pub mod subscribers;

use payload::{temperature_to_raw, ChargeState, ClimateState, PlugState};
use subscribers::{Callback, Subscribers};

/// Logical BAP device of the Battery Control unit.
pub const DEVICE_ID: u8 = 0x25;

/// Function identifiers of the Battery Control device.
pub mod function {
    pub const PLUG_STATE: u8 = 0x10;
    pub const CHARGE_STATE: u8 = 0x11;
    pub const CLIMATE_STATE: u8 = 0x12;
    pub const START_STOP_CHARGE: u8 = 0x14;
    pub const START_STOP_CLIMATE: u8 = 0x15;
    pub const OPERATION_MODE: u8 = 0x18;
    pub const PROFILES_ARRAY: u8 = 0x19;
}

/// Default depth of the profile event queue.
pub const DEFAULT_PROFILE_QUEUE: usize = 8;

/// Queue feeding profile records to the profile manager.
pub type ProfileEventSender<'a, const Q: usize> =
    Sender<'a, CriticalSectionRawMutex, ProfileEvent, Q>;

//==================================================================================Counters

#[derive(Debug, Default)]
struct Counters {
    plug_frames: AtomicU32,
    charge_frames: AtomicU32,
    climate_frames: AtomicU32,
    profile_frames: AtomicU32,
    other_frames: AtomicU32,
    decode_errors: AtomicU32,
    ignored_requests: AtomicU32,
    dropped_events: AtomicU32,
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the channel counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryChannelStats {
    pub plug_frames: u32,
    pub charge_frames: u32,
    pub climate_frames: u32,
    pub profile_frames: u32,
    /// Responses for functions this channel does not decode.
    pub other_frames: u32,
    /// Payloads shorter than the function layout; state left untouched.
    pub decode_errors: u32,
    /// Request opcodes seen on the broadcast id.
    pub ignored_requests: u32,
    /// Profile events lost to a full queue.
    pub dropped_events: u32,
}

//==================================================================================Channel

pub struct BatteryControlChannel<'a, const Q: usize = DEFAULT_PROFILE_QUEUE> {
    state: &'a SharedVehicleState,
    profile_events: Option<ProfileEventSender<'a, Q>>,
    plug_subscribers: Subscribers<'a, PlugState>,
    charge_subscribers: Subscribers<'a, ChargeState>,
    climate_subscribers: Subscribers<'a, ClimateState>,
    counters: Counters,
}

impl<'a, const Q: usize> BatteryControlChannel<'a, Q> {
    pub fn new(state: &'a SharedVehicleState) -> Self {
        Self {
            state,
            profile_events: None,
            plug_subscribers: Subscribers::new(),
            charge_subscribers: Subscribers::new(),
            climate_subscribers: Subscribers::new(),
            counters: Counters::default(),
        }
    }

    /// Forward ProfilesArray records to a profile manager.
    pub fn with_profile_events(mut self, sender: ProfileEventSender<'a, Q>) -> Self {
        self.profile_events = Some(sender);
        self
    }

    //==================================================================================Observers
    pub fn on_plug_state(&mut self, callback: Callback<'a, PlugState>) -> Result<(), SubscribeError> {
        self.plug_subscribers.subscribe(callback)
    }

    pub fn on_charge_state(
        &mut self,
        callback: Callback<'a, ChargeState>,
    ) -> Result<(), SubscribeError> {
        self.charge_subscribers.subscribe(callback)
    }

    pub fn on_climate_state(
        &mut self,
        callback: Callback<'a, ClimateState>,
    ) -> Result<(), SubscribeError> {
        self.climate_subscribers.subscribe(callback)
    }

    //==================================================================================Getters
    pub fn plug_state(&self) -> PlugState {
        self.state.plug_state()
    }

    pub fn soc(&self) -> f32 {
        self.state.soc()
    }

    pub fn is_charging(&self) -> bool {
        self.state.is_charging()
    }

    pub fn is_climate_active(&self) -> bool {
        self.state.is_climate_active()
    }

    pub fn stats(&self) -> BatteryChannelStats {
        let c = &self.counters;
        BatteryChannelStats {
            plug_frames: c.plug_frames.load(Ordering::Relaxed),
            charge_frames: c.charge_frames.load(Ordering::Relaxed),
            climate_frames: c.climate_frames.load(Ordering::Relaxed),
            profile_frames: c.profile_frames.load(Ordering::Relaxed),
            other_frames: c.other_frames.load(Ordering::Relaxed),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            ignored_requests: c.ignored_requests.load(Ordering::Relaxed),
            dropped_events: c.dropped_events.load(Ordering::Relaxed),
        }
    }

    //==================================================================================Requests
    fn send<B: CanBus>(
        &self,
        bus: &mut B,
        opcode: OpCode,
        function_id: u8,
        payload: &[u8],
    ) -> Result<usize, BapSendError<B::Error>> {
        let header = BapHeader::new(opcode, DEVICE_ID, function_id);
        #[cfg(feature = "defmt")]
        defmt::debug!("BatteryControl -> {} fn {=u8:#x}", opcode, function_id);
        bus.send_bap(CAN_ID_BATTERY_TX, header, payload)
    }

    pub fn request_plug_state<B: CanBus>(&self, bus: &mut B) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::Get, function::PLUG_STATE, &[])
    }

    pub fn request_charge_state<B: CanBus>(
        &self,
        bus: &mut B,
    ) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::Get, function::CHARGE_STATE, &[])
    }

    pub fn request_climate_state<B: CanBus>(
        &self,
        bus: &mut B,
    ) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::Get, function::CLIMATE_STATE, &[])
    }

    /// GET on the whole profile array; the vehicle answers with a STATUS
    /// carrying every slot.
    pub fn request_profiles<B: CanBus>(&self, bus: &mut B) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::Get, function::PROFILES_ARRAY, &[])
    }

    /// Full-record SET_GET for one slot. Usually spans several frames.
    pub fn send_profile_record<B: CanBus>(
        &self,
        bus: &mut B,
        index: u8,
        profile: &ChargingProfile,
    ) -> Result<usize, BapSendError<B::Error>> {
        if index as usize >= PROFILE_COUNT {
            return Err(BapEncodeError::InvalidProfileIndex { index }.into());
        }
        let mut buffer = [0u8; MAX_BAP_PAYLOAD];
        let len = encode_profile_write(index, profile, &mut buffer).map_err(BapEncodeError::from)?;
        self.send(bus, OpCode::SetGet, function::PROFILES_ARRAY, &buffer[..len])
    }

    /// Arm or disarm a departure timer. Only slots 1 to 3 are timers.
    pub fn set_timer_profile_enabled<B: CanBus>(
        &self,
        bus: &mut B,
        index: u8,
        enable: bool,
    ) -> Result<usize, BapSendError<B::Error>> {
        if !(1..PROFILE_COUNT as u8).contains(&index) {
            return Err(BapEncodeError::InvalidProfileIndex { index }.into());
        }
        let timer_bit = if enable { 1 << index } else { 0 };
        self.send(bus, OpCode::SetGet, function::OPERATION_MODE, &[0x00, timer_bit])
    }

    /// `target_soc` is clamped to 100 %, `max_current` to 32 A.
    pub fn start_charging<B: CanBus>(
        &self,
        bus: &mut B,
        target_soc: u8,
        max_current: u8,
    ) -> Result<usize, BapSendError<B::Error>> {
        let payload = [0x01, target_soc.min(100), max_current.min(MAX_CURRENT_A)];
        self.send(bus, OpCode::SetGet, function::START_STOP_CHARGE, &payload)
    }

    pub fn stop_charging<B: CanBus>(&self, bus: &mut B) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::SetGet, function::START_STOP_CHARGE, &[0x00])
    }

    /// `temperature` in °C, clamped to the settable range.
    pub fn start_climate<B: CanBus>(
        &self,
        bus: &mut B,
        temperature: f32,
        allow_battery: bool,
    ) -> Result<usize, BapSendError<B::Error>> {
        let payload = [0x01, temperature_to_raw(temperature), allow_battery as u8];
        self.send(bus, OpCode::SetGet, function::START_STOP_CLIMATE, &payload)
    }

    pub fn stop_climate<B: CanBus>(&self, bus: &mut B) -> Result<usize, BapSendError<B::Error>> {
        self.send(bus, OpCode::SetGet, function::START_STOP_CLIMATE, &[0x00])
    }

    //==================================================================================Decode
    fn decode<T: BapData>(&self, payload: &[u8]) -> Option<T> {
        match T::from_payload(payload) {
            Ok(value) => Some(value),
            Err(_err) => {
                bump(&self.counters.decode_errors);
                #[cfg(feature = "defmt")]
                defmt::debug!("BatteryControl decode error: {}", _err);
                None
            }
        }
    }

    fn handle_plug(&self, payload: &[u8], now: Instant) {
        bump(&self.counters.plug_frames);
        let Some(plug) = self.decode::<PlugState>(payload) else {
            return;
        };
        self.state.lock(|state| state.apply_bap_plug(plug, now));
        self.plug_subscribers.notify(&plug);
    }

    fn handle_charge(&self, payload: &[u8], now: Instant) {
        bump(&self.counters.charge_frames);
        let Some(charge) = self.decode::<ChargeState>(payload) else {
            return;
        };
        self.state.lock(|state| state.apply_bap_charge(charge, now));
        self.charge_subscribers.notify(&charge);
    }

    fn handle_climate(&self, payload: &[u8], now: Instant) {
        bump(&self.counters.climate_frames);
        let Some(climate) = self.decode::<ClimateState>(payload) else {
            return;
        };
        self.state.lock(|state| state.apply_bap_climate(climate, now));
        self.climate_subscribers.notify(&climate);
    }

    fn handle_profiles(&self, payload: &[u8]) {
        bump(&self.counters.profile_frames);
        let result = decode_profile_array(payload, |position, record| {
            if position as usize >= PROFILE_COUNT {
                return;
            }
            let index = position as u8;
            let event = match record {
                ArrayRecord::Full(profile) => ProfileEvent::Full { index, profile },
                ArrayRecord::Compact(record) => ProfileEvent::Compact { index, record },
            };
            self.push_event(event);
        });
        if let Err(_err) = result {
            bump(&self.counters.decode_errors);
            #[cfg(feature = "defmt")]
            defmt::debug!("ProfilesArray decode error: {}", _err);
        }
    }

    fn push_event(&self, event: ProfileEvent) {
        let Some(sender) = &self.profile_events else {
            return;
        };
        if sender.try_send(event).is_err() {
            bump(&self.counters.dropped_events);
            #[cfg(feature = "defmt")]
            defmt::warn!("Profile event queue full, record dropped");
        }
    }
}

impl<'a, const Q: usize> BapChannel for BatteryControlChannel<'a, Q> {
    fn device_id(&self) -> u8 {
        DEVICE_ID
    }

    fn tx_can_id(&self) -> u32 {
        CAN_ID_BATTERY_TX
    }

    fn rx_can_id(&self) -> u32 {
        CAN_ID_BATTERY_RX
    }

    fn name(&self) -> &'static str {
        "BatteryControl"
    }

    fn process_message(&self, message: &BapMessage, now: Instant) {
        let opcode = message.opcode();
        if !opcode.is_response() {
            // Our own or another controller's request echoed on the bus.
            bump(&self.counters.ignored_requests);
            return;
        }

        let payload = message.payload();
        match (message.function_id(), opcode) {
            (function::PROFILES_ARRAY, OpCode::Error) => {
                bump(&self.counters.profile_frames);
                self.push_event(ProfileEvent::Rejected);
            }
            (_, OpCode::Error | OpCode::Ack) => bump(&self.counters.other_frames),
            (function::PLUG_STATE, _) => self.handle_plug(payload, now),
            (function::CHARGE_STATE, _) => self.handle_charge(payload, now),
            (function::CLIMATE_STATE, _) => self.handle_climate(payload, now),
            (function::PROFILES_ARRAY, _) => self.handle_profiles(payload),
            _ => bump(&self.counters.other_frames),
        }
    }
}
