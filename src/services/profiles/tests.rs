use super::*;
use crate::error::StoreError;
use crate::infra::codec::traits::BapData;
use crate::protocol::bap::channel::BapChannel;
use crate::protocol::bap::{BapHeader, BapMessage, OpCode};
use crate::protocol::battery_control::{function, DEVICE_ID};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::CAN_ID_BATTERY_TX;
use crate::vehicle::SharedVehicleState;
use core::cell::RefCell;
use embassy_sync::channel::Channel;
use profile::array_flags;

#[derive(Default)]
struct RecordingBus {
    frames: heapless::Vec<CanFrame, 64>,
}

impl RecordingBus {
    fn bap_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.id == CAN_ID_BATTERY_TX).count()
    }
}

impl CanBus for RecordingBus {
    type Error = ();

    fn send(&mut self, frame: &CanFrame) -> Result<(), ()> {
        self.frames.push(*frame).map_err(|_| ())
    }
}

#[derive(Default)]
struct MemoryStorage {
    image: heapless::Vec<u8, 256>,
}

impl RetainedStorage for MemoryStorage {
    type Error = ();

    fn load(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let len = self.image.len().min(buf.len());
        buf[..len].copy_from_slice(&self.image[..len]);
        Ok(len)
    }

    fn store(&mut self, image: &[u8]) -> Result<(), ()> {
        self.image.clear();
        self.image.extend_from_slice(image).map_err(|_| ())
    }
}

type Events = Channel<CriticalSectionRawMutex, ProfileEvent, 8>;

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// STATUS array carrying one full record at `index`.
fn full_record_status(index: u8, profile: &ChargingProfile) -> BapMessage {
    let mut payload = [0u8; 64];
    payload[..6].copy_from_slice(&[0x00, 4, array_flags::POS_TRANSMIT, index, 1, index]);
    let len = profile.to_payload(&mut payload[6..]).unwrap();
    BapMessage::new(
        BapHeader::new(OpCode::Status, DEVICE_ID, function::PROFILES_ARRAY),
        &payload[..6 + len],
    )
}

fn vehicle_profile(target_soc: u8) -> ChargingProfile {
    let mut profile = ChargingProfile::default();
    profile.target_soc = target_soc;
    profile.max_current = 16;
    profile.set_name(b"Night");
    profile
}

/// Wake controller already on an active bus.
fn awake(bus: &mut RecordingBus) -> WakeController {
    let mut wake = WakeController::default();
    wake.tick(bus, at(0), true);
    wake
}

#[test]
/// Read, modify, write, confirm: the callback fires once with success.
fn test_update_happy_path() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    assert!(!manager.profile(2).unwrap().valid);
    assert!(manager.request_profile_update(
        2,
        ProfileFieldUpdate::new().with_target_soc(90),
        &callback,
        at(0)
    ));
    assert_eq!(manager.state(), ProfileUpdateState::ReadingProfile);

    manager.poll(&channel, &mut bus, &mut wake, at(0));
    assert_eq!(bus.bap_frames(), 1);

    channel.process_message(&full_record_status(2, &vehicle_profile(80)), at(50));
    manager.poll(&channel, &mut bus, &mut wake, at(100));
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);
    assert!(manager.profile(2).unwrap().valid);
    assert_eq!(manager.profile(2).unwrap().target_soc, 80);
    // 30 byte SET_GET: start frame and four continuations
    assert_eq!(bus.bap_frames(), 6);

    channel.process_message(&full_record_status(2, &vehicle_profile(90)), at(150));
    manager.poll(&channel, &mut bus, &mut wake, at(200));
    assert_eq!(manager.state(), ProfileUpdateState::UpdateComplete);
    assert!(results.borrow().is_empty());

    manager.poll(&channel, &mut bus, &mut wake, at(300));
    assert_eq!(manager.state(), ProfileUpdateState::Idle);
    assert_eq!(results.borrow().as_slice(), &[true]);
    assert_eq!(manager.profile(2).unwrap().target_soc, 90);
    let stats = manager.stats();
    assert_eq!(stats.profile_update_count, 1);
    assert_eq!(stats.last_update_time, Some(at(200)));

    manager.poll(&channel, &mut bus, &mut wake, at(400));
    assert_eq!(results.borrow().len(), 1);
}

#[test]
/// The staged write carries the cached record with only the new field.
fn test_write_carries_full_record() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let callback = |_: bool| {};
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    channel.process_message(&full_record_status(1, &vehicle_profile(70)), at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    assert!(manager.profile(1).unwrap().valid);

    manager.request_profile_update(
        1,
        ProfileFieldUpdate::new().with_max_current(10),
        &callback,
        at(10),
    );
    // valid slot: no read
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);
    manager.poll(&channel, &mut bus, &mut wake, at(10));

    let mut assembler: crate::protocol::bap::assembler::BapFrameAssembler =
        Default::default();
    let message = bus
        .frames
        .iter()
        .filter(|f| f.id == CAN_ID_BATTERY_TX)
        .find_map(|f| assembler.feed(f.id, f.payload(), at(10)))
        .unwrap();
    assert_eq!(message.opcode(), OpCode::SetGet);
    assert_eq!(&message.payload()[..5], &[0x00, array_flags::POS_TRANSMIT, 1, 1, 1]);
    let written = ChargingProfile::from_payload(&message.payload()[5..]).unwrap();
    assert_eq!(written.max_current, 10);
    assert_eq!(written.target_soc, 70);
    assert_eq!(written.name.as_slice(), b"Night");
    // cache untouched until the vehicle answers
    assert_eq!(manager.profile(1).unwrap().max_current, 16);
}

#[test]
/// No confirmation: failure reported once, cached profile unchanged.
fn test_update_timeout() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    manager.request_profile_update(
        2,
        ProfileFieldUpdate::new().with_target_soc(90),
        &callback,
        at(0),
    );
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    channel.process_message(&full_record_status(2, &vehicle_profile(80)), at(50));
    manager.poll(&channel, &mut bus, &mut wake, at(100));
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);

    manager.poll(&channel, &mut bus, &mut wake, at(5_099));
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);
    manager.poll(&channel, &mut bus, &mut wake, at(5_100));
    assert_eq!(manager.state(), ProfileUpdateState::UpdateFailed);
    manager.poll(&channel, &mut bus, &mut wake, at(5_200));
    manager.poll(&channel, &mut bus, &mut wake, at(5_300));

    assert_eq!(manager.state(), ProfileUpdateState::Idle);
    assert_eq!(results.borrow().as_slice(), &[false]);
    assert_eq!(manager.profile(2).unwrap().target_soc, 80);
    assert_eq!(manager.stats().updates_failed, 1);
    assert_eq!(manager.stats().profile_update_count, 0);
}

#[test]
/// The GET answer never arrives.
fn test_read_timeout() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver())
        .with_timings(ProfileTimings::default().with_read_timeout(Duration::from_millis(1_000)));
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    manager.request_profile_update(0, ProfileFieldUpdate::new(), &callback, at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(1_000));
    manager.poll(&channel, &mut bus, &mut wake, at(1_100));

    assert_eq!(results.borrow().as_slice(), &[false]);
    assert!(!manager.profile(0).unwrap().valid);
    // one GET, no write
    assert_eq!(bus.bap_frames(), 1);
}

#[test]
/// A second request during an update is refused and changes nothing.
fn test_single_flight() {
    let events = Events::new();
    let callback = |_: bool| {};
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());

    assert!(manager.request_profile_update(
        1,
        ProfileFieldUpdate::new().with_target_soc(60),
        &callback,
        at(0)
    ));
    assert!(manager.is_update_in_progress());
    for index in 0..4 {
        assert!(!manager.request_profile_update(
            index,
            ProfileFieldUpdate::new(),
            &callback,
            at(1)
        ));
    }
    assert_eq!(manager.state(), ProfileUpdateState::ReadingProfile);

    assert!(manager.cancel_profile_update(at(2)));
    assert!(!manager.request_profile_update(4, ProfileFieldUpdate::new(), &callback, at(3)));
}

#[test]
/// Cancelling reports failure at once and never again.
fn test_cancel() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    assert!(!manager.cancel_profile_update(at(0)));
    manager.request_profile_update(3, ProfileFieldUpdate::new(), &callback, at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    assert!(manager.cancel_profile_update(at(10)));
    assert_eq!(results.borrow().as_slice(), &[false]);
    assert_eq!(manager.state(), ProfileUpdateState::Idle);

    // late answer fills the cache but confirms nothing
    channel.process_message(&full_record_status(3, &vehicle_profile(50)), at(20));
    manager.poll(&channel, &mut bus, &mut wake, at(30));
    manager.poll(&channel, &mut bus, &mut wake, at(40));
    assert_eq!(results.borrow().len(), 1);
    assert!(manager.profile(3).unwrap().valid);
    assert_eq!(manager.stats().updates_cancelled, 1);
}

#[test]
/// An error reply to the request fails the update.
fn test_rejected_request() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    manager.request_profile_update(1, ProfileFieldUpdate::new(), &callback, at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    channel.process_message(
        &BapMessage::new(
            BapHeader::new(OpCode::Error, DEVICE_ID, function::PROFILES_ARRAY),
            &[0x01],
        ),
        at(10),
    );
    manager.poll(&channel, &mut bus, &mut wake, at(20));
    assert_eq!(manager.state(), ProfileUpdateState::UpdateFailed);
    manager.poll(&channel, &mut bus, &mut wake, at(30));
    assert_eq!(results.borrow().as_slice(), &[false]);
}

#[test]
/// Compact records update fields without making a slot valid.
fn test_compact_keeps_validity() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);

    let payload = [0x00, 4, profile::RECORD_ADDR_COMPACT, 1, 1, 0x01, 0x00, 12, 65];
    channel.process_message(
        &BapMessage::new(
            BapHeader::new(OpCode::Status, DEVICE_ID, function::PROFILES_ARRAY),
            &payload,
        ),
        at(0),
    );
    manager.poll(&channel, &mut bus, &mut wake, at(0));

    let slot = manager.profile(1).unwrap();
    assert_eq!(slot.target_soc, 65);
    assert_eq!(slot.max_current, 12);
    assert!(!slot.valid);
    assert_eq!(manager.stats().records_received, 1);
}

#[test]
/// A compact echo confirms the write only when it carries the written values.
fn test_compact_echo_must_match_write() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);
    let compact_status = |record: CompactProfile| {
        let payload = [
            0x00,
            4,
            profile::RECORD_ADDR_COMPACT,
            1,
            1,
            record.operation,
            record.operation2,
            record.max_current,
            record.target_soc,
        ];
        BapMessage::new(
            BapHeader::new(OpCode::Status, DEVICE_ID, function::PROFILES_ARRAY),
            &payload,
        )
    };

    channel.process_message(&full_record_status(1, &vehicle_profile(70)), at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    manager.request_profile_update(
        1,
        ProfileFieldUpdate::new().with_target_soc(90),
        &callback,
        at(10),
    );
    manager.poll(&channel, &mut bus, &mut wake, at(10));
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);

    // periodic broadcast still holding the old value
    channel.process_message(&compact_status(CompactProfile::of(&vehicle_profile(70))), at(50));
    manager.poll(&channel, &mut bus, &mut wake, at(60));
    assert_eq!(manager.state(), ProfileUpdateState::UpdatingProfile);
    assert_eq!(manager.stats().profile_update_count, 0);

    channel.process_message(&compact_status(CompactProfile::of(&vehicle_profile(90))), at(100));
    manager.poll(&channel, &mut bus, &mut wake, at(110));
    assert_eq!(manager.state(), ProfileUpdateState::UpdateComplete);
    manager.poll(&channel, &mut bus, &mut wake, at(120));
    assert_eq!(results.borrow().as_slice(), &[true]);
    assert_eq!(manager.profile(1).unwrap().target_soc, 90);
}

#[test]
/// While the vehicle sleeps nothing is sent; the wake budget bounds the wait.
fn test_waits_for_bus() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let results: RefCell<heapless::Vec<bool, 4>> = RefCell::new(heapless::Vec::new());
    let callback = |ok: bool| results.borrow_mut().push(ok).unwrap();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = WakeController::default();

    manager.request_profile_update(2, ProfileFieldUpdate::new(), &callback, at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    assert_eq!(wake.state(), crate::services::wake::WakeState::WakeRequested);
    assert_eq!(bus.bap_frames(), 0);

    manager.poll(&channel, &mut bus, &mut wake, at(15_000));
    manager.poll(&channel, &mut bus, &mut wake, at(15_001));
    assert_eq!(results.borrow().as_slice(), &[false]);
}

#[test]
/// A valid profile is still valid after a save and restore.
fn test_store_round_trip() {
    let events = Events::new();
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel =
        BatteryControlChannel::new(&state).with_profile_events(events.sender());
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut bus = RecordingBus::default();
    let mut wake = awake(&mut bus);
    let mut storage = MemoryStorage::default();

    assert_eq!(manager.restore(&mut storage), Ok(false));

    channel.process_message(&full_record_status(2, &vehicle_profile(85)), at(0));
    manager.poll(&channel, &mut bus, &mut wake, at(0));
    manager.persist(&mut storage).unwrap();
    assert_eq!(storage.image.len(), store::IMAGE_LEN);

    let restored_events = Events::new();
    let mut restored: ChargingProfileManager =
        ChargingProfileManager::new(restored_events.receiver());
    assert_eq!(restored.restore(&mut storage), Ok(true));
    assert_eq!(restored.profiles(), manager.profiles());
    let slot = restored.profile(2).unwrap();
    assert!(slot.valid);
    assert_eq!(slot.target_soc, 85);
    assert_eq!(slot.name.as_slice(), b"Night");
    assert!(!restored.profile(0).unwrap().valid);

    restored.reset_profiles();
    assert!(!restored.profile(2).unwrap().valid);
    assert_eq!(restored.profile(2).unwrap().target_soc, 80);
}

#[test]
/// Damaged images are refused and leave the cache alone.
fn test_store_rejects_damage() {
    let events = Events::new();
    let mut manager: ChargingProfileManager = ChargingProfileManager::new(events.receiver());
    let mut storage = MemoryStorage::default();
    manager.persist(&mut storage).unwrap();

    storage.image[10] ^= 0xFF;
    assert!(matches!(
        manager.restore(&mut storage),
        Err(StoreError::CrcMismatch { .. })
    ));

    storage.image[0] = 0;
    assert!(matches!(
        manager.restore(&mut storage),
        Err(StoreError::BadMagic { .. })
    ));

    storage.image.truncate(20);
    assert_eq!(
        manager.restore(&mut storage),
        Err(StoreError::Truncated {
            expected: store::IMAGE_LEN,
            got: 20
        })
    );
}
