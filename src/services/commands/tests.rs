use super::*;
use crate::protocol::battery_control::function;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::CAN_ID_BATTERY_TX;
use crate::vehicle::SharedVehicleState;

#[derive(Default)]
struct RecordingBus {
    frames: heapless::Vec<CanFrame, 64>,
    refuse_bap: bool,
}

impl RecordingBus {
    fn bap_frames(&self) -> impl Iterator<Item = &CanFrame> {
        self.frames.iter().filter(|f| f.id == CAN_ID_BATTERY_TX)
    }
}

impl CanBus for RecordingBus {
    type Error = ();

    fn send(&mut self, frame: &CanFrame) -> Result<(), ()> {
        if self.refuse_bap && frame.id == CAN_ID_BATTERY_TX {
            return Err(());
        }
        self.frames.push(*frame).map_err(|_| ())
    }
}

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// Wake controller that already sees an active bus.
fn awake_controller(bus: &mut RecordingBus) -> WakeController {
    let mut wake = WakeController::default();
    wake.tick(bus, at(0), true);
    wake
}

#[test]
/// With the bus awake the command goes out on the next tick.
fn test_sent_when_awake() {
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel = BatteryControlChannel::new(&state);
    let mut bus = RecordingBus::default();
    let mut wake = awake_controller(&mut bus);
    let mut commands = CommandExecutor::new();

    assert!(commands.start_charging(80, 16, at(10)));
    let outcome = commands.tick(&channel, &mut bus, &mut wake, at(10)).unwrap();

    assert_eq!(outcome.result, CommandResult::Sent);
    assert!(!commands.is_pending());
    let frame = bus.bap_frames().next().unwrap();
    assert_eq!(frame.data[1] & 0x3F, function::START_STOP_CHARGE);
    assert_eq!(&frame.payload()[2..], &[0x01, 80, 16]);
    assert_eq!(commands.stats().commands_sent, 1);
}

#[test]
/// While asleep the command waits for the wake sequence to finish.
fn test_waits_for_wake() {
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel = BatteryControlChannel::new(&state);
    let mut bus = RecordingBus::default();
    let mut wake = WakeController::default();
    let mut commands = CommandExecutor::new();

    commands.stop_climate(at(0));
    assert_eq!(commands.tick(&channel, &mut bus, &mut wake, at(0)), None);
    assert_eq!(wake.state(), crate::services::wake::WakeState::WakeRequested);

    wake.tick(&mut bus, at(0), false);
    wake.tick(&mut bus, at(1_000), true);
    assert_eq!(commands.tick(&channel, &mut bus, &mut wake, at(1_000)), None);
    wake.tick(&mut bus, at(3_000), true);

    let outcome = commands.tick(&channel, &mut bus, &mut wake, at(3_000)).unwrap();
    assert_eq!(outcome.command, VehicleCommand::StopClimate);
    assert_eq!(outcome.result, CommandResult::Sent);
    assert_eq!(bus.bap_frames().count(), 1);
}

#[test]
/// A vehicle that never wakes drops the command after the budget.
fn test_wake_timeout_drops_command() {
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel = BatteryControlChannel::new(&state);
    let mut bus = RecordingBus::default();
    let mut wake = WakeController::default();
    let mut commands = CommandExecutor::new();

    commands.stop_charging(at(0));
    assert_eq!(commands.tick(&channel, &mut bus, &mut wake, at(14_999)), None);
    let outcome = commands.tick(&channel, &mut bus, &mut wake, at(15_000)).unwrap();

    assert_eq!(outcome.result, CommandResult::WakeTimeout);
    assert_eq!(commands.stats().wake_timeouts, 1);
    assert_eq!(bus.bap_frames().count(), 0);
}

#[test]
/// One command at a time.
fn test_single_pending_command() {
    let mut commands = CommandExecutor::new();
    assert!(commands.start_climate(21.0, false, at(0)));
    assert!(!commands.stop_climate(at(1)));
    assert_eq!(commands.stats().commands_rejected, 1);
    assert!(matches!(
        commands.cancel(),
        Some(VehicleCommand::StartClimate { .. })
    ));
    assert!(commands.stop_climate(at(2)));
}

#[test]
/// The combined command sends the charge request, then the climate request.
fn test_charging_and_climate() {
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel = BatteryControlChannel::new(&state);
    let mut bus = RecordingBus::default();
    let mut wake = awake_controller(&mut bus);
    let mut commands = CommandExecutor::new();

    commands.submit(
        VehicleCommand::StartChargingAndClimate {
            target_soc: 90,
            max_current: 32,
            temperature: 20.0,
            allow_battery: true,
        },
        at(0),
    );
    let outcome = commands.tick(&channel, &mut bus, &mut wake, at(0)).unwrap();

    assert_eq!(outcome.result, CommandResult::Sent);
    let functions: heapless::Vec<u8, 4> =
        bus.bap_frames().map(|frame| frame.data[1] & 0x3F).collect();
    assert_eq!(
        functions.as_slice(),
        &[function::START_STOP_CHARGE, function::START_STOP_CLIMATE]
    );
    assert_eq!(commands.stats().commands_sent, 1);
}

#[test]
/// A refused frame fails the command; the combined command stops at the
/// first refusal.
fn test_send_failure() {
    let state = SharedVehicleState::new();
    let channel: BatteryControlChannel = BatteryControlChannel::new(&state);
    let mut bus = RecordingBus::default();
    let mut wake = awake_controller(&mut bus);
    bus.refuse_bap = true;
    let mut commands = CommandExecutor::new();

    commands.submit(
        VehicleCommand::StartChargingAndClimate {
            target_soc: 90,
            max_current: 32,
            temperature: 20.0,
            allow_battery: true,
        },
        at(0),
    );
    let outcome = commands.tick(&channel, &mut bus, &mut wake, at(0)).unwrap();
    assert_eq!(outcome.result, CommandResult::SendFailed);
    assert_eq!(commands.stats().commands_failed, 1);
    assert!(!commands.is_pending());
}
