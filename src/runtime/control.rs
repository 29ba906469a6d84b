//! Control context: the cooperative loop owning every outbound state machine.
//!
//! All transmissions (wake, keep-alive, commands, profile requests) leave
//! from [`ControlLoop::tick`]. Vehicle state is only read here, through
//! short copies.
use embassy_time::Instant;

use crate::error::StoreError;
use crate::protocol::battery_control::{BatteryControlChannel, DEFAULT_PROFILE_QUEUE};
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::retained::RetainedStorage;
use crate::services::commands::{CommandExecutor, CommandOutcome};
use crate::services::profiles::ChargingProfileManager;
use crate::services::wake::WakeController;
use crate::vehicle::{SharedVehicleState, VehicleState};

pub struct ControlLoop<'a, const Q: usize = DEFAULT_PROFILE_QUEUE> {
    channel: &'a BatteryControlChannel<'a, Q>,
    state: &'a SharedVehicleState,
    wake: WakeController,
    commands: CommandExecutor,
    profiles: ChargingProfileManager<'a, Q>,
}

impl<'a, const Q: usize> ControlLoop<'a, Q> {
    pub fn new(
        channel: &'a BatteryControlChannel<'a, Q>,
        state: &'a SharedVehicleState,
        wake: WakeController,
        commands: CommandExecutor,
        profiles: ChargingProfileManager<'a, Q>,
    ) -> Self {
        Self {
            channel,
            state,
            wake,
            commands,
            profiles,
        }
    }

    pub fn channel(&self) -> &'a BatteryControlChannel<'a, Q> {
        self.channel
    }

    pub fn wake(&self) -> &WakeController {
        &self.wake
    }

    pub fn wake_mut(&mut self) -> &mut WakeController {
        &mut self.wake
    }

    pub fn commands(&self) -> &CommandExecutor {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandExecutor {
        &mut self.commands
    }

    pub fn profiles(&self) -> &ChargingProfileManager<'a, Q> {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut ChargingProfileManager<'a, Q> {
        &mut self.profiles
    }

    /// Copy of the shared vehicle state.
    pub fn vehicle(&self) -> VehicleState {
        self.state.snapshot()
    }

    /// One pass of the loop: wake gate, then the pending command, then the
    /// profile workflow. Returns the command outcome when one completed.
    pub fn tick<B: CanBus>(&mut self, bus: &mut B, now: Instant) -> Option<CommandOutcome> {
        let bus_active = self.state.is_bus_active(now);
        self.wake.tick(bus, now, bus_active);
        let outcome = self.commands.tick(self.channel, bus, &mut self.wake, now);
        self.profiles.poll(self.channel, bus, &mut self.wake, now);
        outcome
    }

    /// Load the profile cache saved before the last sleep.
    pub fn restore<S: RetainedStorage>(
        &mut self,
        storage: &mut S,
    ) -> Result<bool, StoreError<S::Error>> {
        self.profiles.restore(storage)
    }

    /// Save the profile cache and let the bus fall asleep.
    ///
    /// A pending command is dropped. The wake controller goes back to
    /// `Asleep` even when the save fails.
    pub fn prepare_for_sleep<S: RetainedStorage>(
        &mut self,
        storage: &mut S,
        now: Instant,
    ) -> Result<(), StoreError<S::Error>> {
        if let Some(_command) = self.commands.cancel() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Pending command dropped before sleep");
        }
        self.wake.go_to_sleep(now);
        self.profiles.persist(storage)
    }
}
