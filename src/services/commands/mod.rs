//! Start/stop commands for charging and climate, held until the vehicle bus
//! is awake.
//!
//! One command may be pending at a time. Each [`CommandExecutor::tick`]
//! goes through [`WakeController::ensure_awake`]; the command is sent on the
//! first tick that finds the bus awake, or dropped with
//! [`CommandResult::WakeTimeout`] once the wake budget is spent.
use embassy_time::{Duration, Instant};

use crate::protocol::battery_control::BatteryControlChannel;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::services::wake::WakeController;

/// A command waits this long for the bus before it is dropped.
pub const COMMAND_WAKE_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VehicleCommand {
    StartCharging { target_soc: u8, max_current: u8 },
    StopCharging,
    /// `temperature` in °C.
    StartClimate { temperature: f32, allow_battery: bool },
    StopClimate,
    StartChargingAndClimate {
        target_soc: u8,
        max_current: u8,
        temperature: f32,
        allow_battery: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandResult {
    /// All frames of the command were accepted by the bus.
    Sent,
    /// The bus refused a frame. Not retried.
    SendFailed,
    /// The vehicle did not wake in time.
    WakeTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandOutcome {
    pub command: VehicleCommand,
    pub result: CommandResult,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStats {
    pub commands_sent: u32,
    pub commands_failed: u32,
    pub wake_timeouts: u32,
    /// Submissions refused because another command was pending.
    pub commands_rejected: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CommandState {
    Idle,
    WaitingForBus(VehicleCommand),
}

pub struct CommandExecutor {
    state: CommandState,
    entered_at: Instant,
    wake_timeout: Duration,
    stats: CommandStats,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            state: CommandState::Idle,
            entered_at: Instant::from_ticks(0),
            wake_timeout: Duration::from_millis(COMMAND_WAKE_TIMEOUT_MS),
            stats: CommandStats::default(),
        }
    }

    pub fn with_wake_timeout(mut self, timeout: Duration) -> Self {
        self.wake_timeout = timeout;
        self
    }

    /// Queue `command`. Refused while another one is pending.
    pub fn submit(&mut self, command: VehicleCommand, now: Instant) -> bool {
        if self.is_pending() {
            self.stats.commands_rejected += 1;
            return false;
        }
        self.state = CommandState::WaitingForBus(command);
        self.entered_at = now;
        true
    }

    pub fn start_charging(&mut self, target_soc: u8, max_current: u8, now: Instant) -> bool {
        self.submit(
            VehicleCommand::StartCharging {
                target_soc,
                max_current,
            },
            now,
        )
    }

    pub fn stop_charging(&mut self, now: Instant) -> bool {
        self.submit(VehicleCommand::StopCharging, now)
    }

    pub fn start_climate(&mut self, temperature: f32, allow_battery: bool, now: Instant) -> bool {
        self.submit(
            VehicleCommand::StartClimate {
                temperature,
                allow_battery,
            },
            now,
        )
    }

    pub fn stop_climate(&mut self, now: Instant) -> bool {
        self.submit(VehicleCommand::StopClimate, now)
    }

    pub fn is_pending(&self) -> bool {
        self.state != CommandState::Idle
    }

    pub fn pending(&self) -> Option<VehicleCommand> {
        match self.state {
            CommandState::WaitingForBus(command) => Some(command),
            CommandState::Idle => None,
        }
    }

    pub fn stats(&self) -> CommandStats {
        self.stats
    }

    /// Drop the pending command without sending it.
    pub fn cancel(&mut self) -> Option<VehicleCommand> {
        let pending = self.pending();
        self.state = CommandState::Idle;
        pending
    }

    /// Send the pending command once the bus is awake. Returns the outcome
    /// when the command leaves the queue.
    pub fn tick<B: CanBus, const Q: usize>(
        &mut self,
        channel: &BatteryControlChannel<'_, Q>,
        bus: &mut B,
        wake: &mut WakeController,
        now: Instant,
    ) -> Option<CommandOutcome> {
        let CommandState::WaitingForBus(command) = self.state else {
            return None;
        };

        let result = if wake.ensure_awake(now) {
            let result = Self::execute(channel, bus, command);
            match result {
                CommandResult::Sent => self.stats.commands_sent += 1,
                _ => self.stats.commands_failed += 1,
            }
            result
        } else if now.saturating_duration_since(self.entered_at) >= self.wake_timeout {
            #[cfg(feature = "defmt")]
            defmt::warn!("Command dropped, vehicle did not wake");
            self.stats.wake_timeouts += 1;
            CommandResult::WakeTimeout
        } else {
            return None;
        };

        self.state = CommandState::Idle;
        self.entered_at = now;
        Some(CommandOutcome { command, result })
    }

    fn execute<B: CanBus, const Q: usize>(
        channel: &BatteryControlChannel<'_, Q>,
        bus: &mut B,
        command: VehicleCommand,
    ) -> CommandResult {
        let sent = match command {
            VehicleCommand::StartCharging {
                target_soc,
                max_current,
            } => channel.start_charging(bus, target_soc, max_current).is_ok(),
            VehicleCommand::StopCharging => channel.stop_charging(bus).is_ok(),
            VehicleCommand::StartClimate {
                temperature,
                allow_battery,
            } => channel.start_climate(bus, temperature, allow_battery).is_ok(),
            VehicleCommand::StopClimate => channel.stop_climate(bus).is_ok(),
            VehicleCommand::StartChargingAndClimate {
                target_soc,
                max_current,
                temperature,
                allow_battery,
            } => {
                channel.start_charging(bus, target_soc, max_current).is_ok()
                    && channel.start_climate(bus, temperature, allow_battery).is_ok()
            }
        };
        if sent {
            CommandResult::Sent
        } else {
            CommandResult::SendFailed
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
