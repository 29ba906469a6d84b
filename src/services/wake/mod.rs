//! Wake and keep-alive gate in front of every outbound BAP command.
//!
//! ```text
//! Asleep --request_wake--> WakeRequested --frames sent--> Waking
//!   ^  ^                        |                           |  bus activity
//!   |  +------ send failure ----+                           |  + settle
//!   |  +------ wake timeout --------------------------------+
//!   |                                                       v
//!   +------------------ bus silent ---------------------- Awake
//! ```
//!
//! Bus activity seen while `Asleep` (the vehicle woke on its own) moves
//! straight to `Awake` without starting the keep-alive. The keep-alive runs
//! while commands keep arriving and stops by itself after a long quiet
//! period, independently of the wake state.
//!
//! All frames go out from [`WakeController::tick`], called by the control
//! context; nothing here runs in the receive context.
use embassy_time::{Duration, Instant};

use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::{
    BAP_INIT_PAYLOAD, CAN_ID_BAP_INIT, CAN_ID_KEEPALIVE, CAN_ID_WAKE, KEEPALIVE_PAYLOAD,
    WAKE_PAYLOAD,
};

pub const KEEPALIVE_INTERVAL_MS: u64 = 500;
/// Keep-alive stops after this long without command activity.
pub const KEEPALIVE_TIMEOUT_MS: u64 = 300_000;
/// Delay between first bus activity and `Awake`, for the vehicle BAP stack.
pub const BAP_INIT_SETTLE_MS: u64 = 2_000;
pub const WAKE_TIMEOUT_MS: u64 = 10_000;

/// Timing knobs of the wake sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTimings {
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub init_settle: Duration,
    pub wake_timeout: Duration,
}

impl Default for WakeTimings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_millis(KEEPALIVE_INTERVAL_MS),
            keepalive_timeout: Duration::from_millis(KEEPALIVE_TIMEOUT_MS),
            init_settle: Duration::from_millis(BAP_INIT_SETTLE_MS),
            wake_timeout: Duration::from_millis(WAKE_TIMEOUT_MS),
        }
    }
}

impl WakeTimings {
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    pub fn with_init_settle(mut self, settle: Duration) -> Self {
        self.init_settle = settle;
        self
    }

    pub fn with_wake_timeout(mut self, timeout: Duration) -> Self {
        self.wake_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeState {
    Asleep,
    /// Wake sequence queued for the next tick.
    WakeRequested,
    /// Frames sent. `settle_from` is set once bus activity is seen.
    Waking { settle_from: Option<Instant> },
    Awake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeepAlive {
    Stopped,
    Running { last_sent: Option<Instant> },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeStats {
    pub wake_attempts: u32,
    /// Sequences abandoned on send failure or wake timeout.
    pub wake_failed: u32,
    pub keep_alives_sent: u32,
    pub keep_alive_send_failures: u32,
    /// Times the keep-alive stopped for lack of command activity.
    pub keep_alive_expired: u32,
}

pub struct WakeController {
    state: WakeState,
    entered_at: Instant,
    keep_alive: KeepAlive,
    last_command_activity: Option<Instant>,
    timings: WakeTimings,
    stats: WakeStats,
}

impl Default for WakeController {
    fn default() -> Self {
        Self::new(WakeTimings::default())
    }
}

impl WakeController {
    pub fn new(timings: WakeTimings) -> Self {
        Self {
            state: WakeState::Asleep,
            entered_at: Instant::from_ticks(0),
            keep_alive: KeepAlive::Stopped,
            last_command_activity: None,
            timings,
            stats: WakeStats::default(),
        }
    }

    //==================================================================================Queries
    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn is_awake(&self) -> bool {
        self.state == WakeState::Awake
    }

    pub fn is_keep_alive_active(&self) -> bool {
        matches!(self.keep_alive, KeepAlive::Running { .. })
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    pub fn stats(&self) -> WakeStats {
        self.stats
    }

    pub fn timings(&self) -> WakeTimings {
        self.timings
    }

    //==================================================================================Requests

    /// Queue a wake sequence. Refused unless `Asleep`, so at most one
    /// sequence is ever in flight.
    pub fn request_wake(&mut self, now: Instant) -> bool {
        if self.state != WakeState::Asleep {
            return false;
        }
        self.stats.wake_attempts += 1;
        self.last_command_activity = Some(now);
        self.enter(WakeState::WakeRequested, now);
        true
    }

    /// Reset the keep-alive idle timer. Restarts the keep-alive when it had
    /// lapsed while the bus is still awake.
    pub fn notify_command_activity(&mut self, now: Instant) {
        self.last_command_activity = Some(now);
        if self.state == WakeState::Awake && self.keep_alive == KeepAlive::Stopped {
            #[cfg(feature = "defmt")]
            defmt::debug!("Keep-alive restarted on command activity");
            self.keep_alive = KeepAlive::Running { last_sent: None };
        }
    }

    /// Entry point for anything about to transmit: records command activity
    /// and requests a wake when asleep. Returns whether the bus is usable now.
    pub fn ensure_awake(&mut self, now: Instant) -> bool {
        self.notify_command_activity(now);
        if self.state == WakeState::Asleep {
            self.request_wake(now);
        }
        self.is_awake()
    }

    /// Stop the keep-alive and forget the bus, ahead of deep sleep.
    pub fn go_to_sleep(&mut self, now: Instant) {
        self.keep_alive = KeepAlive::Stopped;
        self.enter(WakeState::Asleep, now);
    }

    //==================================================================================Tick

    /// Advance the state machine. `bus_active` tells whether any frame was
    /// received recently.
    pub fn tick<B: CanBus>(&mut self, bus: &mut B, now: Instant, bus_active: bool) {
        match self.state {
            WakeState::Asleep if bus_active => {
                #[cfg(feature = "defmt")]
                defmt::info!("Vehicle bus woke on its own");
                self.enter(WakeState::Awake, now);
            }
            WakeState::WakeRequested => self.run_wake_sequence(bus, now),
            WakeState::Waking { settle_from: None } if bus_active => {
                self.state = WakeState::Waking {
                    settle_from: Some(now),
                };
            }
            WakeState::Waking {
                settle_from: Some(from),
            } if now.saturating_duration_since(from) >= self.timings.init_settle => {
                #[cfg(feature = "defmt")]
                defmt::info!("Vehicle awake");
                self.enter(WakeState::Awake, now);
            }
            WakeState::Awake if !bus_active => {
                #[cfg(feature = "defmt")]
                defmt::info!("Vehicle bus went silent");
                self.keep_alive = KeepAlive::Stopped;
                self.enter(WakeState::Asleep, now);
            }
            _ => {}
        }

        if self.timed_out(now) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Wake timeout, no bus activity");
            self.abandon_wake(now);
        }

        self.service_keep_alive(bus, now);
    }

    /// The only waiting state with a deadline.
    fn timed_out(&self, now: Instant) -> bool {
        match self.state {
            WakeState::Waking { settle_from: None } => {
                self.time_in_state(now) >= self.timings.wake_timeout
            }
            _ => false,
        }
    }

    fn enter(&mut self, state: WakeState, now: Instant) {
        self.state = state;
        self.entered_at = now;
    }

    fn abandon_wake(&mut self, now: Instant) {
        self.stats.wake_failed += 1;
        self.keep_alive = KeepAlive::Stopped;
        self.enter(WakeState::Asleep, now);
    }

    fn run_wake_sequence<B: CanBus>(&mut self, bus: &mut B, now: Instant) {
        match self.send_wake_frames(bus, now) {
            Ok(()) => self.enter(WakeState::Waking { settle_from: None }, now),
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Wake sequence send failed: {}", defmt::Debug2Format(&_err));
                self.abandon_wake(now);
            }
        }
    }

    fn send_wake_frames<B: CanBus>(&mut self, bus: &mut B, now: Instant) -> Result<(), B::Error> {
        bus.send(&CanFrame::new_extended(CAN_ID_WAKE, &WAKE_PAYLOAD))?;
        self.keep_alive = KeepAlive::Running { last_sent: None };
        self.send_keep_alive(bus, now)?;
        bus.send(&CanFrame::new_extended(CAN_ID_BAP_INIT, &BAP_INIT_PAYLOAD))?;
        Ok(())
    }

    fn service_keep_alive<B: CanBus>(&mut self, bus: &mut B, now: Instant) {
        let KeepAlive::Running { last_sent } = self.keep_alive else {
            return;
        };

        let idle = self
            .last_command_activity
            .map(|at| now.saturating_duration_since(at));
        if idle.is_some_and(|idle| idle >= self.timings.keepalive_timeout) {
            #[cfg(feature = "defmt")]
            defmt::info!("Keep-alive stopped, no command activity");
            self.stats.keep_alive_expired += 1;
            self.keep_alive = KeepAlive::Stopped;
            return;
        }

        let due = last_sent
            .map_or(true, |at| now.saturating_duration_since(at) >= self.timings.keepalive_interval);
        if due {
            // counted in send_keep_alive, next attempt on the next interval
            let _ = self.send_keep_alive(bus, now);
        }
    }

    fn send_keep_alive<B: CanBus>(&mut self, bus: &mut B, now: Instant) -> Result<(), B::Error> {
        self.keep_alive = KeepAlive::Running {
            last_sent: Some(now),
        };
        match bus.send(&CanFrame::new_standard(CAN_ID_KEEPALIVE, &KEEPALIVE_PAYLOAD)) {
            Ok(()) => {
                self.stats.keep_alives_sent += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.keep_alive_send_failures += 1;
                Err(err)
            }
        }
    }
}
