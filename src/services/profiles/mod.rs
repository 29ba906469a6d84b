//! Vehicle profile cache and the read-modify-write update workflow.
//!
//! ```text
//! Idle -> ReadingProfile -> UpdatingProfile -> UpdateComplete -> Idle
//!              |                  |
//!              +------------------+--------> UpdateFailed   -> Idle
//! ```
//!
//! A read is skipped when the cached slot is already valid. The write carries
//! the whole record with the requested fields applied. The cache only ever
//! changes from records the vehicle sends, so a failed or cancelled update
//! leaves it as it was.
//!
//! Terminal states are visible for one [`ChargingProfileManager::poll`];
//! the next poll runs the callback and returns to `Idle`.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Duration, Instant};

use crate::error::StoreError;
use crate::protocol::battery_control::{BatteryControlChannel, DEFAULT_PROFILE_QUEUE};
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::retained::RetainedStorage;
use crate::services::commands::COMMAND_WAKE_TIMEOUT_MS;
use crate::services::wake::WakeController;

pub mod profile;
pub mod store;

use profile::{ChargingProfile, CompactProfile, ProfileEvent, ProfileFieldUpdate, PROFILE_COUNT};

pub const PROFILE_READ_TIMEOUT_MS: u64 = 5_000;
pub const PROFILE_UPDATE_TIMEOUT_MS: u64 = 5_000;

/// Queue of profile events produced by the Battery Control channel.
pub type ProfileEventReceiver<'a, const N: usize> =
    Receiver<'a, CriticalSectionRawMutex, ProfileEvent, N>;

/// Called once per accepted update with its success.
pub type UpdateCallback<'a> = &'a dyn Fn(bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTimings {
    /// Wait for the GET answer.
    pub read_timeout: Duration,
    /// Wait for the STATUS confirming the write.
    pub update_timeout: Duration,
    /// Wait for the bus before the request can be sent.
    pub wake_timeout: Duration,
}

impl Default for ProfileTimings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(PROFILE_READ_TIMEOUT_MS),
            update_timeout: Duration::from_millis(PROFILE_UPDATE_TIMEOUT_MS),
            wake_timeout: Duration::from_millis(COMMAND_WAKE_TIMEOUT_MS),
        }
    }
}

impl ProfileTimings {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    pub fn with_wake_timeout(mut self, timeout: Duration) -> Self {
        self.wake_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileUpdateState {
    Idle,
    ReadingProfile,
    UpdatingProfile,
    UpdateComplete,
    UpdateFailed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileStats {
    /// Updates confirmed by the vehicle.
    pub profile_update_count: u32,
    pub updates_failed: u32,
    pub updates_cancelled: u32,
    /// Records (full or compact) taken into the cache.
    pub records_received: u32,
    pub last_update_time: Option<Instant>,
}

#[derive(Clone, Copy)]
struct PendingUpdate<'a> {
    index: u8,
    fields: ProfileFieldUpdate,
    callback: UpdateCallback<'a>,
    request_sent: bool,
}

enum Workflow<'a> {
    Idle,
    Reading(PendingUpdate<'a>),
    Updating {
        pending: PendingUpdate<'a>,
        staged: ChargingProfile,
    },
    Complete(PendingUpdate<'a>),
    Failed(PendingUpdate<'a>),
}

pub struct ChargingProfileManager<'a, const N: usize = DEFAULT_PROFILE_QUEUE> {
    profiles: [ChargingProfile; PROFILE_COUNT],
    events: ProfileEventReceiver<'a, N>,
    workflow: Workflow<'a>,
    entered_at: Instant,
    timings: ProfileTimings,
    stats: ProfileStats,
}

impl<'a, const N: usize> ChargingProfileManager<'a, N> {
    pub fn new(events: ProfileEventReceiver<'a, N>) -> Self {
        Self {
            profiles: Default::default(),
            events,
            workflow: Workflow::Idle,
            entered_at: Instant::from_ticks(0),
            timings: ProfileTimings::default(),
            stats: ProfileStats::default(),
        }
    }

    pub fn with_timings(mut self, timings: ProfileTimings) -> Self {
        self.timings = timings;
        self
    }

    //==================================================================================Queries
    pub fn profile(&self, index: u8) -> Option<&ChargingProfile> {
        self.profiles.get(index as usize)
    }

    pub fn profiles(&self) -> &[ChargingProfile; PROFILE_COUNT] {
        &self.profiles
    }

    pub fn state(&self) -> ProfileUpdateState {
        match self.workflow {
            Workflow::Idle => ProfileUpdateState::Idle,
            Workflow::Reading(_) => ProfileUpdateState::ReadingProfile,
            Workflow::Updating { .. } => ProfileUpdateState::UpdatingProfile,
            Workflow::Complete(_) => ProfileUpdateState::UpdateComplete,
            Workflow::Failed(_) => ProfileUpdateState::UpdateFailed,
        }
    }

    pub fn is_update_in_progress(&self) -> bool {
        !matches!(self.workflow, Workflow::Idle)
    }

    pub fn stats(&self) -> ProfileStats {
        self.stats
    }

    //==================================================================================Persistence

    /// Replace the cache with a stored image. An empty store keeps the
    /// defaults. Returns whether an image was restored.
    pub fn restore<S: RetainedStorage>(
        &mut self,
        storage: &mut S,
    ) -> Result<bool, StoreError<S::Error>> {
        match store::load_profiles(storage)? {
            Some(profiles) => {
                self.profiles = profiles;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn persist<S: RetainedStorage>(&self, storage: &mut S) -> Result<(), StoreError<S::Error>> {
        store::save_profiles(storage, &self.profiles)
    }

    /// Drop everything learned from the vehicle.
    pub fn reset_profiles(&mut self) {
        self.profiles = Default::default();
    }

    //==================================================================================Workflow

    /// Start a read-modify-write of slot `index`. Refused while another
    /// update is in flight or when `index` is out of range.
    pub fn request_profile_update(
        &mut self,
        index: u8,
        fields: ProfileFieldUpdate,
        callback: UpdateCallback<'a>,
        now: Instant,
    ) -> bool {
        if self.is_update_in_progress() || index as usize >= PROFILE_COUNT {
            return false;
        }
        let pending = PendingUpdate {
            index,
            fields,
            callback,
            request_sent: false,
        };
        #[cfg(feature = "defmt")]
        defmt::info!("Profile {} update requested", index);
        if self.profiles[index as usize].valid {
            self.stage_write(pending, now);
        } else {
            self.enter(Workflow::Reading(pending), now);
        }
        true
    }

    /// Abort the in-flight update. The callback is told it failed.
    pub fn cancel_profile_update(&mut self, now: Instant) -> bool {
        let pending = match &self.workflow {
            Workflow::Idle => return false,
            Workflow::Reading(pending)
            | Workflow::Updating { pending, .. }
            | Workflow::Complete(pending)
            | Workflow::Failed(pending) => *pending,
        };
        self.stats.updates_cancelled += 1;
        self.enter(Workflow::Idle, now);
        (pending.callback)(false);
        true
    }

    /// Advance the workflow: finish a terminal state, take in vehicle
    /// records, check the deadline, then send whatever is due.
    pub fn poll<B: CanBus, const Q: usize>(
        &mut self,
        channel: &BatteryControlChannel<'_, Q>,
        bus: &mut B,
        wake: &mut WakeController,
        now: Instant,
    ) {
        self.finish_terminal(now);

        while let Ok(event) = self.events.try_receive() {
            self.apply_event(event, now);
        }

        if let Some(limit) = self.deadline() {
            if now.saturating_duration_since(self.entered_at) >= limit {
                #[cfg(feature = "defmt")]
                defmt::warn!("Profile update timed out in {}", self.state());
                self.fail(now);
            }
        }

        self.step(channel, bus, wake, now);
    }

    /// Every waiting state has exactly one deadline.
    fn deadline(&self) -> Option<Duration> {
        match &self.workflow {
            Workflow::Reading(pending) if pending.request_sent => Some(self.timings.read_timeout),
            Workflow::Updating { pending, .. } if pending.request_sent => {
                Some(self.timings.update_timeout)
            }
            Workflow::Reading(_) | Workflow::Updating { .. } => Some(self.timings.wake_timeout),
            _ => None,
        }
    }

    fn step<B: CanBus, const Q: usize>(
        &mut self,
        channel: &BatteryControlChannel<'_, Q>,
        bus: &mut B,
        wake: &mut WakeController,
        now: Instant,
    ) {
        if let Workflow::Reading(pending) = &self.workflow {
            let pending = *pending;
            if self.profiles[pending.index as usize].valid {
                self.stage_write(pending, now);
            } else if !pending.request_sent && wake.ensure_awake(now) {
                match channel.request_profiles(bus) {
                    Ok(_) => self.mark_sent(now),
                    Err(_err) => self.fail(now),
                }
            }
        }

        if let Workflow::Updating { pending, staged } = &self.workflow {
            if !pending.request_sent && wake.ensure_awake(now) {
                match channel.send_profile_record(bus, pending.index, staged) {
                    Ok(_) => self.mark_sent(now),
                    Err(_err) => self.fail(now),
                }
            }
        }
    }

    /// Copy the cached record, apply the requested fields, queue the write.
    fn stage_write(&mut self, pending: PendingUpdate<'a>, now: Instant) {
        let mut staged = self.profiles[pending.index as usize].clone();
        pending.fields.apply_to(&mut staged);
        let pending = PendingUpdate {
            request_sent: false,
            ..pending
        };
        self.enter(Workflow::Updating { pending, staged }, now);
    }

    fn apply_event(&mut self, event: ProfileEvent, now: Instant) {
        match event {
            ProfileEvent::Full { index, mut profile } => {
                let written = self
                    .awaiting_confirmation(index)
                    .is_some_and(|staged| staged.same_record(&profile));
                let Some(slot) = self.profiles.get_mut(index as usize) else {
                    return;
                };
                profile.valid = true;
                *slot = profile;
                self.stats.records_received += 1;
                if written {
                    self.confirm(now);
                }
            }
            ProfileEvent::Compact { index, record } => {
                let written = self
                    .awaiting_confirmation(index)
                    .is_some_and(|staged| CompactProfile::of(staged) == record);
                let Some(slot) = self.profiles.get_mut(index as usize) else {
                    return;
                };
                record.apply_to(slot);
                self.stats.records_received += 1;
                if written {
                    self.confirm(now);
                }
            }
            ProfileEvent::Rejected => {
                let waiting = match &self.workflow {
                    Workflow::Reading(pending) | Workflow::Updating { pending, .. } => {
                        pending.request_sent
                    }
                    _ => false,
                };
                if waiting {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Vehicle rejected profile request");
                    self.fail(now);
                }
            }
        }
    }

    /// The staged record when a write for `index` is out and unconfirmed.
    fn awaiting_confirmation(&self, index: u8) -> Option<&ChargingProfile> {
        match &self.workflow {
            Workflow::Updating { pending, staged }
                if pending.request_sent && pending.index == index =>
            {
                Some(staged)
            }
            _ => None,
        }
    }

    /// The vehicle echoed the staged record.
    fn confirm(&mut self, now: Instant) {
        let Workflow::Updating { pending, .. } = &self.workflow else {
            return;
        };
        let pending = *pending;
        self.stats.profile_update_count += 1;
        self.stats.last_update_time = Some(now);
        #[cfg(feature = "defmt")]
        defmt::info!("Profile {} updated", pending.index);
        self.enter(Workflow::Complete(pending), now);
    }

    fn fail(&mut self, now: Instant) {
        let pending = match &self.workflow {
            Workflow::Reading(pending) | Workflow::Updating { pending, .. } => *pending,
            _ => return,
        };
        self.stats.updates_failed += 1;
        self.enter(Workflow::Failed(pending), now);
    }

    fn mark_sent(&mut self, now: Instant) {
        match &mut self.workflow {
            Workflow::Reading(pending) | Workflow::Updating { pending, .. } => {
                pending.request_sent = true;
            }
            _ => return,
        }
        // deadline now counts from the request
        self.entered_at = now;
    }

    fn finish_terminal(&mut self, now: Instant) {
        let (pending, success) = match &self.workflow {
            Workflow::Complete(pending) => (*pending, true),
            Workflow::Failed(pending) => (*pending, false),
            _ => return,
        };
        self.enter(Workflow::Idle, now);
        (pending.callback)(success);
    }

    fn enter(&mut self, workflow: Workflow<'a>, now: Instant) {
        self.workflow = workflow;
        self.entered_at = now;
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
