//! Time source abstraction. State machines take `now` explicitly; firmware
//! feeds them from a [`Clock`].
use embassy_time::Instant;

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by the embassy time driver linked into the firmware.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
