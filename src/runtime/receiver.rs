//! Receive context: everything a raw frame goes through between the driver
//! and the shared vehicle state.
//!
//! [`BapReceiver::on_can_frame`] is bounded in time. It never blocks and
//! takes the vehicle-state lock only for short copies. [`BapReceiver::drive`]
//! is the task body for firmware that runs the receive path on its own
//! executor.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::error::DriveError;
use crate::protocol::bap::assembler::DEFAULT_MAX_PENDING;
use crate::protocol::bap::router::BapChannelRouter;
use crate::protocol::transport::traits::can_bus::CanReceiver;
use crate::protocol::transport::traits::clock::Clock;
use crate::vehicle::{BapDiagnostics, SharedVehicleState};

/// Request to drop every half-received long message (bus-off recovery,
/// driver restart).
pub type ResetSignal = Signal<CriticalSectionRawMutex, ()>;

pub struct BapReceiver<'a, const K: usize = DEFAULT_MAX_PENDING> {
    router: BapChannelRouter<'a, K>,
    state: &'a SharedVehicleState,
}

impl<'a, const K: usize> BapReceiver<'a, K> {
    /// `router` must already hold every channel.
    pub fn new(router: BapChannelRouter<'a, K>, state: &'a SharedVehicleState) -> Self {
        Self { router, state }
    }

    pub fn router(&self) -> &BapChannelRouter<'a, K> {
        &self.router
    }

    /// Ingest one frame. Any frame counts as bus activity; only extended
    /// identifiers can carry BAP. Returns whether a channel claimed it.
    pub fn on_can_frame(&mut self, can_id: u32, data: &[u8], extended: bool, now: Instant) -> bool {
        let routed = extended && self.router.process_frame(can_id, data, now);

        let diagnostics = BapDiagnostics {
            router: self.router.stats(),
            assembler: self.router.assembler().stats(),
            pending_count: self.router.assembler().pending_count(),
        };
        self.state.lock(|state| {
            state.record_can_activity(now);
            state.diagnostics = diagnostics;
        });
        routed
    }

    /// Drop in-flight reassemblies.
    pub fn reset(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::debug!("BAP receiver reset");
        self.router.reset();
    }

    /// Receive loop. Runs until the driver reports an error.
    ///
    /// # Errors
    ///
    /// - [`DriveError::Receive`] with the driver error that ended the loop
    pub async fn drive<R: CanReceiver, C: Clock>(
        &mut self,
        receiver: &mut R,
        clock: &C,
        reset: &ResetSignal,
    ) -> Result<(), DriveError<R::Error>> {
        loop {
            let frame = {
                let recv = receiver.recv();
                let reset_requested = reset.wait();
                pin_mut!(recv);
                pin_mut!(reset_requested);

                match select(recv, reset_requested).await {
                    Either::Left((result, _)) => Some(result.map_err(DriveError::Receive)?),
                    Either::Right(((), _)) => None,
                }
            };

            match frame {
                Some(frame) => {
                    self.on_can_frame(frame.id, frame.payload(), frame.extended, clock.now());
                }
                None => self.reset(),
            }
        }
    }
}
