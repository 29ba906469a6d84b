//! `CanBus` extension sending a whole BAP message: encodes the header, picks
//! short or long framing and transmits the frames in order.
use crate::{
    error::BapSendError,
    protocol::bap::{builder::BapFrameBuilder, BapHeader},
    protocol::transport::traits::can_bus::CanBus,
};

/// Trait extending `CanBus` with a BAP-level send.
pub trait BapSender: CanBus {
    /// Encode and transmit one message to `can_id`.
    ///
    /// Stops at the first frame the bus refuses; the remaining frames are not
    /// sent and nothing is retried. Returns the number of frames sent.
    ///
    /// # Errors
    ///
    /// - [`BapSendError::Encode`] when the header or payload cannot be framed
    /// - [`BapSendError::Send`] when the bus rejects a frame
    fn send_bap(
        &mut self,
        can_id: u32,
        header: BapHeader,
        payload: &[u8],
    ) -> Result<usize, BapSendError<Self::Error>>;
}

impl<C: CanBus> BapSender for C {
    fn send_bap(
        &mut self,
        can_id: u32,
        header: BapHeader,
        payload: &[u8],
    ) -> Result<usize, BapSendError<Self::Error>> {
        let builder = BapFrameBuilder::new(can_id, header, payload)?;
        let mut sent = 0;
        for frame in builder.build() {
            self.send(&frame).map_err(BapSendError::Send)?;
            sent += 1;
        }
        Ok(sent)
    }
}
