//! Minimal abstraction over the CAN driver. Egress is synchronous so that a
//! failed transmission (timeout, NACK, bus-off) is reported to the caller on
//! the spot; ingress is asynchronous to fit a dedicated receive task.
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Frame egress used by the control context.
pub trait CanBus {
    type Error: core::fmt::Debug;
    /// Queue a frame for transmission. Implementations bound the wait
    /// internally; this stack never retries a failed send.
    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;
}

impl<B: CanBus + ?Sized> CanBus for &mut B {
    type Error = B::Error;

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        (**self).send(frame)
    }
}

/// Frame ingress used by the receive context.
pub trait CanReceiver {
    type Error: core::fmt::Debug;
    /// Wait for the next frame from the driver.
    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'a;
}
