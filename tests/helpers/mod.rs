/// Test doubles for the CAN driver and retained storage used by the
/// integration tests.
use korri_bap::protocol::bap::builder::BapFrameBuilder;
use korri_bap::protocol::bap::{BapHeader, OpCode};
use korri_bap::protocol::battery_control::DEVICE_ID;
use korri_bap::protocol::transport::{
    can_frame::CanFrame,
    traits::{can_bus::CanBus, can_bus::CanReceiver, retained::RetainedStorage},
    CAN_ID_BATTERY_RX,
};
use std::future::Future;
use tokio::sync::mpsc;

#[derive(Default)]
#[allow(dead_code)]
/// Recording CAN egress. Frames whose id is listed in `refuse` fail to send.
pub struct MockCanBus {
    pub sent: Vec<CanFrame>,
    pub refuse: Vec<u32>,
}

#[allow(dead_code)]
impl MockCanBus {
    pub fn ids(&self) -> Vec<u32> {
        self.sent.iter().map(|frame| frame.id).collect()
    }

    pub fn with_id(&self, id: u32) -> Vec<CanFrame> {
        self.sent.iter().filter(|frame| frame.id == id).copied().collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        if self.refuse.contains(&frame.id) {
            return Err(());
        }
        self.sent.push(*frame);
        Ok(())
    }
}

#[allow(dead_code)]
/// Async ingress fed by a tokio channel. Dropping every sender ends the
/// stream with an error, like a driver shutting down.
pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<CanFrame>,
}

#[allow(dead_code)]
impl MockReceiver {
    pub fn create() -> (Self, mpsc::UnboundedSender<CanFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }
}

impl CanReceiver for MockReceiver {
    type Error = ();

    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'a {
        async move { self.rx.recv().await.ok_or(()) }
    }
}

#[derive(Default)]
#[allow(dead_code)]
/// Retained memory living as long as the test.
pub struct MemoryStorage {
    pub image: Vec<u8>,
    pub fail_writes: bool,
}

impl RetainedStorage for MemoryStorage {
    type Error = &'static str;

    fn load(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = self.image.len().min(buf.len());
        buf[..len].copy_from_slice(&self.image[..len]);
        Ok(len)
    }

    fn store(&mut self, image: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err("write protected");
        }
        self.image = image.to_vec();
        Ok(())
    }
}

#[allow(dead_code)]
/// Frames the vehicle broadcasts on the Battery Control RX id for one
/// message.
pub fn vehicle_frames(opcode: OpCode, function_id: u8, payload: &[u8]) -> Vec<CanFrame> {
    let header = BapHeader::new(opcode, DEVICE_ID, function_id);
    BapFrameBuilder::new(CAN_ID_BATTERY_RX, header, payload)
        .expect("payload fits a BAP message")
        .build()
        .collect()
}
