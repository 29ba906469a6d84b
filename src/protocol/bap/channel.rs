//! Device channel contract: one BAP endpoint (device id plus a TX/RX CAN id
//! pair) decoding the complete messages routed to it.
use embassy_time::Instant;

use super::BapMessage;

/// A BAP device endpoint registered with the router.
///
/// Methods take `&self`: a channel is shared between the receive context
/// (decode) and the control context (outbound requests), so mutable state
/// lives behind atomics or the shared vehicle state lock.
pub trait BapChannel {
    /// Logical BAP device (6 bits).
    fn device_id(&self) -> u8;
    /// Identifier this device sends commands on.
    fn tx_can_id(&self) -> u32;
    /// Identifier the vehicle broadcasts this device's state on.
    fn rx_can_id(&self) -> u32;
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Whether frames on `can_id` belong to this channel.
    fn handles_can_id(&self, can_id: u32) -> bool {
        can_id == self.rx_can_id()
    }

    /// Consume one complete message. Runs in the receive context and must
    /// stay bounded in time.
    fn process_message(&self, message: &BapMessage, now: Instant);
}
