//! CAN transport layer: frame representation, driver traits and the fixed
//! identifier map forming the wire contract with the vehicle.
//!
//! ## CAN identifier map
//!
//! | Purpose            | Identifier   | Format                      |
//! |--------------------|--------------|-----------------------------|
//! | Wake frame         | `0x17330301` | extended, 4-byte payload    |
//! | BAP init           | `0x1B000067` | extended, 8-byte payload    |
//! | Keep-alive         | `0x5A7`      | standard, 8 zero bytes      |
//! | Battery Control TX | `0x17332501` | extended, commands out      |
//! | Battery Control RX | `0x17332510` | extended, broadcasts in     |

pub mod can_frame;
pub mod traits;

/// Network-management frame waking the comfort bus.
pub const CAN_ID_WAKE: u32 = 0x1733_0301;
/// Payload of the wake frame.
pub const WAKE_PAYLOAD: [u8; 4] = [0x40, 0x00, 0x01, 0x1F];

/// Announcement asking vehicle-side BAP devices to initialize.
pub const CAN_ID_BAP_INIT: u32 = 0x1B00_0067;
/// Payload of the BAP init frame.
pub const BAP_INIT_PAYLOAD: [u8; 8] = [0x67, 0x10, 0x41, 0x84, 0x14, 0x00, 0x00, 0x00];

/// Keep-alive heartbeat (11-bit identifier).
pub const CAN_ID_KEEPALIVE: u16 = 0x5A7;
/// Payload of the keep-alive frame.
pub const KEEPALIVE_PAYLOAD: [u8; 8] = [0; 8];

/// Battery Control: commands from this device.
pub const CAN_ID_BATTERY_TX: u32 = 0x1733_2501;
/// Battery Control: broadcasts from the vehicle.
pub const CAN_ID_BATTERY_RX: u32 = 0x1733_2510;
