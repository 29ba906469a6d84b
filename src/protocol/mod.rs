//! High-level components of the BAP stack: CAN transport, BAP framing and
//! routing, and the Battery Control device channel.
pub mod bap;
pub mod battery_control;
pub mod transport;
