//! Abstraction traits used by the stack (CAN bus, BAP sender, clock,
//! retained storage).
pub mod bap_sender;
pub mod can_bus;
pub mod clock;
pub mod retained;
