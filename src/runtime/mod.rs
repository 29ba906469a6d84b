//! Glue between the two execution contexts.
//!
//! * [`receiver::BapReceiver`] runs in the high-priority receive context and
//!   only routes frames into channels and the shared state.
//! * [`control::ControlLoop`] runs in the cooperative control context and
//!   owns the wake, command and profile state machines.
//!
//! The two sides meet in [`crate::vehicle::SharedVehicleState`] and in the
//! profile event queue of the Battery Control channel.
pub mod control;
pub mod receiver;
