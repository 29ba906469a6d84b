//! `korri-bap` library: the BAP stack of a telematics unit talking to the
//! vehicle over CAN, in a `no_std` environment. The crate exposes the
//! infrastructure modules (bit codec), protocol logic (framing, routing,
//! Battery Control device), the control-context services (wake gate,
//! commands, charging profiles) and the glue between the receive and
//! control contexts.
#![no_std]
//==================================================================================
/// Core data types shared by the codecs and the vehicle state.
pub mod core;
/// Domain and low-level errors (framing, decoding, routing, persistence).
pub mod error;
/// Bit-level codec used by every payload structure.
pub mod infra;
/// BAP protocol implementation: CAN transport, framing, routing and the
/// Battery Control device.
pub mod protocol;
/// Receive and control context glue.
pub mod runtime;
/// Wake gate, command executor and charging profile workflow.
pub mod services;
/// Vehicle state aggregate shared between the two contexts.
pub mod vehicle;
//==================================================================================
