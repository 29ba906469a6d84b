//! Control-context state machines: wake gate, command executor and the
//! profile update workflow.
pub mod commands;
pub mod profiles;
pub mod wake;
