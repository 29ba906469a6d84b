//! Payload codecs: bit cursors and the trait implemented by every typed
//! BAP payload.
pub mod bits;
pub mod traits;
