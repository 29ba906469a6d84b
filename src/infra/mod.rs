//! Infrastructure shared by the protocol layers: payload codecs.
pub mod codec;
