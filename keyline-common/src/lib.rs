// keyline-common - Shared configuration surface and value codecs for Keyline
//
// This crate defines the store properties loaded at process start and the
// codecs used to turn façade values into stored bytes.

pub mod codec;
pub mod error;
pub mod properties;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use properties::*;
