//! Shared primitive types and the crate error taxonomy.

/// Frame, rate and pixel-buffer primitives.
pub mod core;
/// Error taxonomy and crate result alias.
pub mod error;
