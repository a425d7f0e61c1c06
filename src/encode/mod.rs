//! Video encoding: capability negotiation and the encoder backend.

/// Encoder backend trait, events and the `ffmpeg`/libx264 backend.
pub mod backend;
/// Capability negotiation from desired parameters to a supported config.
pub mod negotiate;
