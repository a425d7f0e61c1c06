//! The three-stage pipeline: decode, composite, encode.
//!
//! The stages run on dedicated threads, serialized by the phase barrier so
//! exactly one frame is in flight end to end. The coordinator assembles the
//! stages, aggregates their events and reports lifecycle to an observer.

pub(crate) mod composite;
/// Pipeline assembly, events and the observer contract.
pub mod coordinator;
pub(crate) mod decode;
pub(crate) mod encode;
/// The phase-synchronization barrier.
pub mod phase;
/// Render-context registry and pacing.
pub mod registry;
/// Single-slot frame handoff surfaces.
pub mod surface;
