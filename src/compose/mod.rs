//! Sky-region compositing: layers, placement geometry and per-pixel blend.

/// Per-pixel compositor.
pub mod blend;
/// Layer images and per-run compositing parameters.
pub mod params;
/// Background placement transform in normalized texture coordinates.
pub mod transform;
