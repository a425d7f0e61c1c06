//! Skycomp composites a source video into the sky region of a masked scene
//! and writes the result as an MP4.
//!
//! The work runs as a three-stage pipeline on dedicated threads:
//!
//! - decode the source's video track to RGBA frames
//! - blend each frame behind the foreground artwork through the alpha mask
//! - encode and mux the composited frames at a negotiated configuration
//!
//! A phase barrier serializes the stages so exactly one frame is in flight
//! end to end. The public API is [`generate`] plus the building blocks for
//! assembling a pipeline over custom backends with [`run_pipeline`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Sky-region compositing: layers, geometry, blending.
pub mod compose;
/// Encoding: capability negotiation and encoder backends.
pub mod encode;
mod foundation;
/// Media I/O: probing, decoding, muxing.
pub mod media;
/// The three-stage pipeline and its coordinator.
pub mod pipeline;

pub use kurbo::Affine;

pub use crate::compose::blend::Compositor;
pub use crate::compose::params::{LayerImage, TransformParams};
pub use crate::encode::negotiate::{DesiredEncode, EncodeConfig, EncoderCaps, negotiate};
pub use crate::foundation::core::{Fps, FrameIndex, FrameRgba, Viewport};
pub use crate::foundation::error::{SkyError, SkyResult};
pub use crate::pipeline::coordinator::{
    GenerateOpts, NullObserver, PipelineObserver, PipelineOpts, generate, run_pipeline,
};
pub use crate::pipeline::registry::PacingMode;
