//! Media I/O: probing, frame decoding and container muxing.
//!
//! Production implementations drive `ffprobe`/`ffmpeg` subprocesses over
//! pipes; the trait seams keep the pipeline stages testable without them.

/// Decoded-frame source trait and the `ffmpeg` rawvideo decoder.
pub mod decode;
/// Sample muxer trait and the `ffmpeg` MP4 remuxer.
pub mod mux;
/// Source probing and video track selection.
pub mod probe;
