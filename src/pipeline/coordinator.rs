use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use kurbo::Affine;
use tracing::{info, instrument, warn};

use crate::compose::blend::Compositor;
use crate::compose::params::{LayerImage, TransformParams};
use crate::encode::backend::{EncoderBackend, FfmpegEncoderBackend};
use crate::encode::negotiate::{DesiredEncode, EncoderCaps, negotiate};
use crate::foundation::core::{FrameIndex, Viewport};
use crate::foundation::error::{SkyError, SkyResult};
use crate::media::decode::{FfmpegFrameDecoder, FrameDecoder};
use crate::media::mux::{FfmpegMp4Muxer, SampleMuxer, is_ffmpeg_on_path};
use crate::media::probe::probe_source;
use crate::pipeline::encode::EncodeStage;
use crate::pipeline::phase::PhaseBarrier;
use crate::pipeline::registry::{PacingMode, RenderContextRegistry};
use crate::pipeline::surface::SharedSurface;
use crate::pipeline::{composite, decode};

/// Event sent from a worker stage to the coordinator.
#[derive(Debug)]
pub enum StageEvent {
    /// A frame was decoded and published for rendering.
    FrameDecoded(FrameIndex),
    /// A frame was composited and published for encoding.
    FrameRendered(FrameIndex),
    /// A frame was submitted to the encoder and ready output was muxed.
    FrameEncoded(FrameIndex),
    /// The decoder reached end of stream after `frames` frames.
    DecodingFinished {
        /// Total decoded frames.
        frames: u64,
    },
    /// The container was finalized with `frames` written samples.
    EncodingFinished {
        /// Total written samples.
        frames: u64,
        /// The finalized output file.
        path: PathBuf,
    },
    /// A stage failed; the pipeline is tearing down.
    StageFailed {
        /// Name of the failing stage.
        stage: &'static str,
        /// The stage's error, reported once via the observer.
        error: SkyError,
    },
}

/// Callbacks reporting pipeline lifecycle to the caller.
///
/// `on_progress` values are monotone non-decreasing and end with `1.0` on
/// success. Exactly one of `on_finished` / `on_failed` is invoked, once, as
/// the terminal callback.
pub trait PipelineObserver {
    /// The pipeline threads are about to start.
    fn on_started(&mut self) {}
    /// Estimated completed fraction in `[0, 1]`.
    fn on_progress(&mut self, _fraction: f64) {}
    /// The output file was finalized.
    fn on_finished(&mut self, _output: &Path) {}
    /// The pipeline failed; no usable output was produced.
    fn on_failed(&mut self, _error: &SkyError) {}
}

/// Observer that ignores every callback.
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Assembled pipeline configuration, independent of any media backend.
pub struct PipelineOpts {
    /// Output file path reported on success.
    pub output: PathBuf,
    /// Negotiated constant output frame rate, used for timestamp synthesis.
    pub frame_rate: u32,
    /// Composite stage pacing.
    pub pacing: PacingMode,
    /// Expected total frame count, for progress estimation only.
    pub frame_count_hint: Option<u64>,
    /// Buffer-orientation transform of decoded frames, identity for plain
    /// decoders.
    pub texture_transform: Affine,
}

/// Run the three-stage pipeline to completion over the given backends.
///
/// Spawns decode, composite and encode workers in a scope, serialized by the
/// phase barrier so exactly one frame is in flight, and aggregates their
/// events into the observer contract. On a stage failure the stop flag is set
/// and the barrier aborted, so every peer unwinds; teardown runs decoder
/// first, then the render context, then encoder and muxer, with the display
/// closing when the last context bundle drops.
pub fn run_pipeline(
    decoder: Box<dyn FrameDecoder>,
    compositor: Compositor,
    encoder: Box<dyn EncoderBackend>,
    muxer: Box<dyn SampleMuxer>,
    opts: PipelineOpts,
    observer: &mut dyn PipelineObserver,
) -> SkyResult<PathBuf> {
    let registry = RenderContextRegistry::new();
    let context = registry.acquire(opts.pacing);
    let barrier = PhaseBarrier::new();
    let decoded = SharedSurface::new();
    let rendered = SharedSurface::new();
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<StageEvent>();

    let encode_stage = EncodeStage::new(encoder, muxer, opts.output.clone(), opts.frame_rate);

    observer.on_started();

    let mut first_error: Option<SkyError> = None;
    let mut finished: Option<PathBuf> = None;

    let settle = |stage: &'static str,
                  result: SkyResult<()>,
                  events: &mpsc::Sender<StageEvent>| {
        if let Err(error) = result {
            // An abort unwind means some peer already reported.
            if !matches!(error, SkyError::Aborted) {
                let _ = events.send(StageEvent::StageFailed { stage, error });
            }
            stop.store(true, Ordering::Relaxed);
            barrier.abort();
        }
    };

    std::thread::scope(|scope| {
        let settle = &settle;
        {
            let events = tx.clone();
            let (barrier, decoded, stop) = (&barrier, &decoded, &stop);
            scope.spawn(move || {
                let result = decode::run(decoder, barrier, decoded, stop, &events);
                settle("decode", result, &events);
            });
        }
        {
            let events = tx.clone();
            let (barrier, decoded, rendered, stop) = (&barrier, &decoded, &rendered, &stop);
            let (compositor, texture) = (&compositor, opts.texture_transform);
            scope.spawn(move || {
                let result = composite::run(
                    compositor, context, texture, barrier, decoded, rendered, stop, &events,
                );
                settle("composite", result, &events);
            });
        }
        {
            let events = tx.clone();
            let (barrier, rendered, stop) = (&barrier, &rendered, &stop);
            scope.spawn(move || {
                let result = encode_stage.run(barrier, rendered, stop, &events);
                settle("encode", result, &events);
            });
        }
        drop(tx);

        let mut progress = 0.0f64;
        while let Ok(event) = rx.recv() {
            match event {
                StageEvent::FrameDecoded(_) | StageEvent::FrameRendered(_) => {}
                StageEvent::FrameEncoded(FrameIndex(i)) => {
                    if let Some(total) = opts.frame_count_hint.filter(|&t| t > 0) {
                        // Hints can undercount; hold below 1.0 until finalized.
                        let estimate = ((i + 1) as f64 / total as f64).min(0.999);
                        if estimate > progress {
                            progress = estimate;
                            observer.on_progress(estimate);
                        }
                    }
                }
                StageEvent::DecodingFinished { frames } => {
                    info!(frames, "decoding finished");
                }
                StageEvent::EncodingFinished { frames, path } => {
                    info!(frames, path = %path.display(), "encoding finished");
                    finished = Some(path);
                }
                StageEvent::StageFailed { stage, error } => {
                    warn!(stage, %error, "stage failed, tearing pipeline down");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
    });

    if let Some(error) = first_error {
        observer.on_failed(&error);
        return Err(error);
    }
    match finished {
        Some(path) => {
            observer.on_progress(1.0);
            observer.on_finished(&path);
            Ok(path)
        }
        None => {
            let error = SkyError::encoding("pipeline ended without finalizing the output");
            observer.on_failed(&error);
            Err(error)
        }
    }
}

/// Everything needed to generate one composited output file.
#[derive(Clone, Debug)]
pub struct GenerateOpts {
    /// Source video file; its first video track is used, audio is discarded.
    pub source: PathBuf,
    /// Foreground artwork image path.
    pub foreground: PathBuf,
    /// Alpha cut-out mask image path.
    pub mask: PathBuf,
    /// Output MP4 path.
    pub output: PathBuf,
    /// Requested output parameters before capability negotiation.
    pub desired: DesiredEncode,
    /// Encoder capability limits to negotiate against.
    pub caps: EncoderCaps,
    /// Fraction of the output height reserved at the bottom, in `[0, 1]`.
    pub bottom_padding: f64,
    /// Composite stage pacing.
    pub pacing: PacingMode,
    /// Whether an existing output file may be replaced.
    pub overwrite: bool,
}

/// Generate a composited MP4 from a source video and layer images.
///
/// Probes the source, negotiates the encoder configuration, loads the layers
/// and runs the ffmpeg-backed pipeline. The output canvas is the negotiated
/// encode size.
#[instrument(skip_all, fields(source = %opts.source.display(), output = %opts.output.display()))]
pub fn generate(opts: &GenerateOpts, observer: &mut dyn PipelineObserver) -> SkyResult<PathBuf> {
    // Setup faults (no video track, unsupported format, spawn failures)
    // surface through the same single on_failed as pipeline faults.
    match prepare(opts) {
        Ok((decoder, compositor, encoder, muxer, pipeline_opts)) => {
            run_pipeline(decoder, compositor, encoder, muxer, pipeline_opts, observer)
        }
        Err(error) => {
            observer.on_failed(&error);
            Err(error)
        }
    }
}

type PreparedPipeline = (
    Box<dyn FrameDecoder>,
    Compositor,
    Box<dyn EncoderBackend>,
    Box<dyn SampleMuxer>,
    PipelineOpts,
);

fn prepare(opts: &GenerateOpts) -> SkyResult<PreparedPipeline> {
    if !is_ffmpeg_on_path() {
        return Err(SkyError::encoder_config(
            "ffmpeg was not found on PATH; install ffmpeg to generate output",
        ));
    }

    let track = probe_source(&opts.source)?;
    let config = negotiate(opts.desired, &opts.caps)?;
    info!(
        track_index = track.index,
        video_width = track.width,
        video_height = track.height,
        out_width = config.width,
        out_height = config.height,
        frame_rate = config.frame_rate,
        "pipeline configured"
    );

    let params = TransformParams {
        video_width: track.width,
        video_height: track.height,
        foreground: LayerImage::load(&opts.foreground)?,
        mask: LayerImage::load(&opts.mask)?,
        bottom_padding: opts.bottom_padding,
    };
    params.validate()?;
    let viewport = Viewport {
        width: config.width,
        height: config.height,
    };
    let compositor = Compositor::new(viewport, params);

    let decoder: Box<dyn FrameDecoder> = Box::new(FfmpegFrameDecoder::start(&opts.source, &track)?);
    let encoder: Box<dyn EncoderBackend> = Box::new(FfmpegEncoderBackend::start(config)?);
    let muxer: Box<dyn SampleMuxer> = Box::new(FfmpegMp4Muxer::new(&opts.output, opts.overwrite));

    Ok((
        decoder,
        compositor,
        encoder,
        muxer,
        PipelineOpts {
            output: opts.output.clone(),
            frame_rate: config.frame_rate,
            pacing: opts.pacing,
            frame_count_hint: track.frame_count_hint,
            texture_transform: Affine::IDENTITY,
        },
    ))
}
