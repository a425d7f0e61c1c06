use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::{debug, trace};

use crate::encode::backend::{EncoderBackend, EncoderEvent};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{SkyError, SkyResult};
use crate::media::mux::SampleMuxer;
use crate::pipeline::coordinator::StageEvent;
use crate::pipeline::phase::{Gate, Phase, PhaseBarrier};
use crate::pipeline::surface::SharedSurface;

/// Encode worker: submits composited frames and muxes the encoder's output.
///
/// The muxer is started lazily on the encoder's first format report, so the
/// container always opens with the format the encoder actually negotiated.
/// Sample timestamps are synthesized on a constant-frame-rate grid from the
/// written-frame count, regardless of encode latency jitter.
pub(crate) struct EncodeStage {
    encoder: Box<dyn EncoderBackend>,
    muxer: Box<dyn SampleMuxer>,
    out_path: PathBuf,
    frame_rate: u32,
    base_pts_us: u64,
    muxer_started: bool,
    written: u64,
}

impl EncodeStage {
    pub(crate) fn new(
        encoder: Box<dyn EncoderBackend>,
        muxer: Box<dyn SampleMuxer>,
        out_path: PathBuf,
        frame_rate: u32,
    ) -> Self {
        Self {
            encoder,
            muxer,
            out_path,
            frame_rate,
            base_pts_us: 0,
            muxer_started: false,
            written: 0,
        }
    }

    pub(crate) fn run(
        mut self,
        barrier: &PhaseBarrier,
        rendered: &SharedSurface,
        stop: &AtomicBool,
        events: &Sender<StageEvent>,
    ) -> SkyResult<()> {
        let result = self.worker(barrier, rendered, stop, events);
        let released = self.encoder.release();
        result.and(released)
    }

    fn worker(
        &mut self,
        barrier: &PhaseBarrier,
        rendered: &SharedSurface,
        stop: &AtomicBool,
        events: &Sender<StageEvent>,
    ) -> SkyResult<()> {
        let mut index = 0u64;
        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            match barrier.await_phase(Phase::Encode)? {
                Gate::Open => {}
                Gate::Shutdown => break,
            }
            let Some(frame) = rendered.take() else {
                return Err(SkyError::validation("no rendered frame at encode phase"));
            };
            self.encoder.submit_frame(&frame)?;
            // Drain whatever is ready without requesting end-of-stream; the
            // encoder may legitimately buffer and return nothing yet.
            let ready = self.encoder.drain()?;
            self.consume(ready)?;
            let _ = events.send(StageEvent::FrameEncoded(FrameIndex(index)));
            index += 1;
            barrier.advance();
        }
        self.finish(events)
    }

    /// Apply the per-buffer drain logic to a batch of encoder events.
    fn consume(&mut self, batch: Vec<EncoderEvent>) -> SkyResult<()> {
        for event in batch {
            match event {
                EncoderEvent::FormatChanged(format) => {
                    if self.muxer_started {
                        return Err(SkyError::FormatChangedTwice);
                    }
                    debug!(
                        width = format.width,
                        height = format.height,
                        "encoder output format reported, starting muxer"
                    );
                    self.muxer.start(&format)?;
                    self.muxer_started = true;
                }
                EncoderEvent::CodecConfig(bytes) => {
                    // Already carried by the stream format.
                    trace!(len = bytes.len(), "discarding in-band codec config");
                }
                EncoderEvent::Sample(mut sample) => {
                    sample.pts_us =
                        self.base_pts_us + self.written * 1_000_000 / u64::from(self.frame_rate);
                    self.muxer.write_sample(&sample)?;
                    self.written += 1;
                }
                EncoderEvent::EndOfStream => {}
            }
        }
        Ok(())
    }

    /// Orderly end of stream: flush the encoder, then close the container.
    ///
    /// A run that produced no samples has no valid container to finalize and
    /// fails with [`SkyError::ZeroFramesEncoded`] even absent an encoder
    /// fault.
    fn finish(&mut self, events: &Sender<StageEvent>) -> SkyResult<()> {
        let tail = self.encoder.finish()?;
        self.consume(tail)?;
        if self.written == 0 {
            return Err(SkyError::ZeroFramesEncoded);
        }
        self.muxer.stop()?;
        debug!(frames = self.written, out = %self.out_path.display(), "encode finished");
        let _ = events.send(StageEvent::EncodingFinished {
            frames: self.written,
            path: self.out_path.clone(),
        });
        Ok(())
    }
}
