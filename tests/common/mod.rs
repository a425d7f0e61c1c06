//! Scripted pipeline backends for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use skycomp::encode::backend::{EncoderBackend, EncoderEvent};
use skycomp::media::decode::FrameDecoder;
use skycomp::media::mux::{EncodedSample, SampleMuxer, StreamFormat};
use skycomp::{
    Compositor, Fps, FrameRgba, LayerImage, PipelineObserver, SkyError, SkyResult,
    TransformParams, Viewport,
};

pub const SIDE: u32 = 4;

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Shared call trace: (who, frame index), in wall-clock order.
pub type Trace = Arc<Mutex<Vec<(&'static str, u64)>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// A solid frame whose first channel carries the frame index.
pub fn marked_frame(index: u8) -> FrameRgba {
    let mut f = FrameRgba::black(SIDE, SIDE);
    for px in f.data.chunks_exact_mut(4) {
        px[0] = index;
    }
    f
}

/// A compositor whose mask is fully opaque, so the video passes through.
pub fn passthrough_compositor() -> Compositor {
    Compositor::new(
        Viewport {
            width: SIDE,
            height: SIDE,
        },
        TransformParams {
            video_width: SIDE,
            video_height: SIDE,
            foreground: LayerImage::solid(SIDE, SIDE, [0, 255, 0, 255]),
            mask: LayerImage::solid(SIDE, SIDE, [0, 0, 0, 255]),
            bottom_padding: 0.0,
        },
    )
}

pub struct ScriptedDecoder {
    frames: VecDeque<FrameRgba>,
    /// Fail with `DecodingFailed` on the pull with this index.
    fail_at_pull: Option<u64>,
    pulls: u64,
    trace: Trace,
    released: Arc<Mutex<bool>>,
}

impl ScriptedDecoder {
    pub fn new(count: u8, trace: Trace) -> (Self, Arc<Mutex<bool>>) {
        let released = Arc::new(Mutex::new(false));
        let decoder = Self {
            frames: (0..count).map(marked_frame).collect(),
            fail_at_pull: None,
            pulls: 0,
            trace,
            released: Arc::clone(&released),
        };
        (decoder, released)
    }

    pub fn failing_at(mut self, pull: u64) -> Self {
        self.fail_at_pull = Some(pull);
        self
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn next_frame(&mut self) -> SkyResult<Option<FrameRgba>> {
        let pull = self.pulls;
        self.pulls += 1;
        if self.fail_at_pull == Some(pull) {
            return Err(SkyError::DecodingFailed("scripted decoder fault".into()));
        }
        match self.frames.pop_front() {
            Some(frame) => {
                self.trace.lock().unwrap().push(("decode", pull));
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn release(&mut self) -> SkyResult<()> {
        *self.released.lock().unwrap() = true;
        Ok(())
    }
}

/// When the scripted encoder surfaces its output.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum EncoderScript {
    /// Every submitted frame is ready on the next drain.
    Immediate,
    /// Nothing is ready until `finish`, which flushes everything.
    BufferUntilFinish,
    /// A fresh `FormatChanged` accompanies every drained frame.
    RepeatFormat,
}

pub struct MockEncoder {
    script: EncoderScript,
    frame_rate: u32,
    submitted: u64,
    queued: Vec<EncoderEvent>,
    format_emitted: bool,
    trace: Trace,
    released: Arc<Mutex<bool>>,
}

impl MockEncoder {
    pub fn new(script: EncoderScript, frame_rate: u32, trace: Trace) -> (Self, Arc<Mutex<bool>>) {
        let released = Arc::new(Mutex::new(false));
        let enc = Self {
            script,
            frame_rate,
            submitted: 0,
            queued: Vec::new(),
            format_emitted: false,
            trace,
            released: Arc::clone(&released),
        };
        (enc, released)
    }

    fn format(&self) -> StreamFormat {
        StreamFormat {
            width: SIDE,
            height: SIDE,
            fps: Fps {
                num: self.frame_rate,
                den: 1,
            },
            codec_config: vec![0xAA, 0xBB],
        }
    }

    fn sample_for(&self, frame: &FrameRgba, index: u64) -> EncoderEvent {
        EncoderEvent::Sample(EncodedSample {
            // The first channel carries the frame marker through the blend.
            data: vec![frame.data[0]],
            // Deliberately bogus; the encode stage must overwrite it.
            pts_us: 777_777,
            key_frame: index == 0,
        })
    }
}

impl EncoderBackend for MockEncoder {
    fn submit_frame(&mut self, frame: &FrameRgba) -> SkyResult<()> {
        let index = self.submitted;
        self.submitted += 1;
        self.trace.lock().unwrap().push(("encode", index));

        match self.script {
            EncoderScript::BufferUntilFinish => {
                let sample = self.sample_for(frame, index);
                self.queued.push(sample);
            }
            EncoderScript::Immediate => {
                if !self.format_emitted {
                    self.format_emitted = true;
                    self.queued.push(EncoderEvent::FormatChanged(self.format()));
                    self.queued
                        .push(EncoderEvent::CodecConfig(vec![0xAA, 0xBB]));
                }
                let sample = self.sample_for(frame, index);
                self.queued.push(sample);
            }
            EncoderScript::RepeatFormat => {
                self.queued.push(EncoderEvent::FormatChanged(self.format()));
                let sample = self.sample_for(frame, index);
                self.queued.push(sample);
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> SkyResult<Vec<EncoderEvent>> {
        if self.script == EncoderScript::BufferUntilFinish {
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut self.queued))
    }

    fn finish(&mut self) -> SkyResult<Vec<EncoderEvent>> {
        let mut out = Vec::new();
        if self.script == EncoderScript::BufferUntilFinish && self.submitted > 0 {
            out.push(EncoderEvent::FormatChanged(self.format()));
            out.push(EncoderEvent::CodecConfig(vec![0xAA, 0xBB]));
        }
        out.append(&mut self.queued);
        out.push(EncoderEvent::EndOfStream);
        Ok(out)
    }

    fn release(&mut self) -> SkyResult<()> {
        *self.released.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MuxerLog {
    pub starts: u64,
    pub formats: Vec<StreamFormat>,
    pub samples: Vec<EncodedSample>,
    pub stopped: bool,
}

#[derive(Default)]
pub struct MockMuxer {
    pub log: Arc<Mutex<MuxerLog>>,
}

impl MockMuxer {
    pub fn new() -> (Self, Arc<Mutex<MuxerLog>>) {
        let mux = Self::default();
        let log = Arc::clone(&mux.log);
        (mux, log)
    }
}

impl SampleMuxer for MockMuxer {
    fn start(&mut self, format: &StreamFormat) -> SkyResult<()> {
        let mut log = self.log.lock().unwrap();
        log.starts += 1;
        log.formats.push(format.clone());
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> SkyResult<()> {
        self.log.lock().unwrap().samples.push(sample.clone());
        Ok(())
    }

    fn stop(&mut self) -> SkyResult<()> {
        self.log.lock().unwrap().stopped = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub started: u32,
    pub progress: Vec<f64>,
    pub finished: Option<PathBuf>,
    pub failed: Vec<String>,
}

impl PipelineObserver for RecordingObserver {
    fn on_started(&mut self) {
        self.started += 1;
    }

    fn on_progress(&mut self, fraction: f64) {
        self.progress.push(fraction);
    }

    fn on_finished(&mut self, output: &Path) {
        self.finished = Some(output.to_path_buf());
    }

    fn on_failed(&mut self, error: &SkyError) {
        self.failed.push(error.to_string());
    }
}
