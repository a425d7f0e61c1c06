use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::encode::negotiate::EncodeConfig;
use crate::foundation::core::{FrameRgba, Fps};
use crate::foundation::error::{SkyError, SkyResult};
use crate::media::mux::{EncodedSample, StreamFormat};

/// One unit of ready encoder output.
#[derive(Clone, Debug)]
pub enum EncoderEvent {
    /// The encoder reported its negotiated output format. Emitted exactly
    /// once per stream in normal operation.
    FormatChanged(StreamFormat),
    /// Out-of-band codec configuration bytes. Redundant with the format's
    /// copy; the encode stage discards these.
    CodecConfig(Vec<u8>),
    /// One encoded access unit.
    Sample(EncodedSample),
    /// All output has been drained after an end-of-stream request.
    EndOfStream,
}

/// A video encoder bound to a reusable frame input surface.
///
/// The encode stage is written against this seam; production uses
/// [`FfmpegEncoderBackend`], tests use scripted implementations.
pub trait EncoderBackend: Send {
    /// Submit one composited frame for encoding.
    fn submit_frame(&mut self, frame: &FrameRgba) -> SkyResult<()>;

    /// Return whatever output is ready without requesting end-of-stream.
    /// May legitimately return nothing while the encoder buffers.
    fn drain(&mut self) -> SkyResult<Vec<EncoderEvent>>;

    /// Signal end-of-stream, then block draining until
    /// [`EncoderEvent::EndOfStream`] has been produced. The returned events
    /// end with `EndOfStream`.
    fn finish(&mut self) -> SkyResult<Vec<EncoderEvent>>;

    /// Release encoder resources. Called on every exit path.
    fn release(&mut self) -> SkyResult<()>;
}

/// Production encoder: `ffmpeg`/libx264 producing an Annex-B H.264 elementary
/// stream with access-unit delimiters, split into per-frame samples here.
pub struct FfmpegEncoderBackend {
    config: EncodeConfig,
    frame_len: usize,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    rx: Option<mpsc::Receiver<Vec<u8>>>,
    reader: Option<std::thread::JoinHandle<()>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    parse_buf: Vec<u8>,
    format_sent: bool,
    eos_seen: bool,
}

impl FfmpegEncoderBackend {
    /// Spawn the encoder process for the negotiated configuration.
    ///
    /// Any spawn or pipe failure surfaces as
    /// [`SkyError::EncoderConfigurationFailed`].
    pub fn start(config: EncodeConfig) -> SkyResult<Self> {
        if !config.width.is_multiple_of(2) || !config.height.is_multiple_of(2) {
            return Err(SkyError::encoder_config(
                "encoder width/height must be even (required for yuv420p output)",
            ));
        }

        let gop = config.frame_rate.saturating_mul(config.i_frame_interval).max(1);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", config.width, config.height),
            "-r",
            &config.frame_rate.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            &config.bit_rate.to_string(),
            "-g",
            &gop.to_string(),
            "-x264-params",
            "aud=1",
            "-f",
            "h264",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            SkyError::encoder_config(format!("failed to spawn ffmpeg encoder: {e}"))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SkyError::encoder_config("failed to open encoder stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SkyError::encoder_config("failed to open encoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SkyError::encoder_config("failed to open encoder stderr"))?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let reader = std::thread::spawn(move || {
            let mut chunk = [0u8; 64 * 1024];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        debug!(
            width = config.width,
            height = config.height,
            bit_rate = config.bit_rate,
            frame_rate = config.frame_rate,
            "encoder started"
        );

        Ok(Self {
            frame_len: config.width as usize * config.height as usize * 4,
            config,
            child: Some(child),
            stdin: Some(stdin),
            rx: Some(rx),
            reader: Some(reader),
            stderr_drain: Some(stderr_drain),
            parse_buf: Vec::new(),
            format_sent: false,
            eos_seen: false,
        })
    }

    fn stream_format(&self, codec_config: Vec<u8>) -> StreamFormat {
        StreamFormat {
            width: self.config.width,
            height: self.config.height,
            fps: Fps {
                num: self.config.frame_rate,
                den: 1,
            },
            codec_config,
        }
    }

    /// Turn complete access units in the parse buffer into events.
    fn emit_ready(&mut self, flush_tail: bool) -> Vec<EncoderEvent> {
        let units = split_access_units(&mut self.parse_buf, flush_tail);
        let mut events = Vec::new();
        for unit in units {
            if !self.format_sent {
                let config = extract_codec_config(&unit);
                events.push(EncoderEvent::FormatChanged(
                    self.stream_format(config.clone()),
                ));
                if !config.is_empty() {
                    events.push(EncoderEvent::CodecConfig(config));
                }
                self.format_sent = true;
            }
            let key_frame = contains_idr(&unit);
            events.push(EncoderEvent::Sample(EncodedSample {
                data: unit,
                pts_us: 0, // overwritten by the encode stage's CFR synthesis
                key_frame,
            }));
        }
        events
    }

    fn collect_stderr(&mut self) -> String {
        match self.stderr_drain.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_owned(),
                _ => String::new(),
            },
            None => String::new(),
        }
    }
}

impl EncoderBackend for FfmpegEncoderBackend {
    fn submit_frame(&mut self, frame: &FrameRgba) -> SkyResult<()> {
        if frame.data.len() != self.frame_len {
            return Err(SkyError::encoding(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SkyError::encoding("encoder input surface is already released"))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| SkyError::encoding(format!("failed to submit frame: {e}")))
    }

    fn drain(&mut self) -> SkyResult<Vec<EncoderEvent>> {
        let Some(rx) = self.rx.as_ref() else {
            return Ok(Vec::new());
        };
        // Bounded wait, then take whatever else is already ready. The
        // encoder owes us nothing per frame; lookahead buffering is normal.
        match rx.recv_timeout(Duration::from_millis(1)) {
            Ok(chunk) => self.parse_buf.extend_from_slice(&chunk),
            Err(mpsc::RecvTimeoutError::Timeout | mpsc::RecvTimeoutError::Disconnected) => {}
        }
        while let Ok(chunk) = rx.try_recv() {
            self.parse_buf.extend_from_slice(&chunk);
        }
        Ok(self.emit_ready(false))
    }

    fn finish(&mut self) -> SkyResult<Vec<EncoderEvent>> {
        // Closing the input surface is the end-of-stream signal.
        drop(self.stdin.take());

        if let Some(rx) = self.rx.take() {
            while let Ok(chunk) = rx.recv() {
                self.parse_buf.extend_from_slice(&chunk);
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        let mut events = self.emit_ready(true);
        self.eos_seen = true;

        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| SkyError::encoding(format!("failed to wait for encoder: {e}")))?;
            let stderr = self.collect_stderr();
            if !status.success() {
                return Err(SkyError::encoding(format!(
                    "ffmpeg encoder exited with {status}: {stderr}"
                )));
            }
            if !stderr.is_empty() {
                warn!(stderr = %stderr, "encoder reported warnings");
            }
        }

        events.push(EncoderEvent::EndOfStream);
        Ok(events)
    }

    fn release(&mut self) -> SkyResult<()> {
        drop(self.stdin.take());
        drop(self.rx.take());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(mut child) = self.child.take() {
            if !self.eos_seen {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        let _ = self.collect_stderr();
        Ok(())
    }
}

impl Drop for FfmpegEncoderBackend {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ── Annex-B parsing ─────────────────────────────────────────────────────────

const NAL_SLICE_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

/// Byte offsets of every Annex-B start code in `buf`, with the NAL type that
/// follows. A 4-byte start code is reported at its leading zero.
fn start_codes(buf: &[u8]) -> Vec<(usize, u8)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 3 < buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            let start = if i > 0 && buf[i - 1] == 0 { i - 1 } else { i };
            out.push((start, buf[i + 3] & 0x1F));
            i += 3;
        } else {
            i += 1;
        }
    }
    out
}

/// Split complete access units out of `buf` at access-unit delimiters.
///
/// Bytes after the last delimiter stay buffered unless `flush_tail` is set
/// (end of stream). Bytes before the first delimiter are folded into the
/// first unit.
fn split_access_units(buf: &mut Vec<u8>, flush_tail: bool) -> Vec<Vec<u8>> {
    let codes = start_codes(buf);
    let mut aud_offsets: Vec<usize> = Vec::new();
    for &(off, nal_type) in &codes {
        match nal_type {
            NAL_AUD => aud_offsets.push(off),
            1 | NAL_SLICE_IDR | 6 | NAL_SPS | NAL_PPS => {}
            other => {
                // Unknown payload from the codec: absorbed, never fatal.
                warn!(nal_type = other, "ignoring unexpected NAL unit");
            }
        }
    }

    if aud_offsets.is_empty() {
        if flush_tail && !buf.is_empty() {
            return vec![std::mem::take(buf)];
        }
        return Vec::new();
    }

    let mut units = Vec::new();
    // A unit spans from one delimiter to the next; leading bytes join the
    // first unit.
    let mut boundaries = aud_offsets;
    boundaries[0] = 0;
    let end = if flush_tail { Some(buf.len()) } else { None };
    for w in boundaries.windows(2) {
        units.push(buf[w[0]..w[1]].to_vec());
    }
    let last = *boundaries.last().unwrap_or(&0);
    match end {
        Some(end) => {
            if last < end {
                units.push(buf[last..end].to_vec());
            }
            buf.clear();
        }
        None => {
            buf.drain(..last);
        }
    }
    units
}

/// Copy SPS/PPS NAL units (with start codes) out of an access unit.
fn extract_codec_config(unit: &[u8]) -> Vec<u8> {
    let codes = start_codes(unit);
    let mut config = Vec::new();
    for (i, &(off, nal_type)) in codes.iter().enumerate() {
        if nal_type == NAL_SPS || nal_type == NAL_PPS {
            let end = codes.get(i + 1).map_or(unit.len(), |&(next, _)| next);
            config.extend_from_slice(&unit[off..end]);
        }
    }
    config
}

fn contains_idr(unit: &[u8]) -> bool {
    start_codes(unit)
        .iter()
        .any(|&(_, nal_type)| nal_type == NAL_SLICE_IDR)
}
