use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::foundation::core::Fps;
use crate::foundation::error::{SkyError, SkyResult};

/// Negotiated encoder output format, reported once when the encoder first
/// produces output.
///
/// Codec configuration data (SPS/PPS for H.264-class codecs) travels with the
/// format, not as in-band samples; the muxer writes it at stream start.
#[derive(Clone, Debug)]
pub struct StreamFormat {
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Constant output frame rate.
    pub fps: Fps,
    /// Out-of-band codec configuration bytes, possibly empty.
    pub codec_config: Vec<u8>,
}

/// One encoded access unit with its presentation timestamp.
#[derive(Clone, Debug)]
pub struct EncodedSample {
    /// Compressed bitstream bytes for exactly one frame.
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds. The encode stage overwrites
    /// whatever the encoder reported with a synthesized CFR timestamp.
    pub pts_us: u64,
    /// Whether this sample is a sync (key) frame.
    pub key_frame: bool,
}

/// Packages encoded samples into a playable container file.
///
/// Lifecycle: `start` exactly once (lazily, on the encoder's first
/// format-change), then `write_sample` in presentation order, then `stop`.
pub trait SampleMuxer: Send {
    /// Open the container for writing with the given stream format.
    fn start(&mut self, format: &StreamFormat) -> SkyResult<()>;

    /// Append one sample. Samples arrive in strictly increasing `pts_us`.
    fn write_sample(&mut self, sample: &EncodedSample) -> SkyResult<()>;

    /// Finalize and close the container.
    fn stop(&mut self) -> SkyResult<()>;
}

/// Production muxer: `ffmpeg` stream-copying an Annex-B H.264 elementary
/// stream into an MP4 container, no audio, constant frame rate.
pub struct FfmpegMp4Muxer {
    out_path: PathBuf,
    overwrite: bool,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegMp4Muxer {
    /// Create a muxer targeting `out_path`. Nothing is opened until
    /// [`SampleMuxer::start`].
    pub fn new(out_path: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite,
            child: None,
            stdin: None,
            stderr_drain: None,
        }
    }
}

impl SampleMuxer for FfmpegMp4Muxer {
    fn start(&mut self, format: &StreamFormat) -> SkyResult<()> {
        if self.child.is_some() {
            return Err(SkyError::FormatChangedTwice);
        }
        ensure_parent_dir(&self.out_path)
            .map_err(|e| SkyError::encoder_config(e.to_string()))?;
        if !self.overwrite && self.out_path.exists() {
            return Err(SkyError::encoder_config(format!(
                "output file '{}' already exists",
                self.out_path.display()
            )));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-r",
            &format!("{}/{}", format.fps.num, format.fps.den),
            "-f",
            "h264",
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "copy",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&self.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            SkyError::encoder_config(format!("failed to spawn ffmpeg muxer: {e}"))
        })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SkyError::encoder_config("failed to open ffmpeg muxer stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SkyError::encoder_config("failed to open ffmpeg muxer stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        if !format.codec_config.is_empty() {
            stdin.write_all(&format.codec_config).map_err(|e| {
                SkyError::encoder_config(format!("failed to write codec config: {e}"))
            })?;
        }

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> SkyResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SkyError::encoder_config("muxer is not started"))?;
        // Timing is carried by the declared CFR rate; the elementary stream
        // itself has no timestamps, so uniformly spaced pts are preserved by
        // construction.
        stdin
            .write_all(&sample.data)
            .map_err(|e| SkyError::encoder_config(format!("failed to write sample: {e}")))
    }

    fn stop(&mut self) -> SkyResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| SkyError::encoder_config(format!("failed to wait for muxer: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SkyError::encoder_config("muxer stderr drain thread panicked"))?
                .map_err(|e| SkyError::encoder_config(format!("muxer stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(SkyError::encoder_config(format!(
                "ffmpeg muxer exited with {status}: {}",
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegMp4Muxer {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SkyResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_before_start_is_rejected() {
        let mut mux = FfmpegMp4Muxer::new(std::env::temp_dir().join("skycomp_never.mp4"), true);
        let err = mux
            .write_sample(&EncodedSample {
                data: vec![0, 0, 0, 1],
                pts_us: 0,
                key_frame: true,
            })
            .unwrap_err();
        assert!(matches!(err, SkyError::EncoderConfigurationFailed(_)));
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut mux = FfmpegMp4Muxer::new(std::env::temp_dir().join("skycomp_never.mp4"), true);
        mux.stop().unwrap();
    }
}
