use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::foundation::core::FrameRgba;
use crate::foundation::error::{SkyError, SkyResult};
use crate::media::probe::VideoTrackInfo;

/// A source of decoded RGBA frames in presentation order.
///
/// The pipeline's decode stage is written against this seam so the stage
/// protocol can be exercised with scripted decoders in tests.
pub trait FrameDecoder: Send {
    /// Pull the next decoded frame, or `None` on end of stream.
    ///
    /// After `None` is returned once, every further call returns `None`.
    fn next_frame(&mut self) -> SkyResult<Option<FrameRgba>>;

    /// Release decoder resources. Called exactly once, on every exit path.
    fn release(&mut self) -> SkyResult<()>;
}

/// Production decoder: `ffmpeg` streaming rawvideo RGBA over stdout.
///
/// The selected video track is decoded with `-map`; any audio track in the
/// source is never read.
pub struct FfmpegFrameDecoder {
    source_path: PathBuf,
    width: u32,
    height: u32,

    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    eos: bool,
}

impl FfmpegFrameDecoder {
    /// Spawn the decoder process for the given probed track.
    ///
    /// Failure to spawn or to open the pipes surfaces as
    /// [`SkyError::DecodingFailed`].
    pub fn start(source_path: &Path, track: &VideoTrackInfo) -> SkyResult<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-i"])
            .arg(source_path)
            .args([
                "-map",
                &format!("0:{}", track.index),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SkyError::decoding(format!("failed to spawn ffmpeg decoder: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SkyError::decoding("failed to open ffmpeg decoder stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SkyError::decoding("failed to open ffmpeg decoder stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        debug!(
            source = %source_path.display(),
            width = track.width,
            height = track.height,
            "decoder started"
        );

        Ok(Self {
            source_path: source_path.to_path_buf(),
            width: track.width,
            height: track.height,
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
            eos: false,
        })
    }

    /// Read exactly one frame's worth of bytes, distinguishing a clean end of
    /// stream (EOF on a frame boundary) from a truncated frame.
    fn read_frame_bytes(&mut self, buf: &mut [u8]) -> SkyResult<bool> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(false);
        };

        let mut filled = 0usize;
        while filled < buf.len() {
            let n = stdout
                .read(&mut buf[filled..])
                .map_err(|e| SkyError::decoding(format!("decoder pipe read failed: {e}")))?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(SkyError::decoding(format!(
                    "decoder stream ended mid-frame ({} of {} bytes)",
                    filled,
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(true)
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

impl FrameDecoder for FfmpegFrameDecoder {
    fn next_frame(&mut self) -> SkyResult<Option<FrameRgba>> {
        if self.eos {
            return Ok(None);
        }

        let mut frame = FrameRgba {
            width: self.width,
            height: self.height,
            data: vec![0u8; self.width as usize * self.height as usize * 4],
        };
        let mut data = std::mem::take(&mut frame.data);
        let got = self.read_frame_bytes(&mut data)?;
        frame.data = data;

        if !got {
            self.eos = true;
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn release(&mut self) -> SkyResult<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // A mid-stream release (stop or downstream failure) leaves the child
        // blocked on a closed pipe; kill before reaping.
        if !self.eos {
            let _ = child.kill();
        }
        let status = child
            .wait()
            .map_err(|e| SkyError::decoding(format!("failed to wait for ffmpeg decoder: {e}")))?;
        let stderr = self.collect_stderr();

        if self.eos && !status.success() {
            return Err(SkyError::decoding(format!(
                "ffmpeg decoder for '{}' exited with {status}: {stderr}",
                self.source_path.display()
            )));
        }
        if !stderr.is_empty() {
            warn!(stderr = %stderr, "decoder reported warnings");
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameDecoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.release();
        }
    }
}
