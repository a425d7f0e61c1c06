use std::path::Path;

use crate::foundation::core::Fps;
use crate::foundation::error::{SkyError, SkyResult};

/// Metadata for the selected video track of a media source.
#[derive(Clone, Debug)]
pub struct VideoTrackInfo {
    /// Stream index within the container.
    pub index: u32,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Nominal frame rate of the track.
    pub fps: Fps,
    /// Total frame count when the container reports one; used only for
    /// progress estimation, never for correctness.
    pub frame_count_hint: Option<u64>,
}

/// One stream as reported by `ffprobe -show_streams`.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ProbedStream {
    /// Stream index within the container.
    pub index: u32,
    /// `"video"`, `"audio"`, `"subtitle"`, ...
    pub codec_type: Option<String>,
    /// Coded width, video streams only.
    pub width: Option<u32>,
    /// Coded height, video streams only.
    pub height: Option<u32>,
    /// Real base frame rate as `"num/den"`.
    pub r_frame_rate: Option<String>,
    /// Container-reported frame count, when present.
    pub nb_frames: Option<String>,
    /// Stream duration in seconds, when present.
    pub duration: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ProbeOut {
    streams: Vec<ProbedStream>,
}

/// Probe a media source through `ffprobe` and select its video track.
///
/// Fails with [`SkyError::NoVideoTrackFound`] when no stream has a video
/// media type.
pub fn probe_source(source_path: &Path) -> SkyResult<VideoTrackInfo> {
    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| SkyError::decoding(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(SkyError::decoding(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| SkyError::decoding(format!("ffprobe json parse failed: {e}")))?;
    select_video_track(&parsed.streams)
}

/// Select the first stream whose media type is video.
///
/// Pure counterpart of [`probe_source`]; the only place the
/// track-selection rule lives.
pub fn select_video_track(streams: &[ProbedStream]) -> SkyResult<VideoTrackInfo> {
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(SkyError::NoVideoTrackFound)?;

    let width = video
        .width
        .ok_or_else(|| SkyError::decoding("video stream is missing its width"))?;
    let height = video
        .height
        .ok_or_else(|| SkyError::decoding("video stream is missing its height"))?;
    if width == 0 || height == 0 {
        return Err(SkyError::decoding("video stream reports a zero dimension"));
    }

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rational_fps)
        .unwrap_or(Fps { num: 30, den: 1 });

    let frame_count_hint = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| {
            let secs = video.duration.as_deref()?.parse::<f64>().ok()?;
            let frames = (secs * fps.as_f64()).round();
            (frames >= 1.0).then_some(frames as u64)
        });

    Ok(VideoTrackInfo {
        index: video.index,
        width,
        height,
        fps,
        frame_count_hint,
    })
}

fn parse_rational_fps(s: &str) -> Option<Fps> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse::<u32>().ok()?;
    let den = den.trim().parse::<u32>().ok()?;
    Fps::new(num, den).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec_type: &str) -> ProbedStream {
        ProbedStream {
            index: 0,
            codec_type: Some(codec_type.to_owned()),
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: Some("30000/1001".to_owned()),
            nb_frames: Some("300".to_owned()),
            duration: None,
        }
    }

    #[test]
    fn selects_first_video_stream() {
        let mut audio = stream("audio");
        audio.index = 0;
        let mut video = stream("video");
        video.index = 1;

        let info = select_video_track(&[audio, video]).unwrap();
        assert_eq!(info.index, 1);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.fps, Fps { num: 30000, den: 1001 });
        assert_eq!(info.frame_count_hint, Some(300));
    }

    #[test]
    fn no_video_stream_is_a_typed_error() {
        let err = select_video_track(&[stream("audio")]).unwrap_err();
        assert!(matches!(err, SkyError::NoVideoTrackFound));
        assert!(select_video_track(&[]).is_err());
    }

    #[test]
    fn frame_count_falls_back_to_duration_times_fps() {
        let mut video = stream("video");
        video.nb_frames = None;
        video.duration = Some("10.0".to_owned());
        let info = select_video_track(&[video]).unwrap();
        // 10s at 30000/1001 fps.
        assert_eq!(info.frame_count_hint, Some(300));
    }

    #[test]
    fn unparsable_rate_defaults_to_30fps() {
        let mut video = stream("video");
        video.r_frame_rate = Some("0/0".to_owned());
        let info = select_video_track(&[video]).unwrap();
        assert_eq!(info.fps, Fps { num: 30, den: 1 });
    }
}
