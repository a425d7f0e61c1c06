use std::ops::RangeInclusive;

use crate::foundation::error::{SkyError, SkyResult};

/// Output parameters requested by the caller, before capability negotiation.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct DesiredEncode {
    /// Requested output width in pixels.
    pub width: u32,
    /// Requested output height in pixels.
    pub height: u32,
    /// Requested bitrate in bits per second.
    pub bit_rate: u32,
    /// Requested constant frame rate in frames per second.
    pub frame_rate: u32,
    /// Requested key-frame interval in seconds.
    pub i_frame_interval: u32,
}

/// Capability limits reported by the underlying encoder.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EncoderCaps {
    /// Maximum supported coded width.
    pub max_width: u32,
    /// Maximum supported coded height.
    pub max_height: u32,
    /// Maximum supported bitrate in bits per second.
    pub max_bitrate: u32,
    /// Width alignment requirement in pixels.
    pub width_alignment: u32,
    /// Height alignment requirement in pixels. Reported separately from the
    /// width alignment; some encoders differ.
    pub height_alignment: u32,
    /// Inclusive range of supported frame rates.
    pub frame_rates: RangeInclusive<u32>,
    /// Throughput bound: `width * height * rate` must not exceed this.
    pub max_pixels_per_second: u64,
}

impl Default for EncoderCaps {
    fn default() -> Self {
        // Conservative H.264-class baseline: 1080p60.
        Self {
            max_width: 1920,
            max_height: 1080,
            max_bitrate: 20_000_000,
            width_alignment: 2,
            height_alignment: 2,
            frame_rates: 1..=60,
            max_pixels_per_second: 1920 * 1080 * 60,
        }
    }
}

/// Negotiated encoder configuration, all fields > 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncodeConfig {
    /// Coded output width.
    pub width: u32,
    /// Coded output height.
    pub height: u32,
    /// Bitrate in bits per second.
    pub bit_rate: u32,
    /// Constant frame rate in frames per second.
    pub frame_rate: u32,
    /// Key-frame interval in seconds.
    pub i_frame_interval: u32,
}

/// Map desired output parameters onto values the encoder supports.
///
/// - An exactly supported size passes through unchanged; an oversize request
///   is scaled down uniformly (aspect preserved) and aligned.
/// - Bitrate is clamped to the encoder maximum.
/// - The frame rate is the supported rate closest to the desired one that
///   satisfies the throughput bound at the negotiated size, ties resolved to
///   the higher rate.
pub fn negotiate(desired: DesiredEncode, caps: &EncoderCaps) -> SkyResult<EncodeConfig> {
    if desired.width == 0 || desired.height == 0 {
        return Err(SkyError::validation("desired size must be non-zero"));
    }
    if desired.bit_rate == 0 || desired.frame_rate == 0 || desired.i_frame_interval == 0 {
        return Err(SkyError::validation(
            "desired bitrate, frame rate and i-frame interval must be non-zero",
        ));
    }

    let scale = f64::min(
        1.0,
        f64::min(
            f64::from(caps.max_width) / f64::from(desired.width),
            f64::from(caps.max_height) / f64::from(desired.height),
        ),
    );
    let width = align_down(
        (f64::from(desired.width) * scale).round() as u32,
        caps.width_alignment,
    );
    let height = align_down(
        (f64::from(desired.height) * scale).round() as u32,
        caps.height_alignment,
    );
    if width == 0 || height == 0 {
        return Err(SkyError::unsupported_format(format!(
            "no supported size for {}x{} within {}x{}",
            desired.width, desired.height, caps.max_width, caps.max_height
        )));
    }

    let bit_rate = desired.bit_rate.min(caps.max_bitrate);

    let pixels = u64::from(width) * u64::from(height);
    let frame_rate = caps
        .frame_rates
        .clone()
        .filter(|&r| pixels.saturating_mul(u64::from(r)) <= caps.max_pixels_per_second)
        .min_by_key(|&r| {
            let dist = u64::from(r.abs_diff(desired.frame_rate));
            // Equal distances prefer the higher rate.
            (dist, u64::from(u32::MAX - r))
        })
        .ok_or_else(|| {
            SkyError::unsupported_format(format!(
                "no supported frame rate for {width}x{height}"
            ))
        })?;

    Ok(EncodeConfig {
        width,
        height,
        bit_rate,
        frame_rate,
        i_frame_interval: desired.i_frame_interval,
    })
}

fn align_down(v: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return v;
    }
    (v / alignment) * alignment
}
