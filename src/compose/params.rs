use std::path::Path;

use crate::foundation::error::{SkyError, SkyResult};

/// A static RGBA8 layer (foreground artwork or alpha cut-out mask).
#[derive(Clone, Debug)]
pub struct LayerImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl LayerImage {
    /// Load a layer from an image file into RGBA8.
    pub fn load(path: &Path) -> SkyResult<Self> {
        let img = image::open(path)
            .map_err(|e| {
                SkyError::validation(format!("failed to load layer '{}': {e}", path.display()))
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            data: img.into_raw(),
        })
    }

    /// Build a layer from raw RGBA8 bytes.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> SkyResult<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(SkyError::validation(
                "layer data length does not match width*height*4",
            ));
        }
        if width == 0 || height == 0 {
            return Err(SkyError::validation("layer dimensions must be non-zero"));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fill a layer with one RGBA color, for tests and solid backdrops.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Nearest-neighbor sample at normalized coordinates, clamped to edge.
    pub fn sample_nearest(&self, u: f64, v: f64) -> [u8; 4] {
        let x = ((u * f64::from(self.width)) as i64).clamp(0, i64::from(self.width) - 1) as usize;
        let y = ((v * f64::from(self.height)) as i64).clamp(0, i64::from(self.height) - 1) as usize;
        let off = (y * self.width as usize + x) * 4;
        [
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ]
    }
}

/// Immutable per-run compositing parameters, owned by the composite stage.
#[derive(Clone, Debug)]
pub struct TransformParams {
    /// Source video width in pixels.
    pub video_width: u32,
    /// Source video height in pixels.
    pub video_height: u32,
    /// Foreground artwork revealed where the mask is transparent.
    pub foreground: LayerImage,
    /// Alpha cut-out mask; alpha 1 reveals the video, alpha 0 the foreground.
    pub mask: LayerImage,
    /// Fraction of the viewport height reserved at the bottom, in `[0, 1]`.
    pub bottom_padding: f64,
}

impl TransformParams {
    /// Validate value ranges.
    pub fn validate(&self) -> SkyResult<()> {
        if self.video_width == 0 || self.video_height == 0 {
            return Err(SkyError::validation("video dimensions must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.bottom_padding) {
            return Err(SkyError::validation(
                "bottom_padding must be within [0, 1]",
            ));
        }
        Ok(())
    }
}
