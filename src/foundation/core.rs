use crate::foundation::error::{SkyError, SkyResult};

/// Index of a frame in pipeline order, starting at 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second as a rational number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator.
    pub num: u32,
    /// Denominator, must be > 0.
    pub den: u32,
}

impl Fps {
    /// Validate and construct an [`Fps`] value.
    pub fn new(num: u32, den: u32) -> SkyResult<Self> {
        if num == 0 {
            return Err(SkyError::validation("Fps num must be > 0"));
        }
        if den == 0 {
            return Err(SkyError::validation("Fps den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Width / height.
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// A frame as RGBA8 pixels, tightly packed, row-major.
///
/// Frames moving through the pipeline are straight-alpha; composited frames
/// are fully opaque (`a == 255` everywhere).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, `width * height * 4` long.
    pub data: Vec<u8>,
}

impl FrameRgba {
    /// Allocate an opaque black frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Expected byte length for this frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Validate that `data` matches `width * height * 4`.
    pub fn validate(&self) -> SkyResult<()> {
        if self.data.len() != self.expected_len() {
            return Err(SkyError::validation(format!(
                "frame data length {} does not match {}x{} RGBA8",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}
