use kurbo::{Affine, Point};

use crate::compose::params::TransformParams;
use crate::compose::transform::{compose_with_texture_transform, placement_transform};
use crate::foundation::core::{FrameRgba, Viewport};

/// Per-run compositor: fixed layers and placement, fed one decoded frame at a
/// time.
///
/// The output is `mask_alpha * video + (1 - mask_alpha) * foreground` per
/// channel, so an opaque mask pixel shows the video and a transparent one the
/// foreground artwork. Output alpha is forced opaque.
pub struct Compositor {
    viewport: Viewport,
    params: TransformParams,
    placement: Affine,
}

impl Compositor {
    /// Build a compositor for one output viewport and fixed layer set.
    pub fn new(viewport: Viewport, params: TransformParams) -> Self {
        let placement = placement_transform(
            params.video_width,
            params.video_height,
            viewport,
            params.bottom_padding,
        );
        Self {
            viewport,
            params,
            placement,
        }
    }

    /// The placement transform in effect, before any texture transform.
    pub fn placement(&self) -> Affine {
        self.placement
    }

    /// Composite one decoded video frame against the layers.
    ///
    /// `texture_transform` is the frame's buffer-orientation matrix, identity
    /// for plain decoded frames.
    pub fn composite(&self, video: &FrameRgba, texture_transform: Affine) -> FrameRgba {
        let transform = compose_with_texture_transform(self.placement, texture_transform);
        let w = self.viewport.width;
        let h = self.viewport.height;
        let mut out = Vec::with_capacity(w as usize * h as usize * 4);

        for y in 0..h {
            let v = (f64::from(y) + 0.5) / f64::from(h);
            for x in 0..w {
                let u = (f64::from(x) + 0.5) / f64::from(w);
                let video_uv = transform * Point::new(u, v);
                let bg = sample_frame_nearest(video, video_uv.x, video_uv.y);
                let fg = self.params.foreground.sample_nearest(u, v);
                let m = self.params.mask.sample_nearest(u, v)[3];
                out.push(blend_channel(bg[0], fg[0], m));
                out.push(blend_channel(bg[1], fg[1], m));
                out.push(blend_channel(bg[2], fg[2], m));
                out.push(255);
            }
        }

        FrameRgba {
            width: w,
            height: h,
            data: out,
        }
    }
}

/// One channel of `m/255 * bg + (1 - m/255) * fg`, rounded to nearest.
fn blend_channel(bg: u8, fg: u8, mask_alpha: u8) -> u8 {
    let m = u32::from(mask_alpha);
    let v = m * u32::from(bg) + (255 - m) * u32::from(fg);
    ((v + 127) / 255) as u8
}

fn sample_frame_nearest(frame: &FrameRgba, u: f64, v: f64) -> [u8; 4] {
    let x = ((u * f64::from(frame.width)) as i64).clamp(0, i64::from(frame.width) - 1) as usize;
    let y = ((v * f64::from(frame.height)) as i64).clamp(0, i64::from(frame.height) - 1) as usize;
    let off = (y * frame.width as usize + x) * 4;
    [
        frame.data[off],
        frame.data[off + 1],
        frame.data[off + 2],
        frame.data[off + 3],
    ]
}
