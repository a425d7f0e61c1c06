use kurbo::Affine;

use crate::foundation::core::Viewport;

/// Background placement transform in normalized texture coordinates.
///
/// Maps output-space UV onto video-texture UV so the video fills the sky
/// viewport (the region above the reserved bottom band) with aspect ratio
/// preserved and the excess dimension cropped.
///
/// With `video_ar = vw/vh`, `sky_height = H*(1-pad)` and
/// `roi_ar = W/sky_height`:
/// - a comparatively taller video fills the full width; excess height is
///   cropped and the crop window anchored away from the padded bottom band;
/// - a comparatively wider video fills the sky height; excess width is
///   cropped symmetrically.
///
/// Equal aspect ratios with zero padding degenerate to the identity.
pub fn placement_transform(
    video_width: u32,
    video_height: u32,
    viewport: Viewport,
    bottom_padding: f64,
) -> Affine {
    let w = f64::from(viewport.width);
    let h = f64::from(viewport.height);
    let video_ar = f64::from(video_width) / f64::from(video_height);
    let sky_height = h * (1.0 - bottom_padding);
    let roi_ar = w / sky_height;

    if video_ar < roi_ar {
        // Video is taller than the sky region: full width, crop height.
        let video_desired_height = w / video_ar;
        let sy = h / video_desired_height;
        let ty = -bottom_padding * h / video_desired_height;
        scale_translate(1.0, sy, 0.0, ty)
    } else {
        // Video is wider: full sky height, crop width centered.
        let sy = h / sky_height;
        let sx = w / (sky_height * video_ar);
        let tx = (1.0 - sx) / 2.0;
        let ty = -bottom_padding * sy;
        scale_translate(sx, sy, tx, ty)
    }
}

/// Compose the placement transform with the texture's own reported transform.
///
/// The texture transform (the hardware's buffer-orientation matrix, identity
/// for plain decoded frames) applies after placement, matching how the two
/// are chained before sampling.
pub fn compose_with_texture_transform(placement: Affine, texture: Affine) -> Affine {
    texture * placement
}

fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Affine {
    Affine::new([sx, 0.0, 0.0, sy, tx, ty])
}
