use crate::error::{Error, Result};

/// Scale `original` to fit inside `max` while preserving the aspect ratio.
///
/// `scale = min(max_w / original_w, max_h / original_h)`, applied to both axes
/// and floored. This upscales when the box is larger than the original on
/// both axes.
pub fn contain_fit(original_w: u32, original_h: u32, max_w: u32, max_h: u32) -> Result<(u32, u32)> {
    if original_w == 0 || original_h == 0 || max_w == 0 || max_h == 0 {
        return Err(Error::InvalidArgument(format!(
            "contain_fit requires positive sizes, got {original_w}x{original_h} into {max_w}x{max_h}"
        )));
    }
    let scale = (max_w as f64 / original_w as f64).min(max_h as f64 / original_h as f64);
    let w = (original_w as f64 * scale).floor() as u32;
    let h = (original_h as f64 * scale).floor() as u32;
    Ok((w, h))
}

/// Display size for an image directive.
///
/// Both bounds: contain-fit into the box. One bound: the other axis follows
/// the native aspect ratio. No bounds: native size.
pub fn display_size(
    native_w: u32,
    native_h: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(u32, u32)> {
    let (w, h) = match (width, height) {
        (None, None) => contain_fit(native_w, native_h, native_w, native_h)?,
        (Some(w), Some(h)) => contain_fit(native_w, native_h, w, h)?,
        (Some(w), None) => contain_fit(native_w, native_h, w, u32::MAX)?,
        (None, Some(h)) => contain_fit(native_w, native_h, u32::MAX, h)?,
    };
    // Extreme aspect ratios can floor one axis to zero
    Ok((w.max(1), h.max(1)))
}
