//! Pure dimension math. No I/O, no images — just numbers.

use crate::params::TransformParams;

/// Compute the pixel dimensions a transform should actually produce.
///
/// - width and height both zero: identity, return `original` unchanged.
/// - height zero, width set: preserve `original`'s aspect ratio, scaling
///   from the requested width (the common case — a width-only segment).
/// - width zero, height set: preserve aspect ratio scaling from the
///   requested height.
/// - both set: used exactly as requested — the caller asked for an
///   explicit box and gets it, aspect ratio not preserved.
///
/// Mirrors the scaling arithmetic in the teacher's
/// `calculate_fill_dimensions`, simplified from "fill a target box" to
/// "scale preserving aspect from one known edge", since this service has
/// no crop-to-fill thumbnail feature.
pub fn resolve_dimensions(original: (u32, u32), params: &TransformParams) -> (u32, u32) {
    let (orig_w, orig_h) = original;

    if params.width == 0 && params.height == 0 {
        return original;
    }

    if params.height == 0 {
        let ratio = params.width as f64 / orig_w as f64;
        let height = (orig_h as f64 * ratio).round().max(1.0) as u32;
        return (params.width, height);
    }

    if params.width == 0 {
        let ratio = params.height as f64 / orig_h as f64;
        let width = (orig_w as f64 * ratio).round().max(1.0) as u32;
        return (width, params.height);
    }

    (params.width, params.height)
}
