//! Permissive URL parameter parsing.
//!
//! Unlike `path_safety::sanitize`, this parser never fails. Unrecognized,
//! malformed, or out-of-range segments are silently dropped; recognized
//! segments fill one of three slots (dimensions, format, quality) on a
//! first-wins basis, following the same "first non-empty wins" shape as
//! the teacher's `metadata::resolve`. Classification is hand-rolled
//! digit/string matching — no `regex` dependency, matching `naming.rs`'s
//! own avoidance of one.

const MIN_DIMENSION: u32 = 10;
const MAX_DIMENSION: u32 = 4000;
const MIN_QUALITY: u8 = 1;
const MAX_QUALITY: u8 = 100;
const DEFAULT_WIDTH: u32 = 1000;
const DEFAULT_HEIGHT: u32 = 1000;
const DEFAULT_QUALITY: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Jpg,
    Png,
    Webp,
}

impl OutputFormat {
    /// Distinct from [`OutputFormat::Jpg`] on purpose — see DESIGN.md OQ1.
    /// Both encode identical bytes and share a MIME type, but the cache
    /// key is derived from this token, not from a normalized form.
    fn parse(token: &str) -> Option<Self> {
        match token {
            "jpeg" => Some(Self::Jpeg),
            "jpg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg | Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Webp
    }
}

/// A fully-resolved transform request.
///
/// `height == 0` means "preserve aspect ratio from `width`". This is
/// true both when the client sent a width-only segment (`800`) and when
/// the client explicitly sent `800x0` — the two are indistinguishable
/// once parsed, and therefore key identically in the cache. See
/// DESIGN.md OQ2; this is a deliberate, spec-driven choice, not an
/// oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: u8,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            format: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
        }
    }
}

impl TransformParams {
    /// `true` when no resize was requested — width/height both absent.
    /// This is distinct from the *default* params, which do request a
    /// resize (to 1000x1000); `0x0` only arises when a caller explicitly
    /// asks for identity sizing, which this parser's segment grammar
    /// cannot itself produce (see DESIGN.md OQ2) but downstream callers
    /// (e.g. a future non-URL caller) may construct directly.
    pub fn is_identity_size(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// The administrative "clear cache" trigger: a literal `clear` segment
/// anywhere in the parameter list, independent of the three ordinary
/// slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRequest {
    pub params: TransformParams,
    pub clear: bool,
}

/// Parse raw URL path segments (already split on `/`) into a
/// [`ParsedRequest`]. Never fails — unrecognized segments are dropped.
pub fn parse_segments(segments: &[&str]) -> ParsedRequest {
    let mut params = TransformParams::default();
    let mut dimension_set = false;
    let mut format_set = false;
    let mut quality_set = false;
    let mut clear = false;

    for raw in segments {
        let segment = raw.trim();
        if segment.is_empty() || segment.contains('\0') {
            continue;
        }

        if segment == "clear" {
            clear = true;
            continue;
        }

        if !format_set {
            if let Some(fmt) = OutputFormat::parse(segment) {
                params.format = fmt;
                format_set = true;
                continue;
            }
        }

        if !quality_set {
            if let Some(q) = parse_quality(segment) {
                params.quality = q;
                quality_set = true;
                continue;
            }
        }

        if !dimension_set {
            if let Some((w, h)) = parse_dimensions(segment) {
                params.width = w;
                params.height = h;
                dimension_set = true;
                continue;
            }
        }
        // Unrecognized segment: silently dropped, request is never failed.
    }

    ParsedRequest { params, clear }
}

/// `q` followed by digits; valid only when the number lies in
/// `[MIN_QUALITY, MAX_QUALITY]`. Out-of-range values are *not* clamped —
/// an invalid quality segment fails to fill the slot at all, so a later
/// segment in the list still gets a chance at it (first-wins only
/// applies among validly-filling segments, per spec.md §4.4).
fn parse_quality(segment: &str) -> Option<u8> {
    let digits = segment.strip_prefix('q')?;
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    if value < MIN_QUALITY as u32 || value > MAX_QUALITY as u32 {
        return None;
    }
    Some(value as u8)
}

/// Either `W` (width-only) or `WxH`, both ASCII-digit groups within
/// `[MIN_DIMENSION, MAX_DIMENSION]`. Only `H` in the two-number form may
/// additionally be `0` (aspect-preserve, per DESIGN.md OQ2) — a bare
/// width-only segment or the `W` half of `WxH` is never `0`, since
/// spec.md §4.4's width-only rule requires the number to lie in
/// `[10,4000]` with no zero exception.
fn parse_dimensions(segment: &str) -> Option<(u32, u32)> {
    match segment.split_once('x') {
        Some((w, h)) => {
            let w = parse_bounded_digits(w)?;
            let h = parse_height_or_zero(h)?;
            Some((w, h))
        }
        None => {
            let w = parse_bounded_digits(segment)?;
            Some((w, 0))
        }
    }
}

fn parse_bounded_digits(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = token.parse().ok()?;
    if value < MIN_DIMENSION || value > MAX_DIMENSION {
        return None;
    }
    Some(value)
}

/// The `H` half of a `WxH` segment: same bounds as `parse_bounded_digits`,
/// but `0` passes straight through as the aspect-preserve marker.
fn parse_height_or_zero(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = token.parse().ok()?;
    if value == 0 {
        return Some(0);
    }
    if value < MIN_DIMENSION || value > MAX_DIMENSION {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_segments_yield_defaults() {
        let parsed = parse_segments(&[]);
        assert_eq!(parsed.params, TransformParams::default());
        assert!(!parsed.clear);
    }

    #[test]
    fn width_only_sets_height_zero() {
        let parsed = parse_segments(&["800"]);
        assert_eq!(parsed.params.width, 800);
        assert_eq!(parsed.params.height, 0);
    }

    #[test]
    fn width_only_and_explicit_wx0_key_identically() {
        let a = parse_segments(&["800"]);
        let b = parse_segments(&["800x0"]);
        assert_eq!(a.params, b.params);
    }

    #[test]
    fn lone_zero_width_segment_is_out_of_range_and_dropped() {
        // "0" alone is a width-only segment; width-only has no zero
        // exception (only the H half of WxH does), so this must be
        // dropped like any other out-of-range width, not accepted as
        // identity sizing.
        let parsed = parse_segments(&["0"]);
        assert_eq!(parsed.params, TransformParams::default());
    }

    #[test]
    fn zero_width_in_two_number_form_is_dropped() {
        let parsed = parse_segments(&["0x600"]);
        assert_eq!(parsed.params, TransformParams::default());
    }

    #[test]
    fn full_dimensions_parsed() {
        let parsed = parse_segments(&["800x600"]);
        assert_eq!(parsed.params.width, 800);
        assert_eq!(parsed.params.height, 600);
    }

    #[test]
    fn format_and_quality_first_wins() {
        let parsed = parse_segments(&["webp", "png", "q80", "q20"]);
        assert_eq!(parsed.params.format, OutputFormat::Webp);
        assert_eq!(parsed.params.quality, 80);
    }

    #[test]
    fn dimension_first_wins() {
        let parsed = parse_segments(&["800x600", "400x300"]);
        assert_eq!(parsed.params.width, 800);
        assert_eq!(parsed.params.height, 600);
    }

    #[test]
    fn unrecognized_segments_are_dropped_silently() {
        let parsed = parse_segments(&["bogus", "!!!", "800x600"]);
        assert_eq!(parsed.params.width, 800);
        assert_eq!(parsed.params.height, 600);
    }

    #[test]
    fn nul_byte_segment_is_dropped() {
        let parsed = parse_segments(&["800\0600"]);
        assert_eq!(parsed.params, TransformParams::default());
    }

    #[test]
    fn quality_out_of_range_is_dropped_not_clamped() {
        // q999 is syntactically a quality segment but fails the [1,100]
        // bounds check, so it does not claim the slot; q50 right after
        // it is the first segment that validly fills quality.
        let parsed = parse_segments(&["q999", "q50"]);
        assert_eq!(parsed.params.quality, 50);
    }

    #[test]
    fn quality_out_of_range_with_no_valid_fallback_keeps_default() {
        let parsed = parse_segments(&["q999"]);
        assert_eq!(parsed.params.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn quality_out_of_digit_range_is_unrecognized() {
        // 4 digits exceeds the 1-3 digit window and is dropped, default quality kept.
        let parsed = parse_segments(&["q9999"]);
        assert_eq!(parsed.params.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn dimension_over_max_is_dropped() {
        let parsed = parse_segments(&["99999x99999"]);
        assert_eq!(parsed.params, TransformParams::default());
    }

    #[test]
    fn clear_trigger_detected_independent_of_slots() {
        let parsed = parse_segments(&["800x600", "clear", "webp"]);
        assert!(parsed.clear);
        assert_eq!(parsed.params.width, 800);
        assert_eq!(parsed.params.format, OutputFormat::Webp);
    }

    #[test]
    fn jpg_and_jpeg_are_distinct_variants() {
        assert_ne!(OutputFormat::parse("jpg"), OutputFormat::parse("jpeg"));
        assert_eq!(
            OutputFormat::Jpg.mime_type(),
            OutputFormat::Jpeg.mime_type()
        );
    }
}
