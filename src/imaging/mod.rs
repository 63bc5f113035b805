//! Image processing: pure dimension math plus the transform invoker.
//!
//! - [`calculations`] — pure functions for resize dimension math (unit testable)
//! - [`backend`] — the [`backend::Codec`] trait and its real/mock implementations

pub mod backend;
pub mod calculations;

pub use backend::{Codec, DetectedFormat, RealCodec, TransformError};
pub use calculations::resolve_dimensions;
