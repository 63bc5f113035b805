//! The Request Pipeline: orchestrates path safety, resolution, parameter
//! parsing, the cache, and the transform invoker behind the "never 404"
//! contract — a missing asset or a resolver failure is recovered by
//! substituting the system default, a cache-write failure after a
//! successful transform is logged and suppressed, and only a transform
//! failure on bytes that made it through resolution is allowed to reach
//! the client as an error.
//!
//! Control flow (resolve → check cache → transform → write cache →
//! respond) follows `other_examples/.../ferrex/image_handlers.rs`'s
//! `serve_image_handler`, adapted to this service's specific fallback
//! chain.

use crate::cache::CacheStore;
use crate::fingerprint::fingerprint;
use crate::imaging::backend::{Codec, TransformError};
use crate::params::{parse_segments, TransformParams};
use crate::resolver::{FallbackKind, FileResolver, ResolveError, ResolutionResult};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("asset and every fallback (group/system default) are unavailable: {0}")]
    Unrecoverable(#[from] ResolveError),
    #[error("io error reading resolved asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

pub struct PipelineOutcome {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub cache_hit: bool,
    pub is_grouped: bool,
    pub fallback: FallbackKind,
}

/// What a single request produced: either served bytes, or an
/// administrative cache-clear acknowledgment with no bytes at all.
pub enum ServeOutcome {
    Served(PipelineOutcome),
    /// A trailing `clear` segment was present — the cache entry for
    /// `requested_path` was evicted and nothing is served. Per spec,
    /// this path never falls through to a regenerated response.
    Cleared,
}

pub struct RequestPipeline<C: Codec> {
    resolver: FileResolver,
    cache: CacheStore,
    codec: C,
    system_default_path: std::path::PathBuf,
}

impl<C: Codec> RequestPipeline<C> {
    pub fn new(resolver: FileResolver, cache: CacheStore, codec: C, system_default_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            resolver,
            cache,
            codec,
            system_default_path: system_default_path.into(),
        }
    }

    /// Serve a single request given the full, still-undivided URL path
    /// (already percent-decoded by the HTTP layer — see DESIGN.md OQ3).
    /// Splits it into a file-path prefix and a parameter suffix per
    /// spec.md §4.7 step 1 before delegating to [`RequestPipeline::serve`].
    pub fn serve_url(&self, full_path: &str) -> Result<ServeOutcome, PipelineError> {
        let (prefix, params) = self.resolver.split_request_path(full_path);
        self.serve(&prefix, &params)
    }

    /// Serve a single request: `requested_path` is the asset path
    /// portion of the URL (already percent-decoded by the HTTP layer —
    /// see DESIGN.md OQ3); `segments` are the remaining path segments
    /// carrying transform parameters.
    ///
    /// A `clear` segment anywhere in `segments` short-circuits the rest
    /// of the pipeline: the cache entry for `requested_path` is evicted
    /// and [`ServeOutcome::Cleared`] is returned without ever resolving,
    /// reading, or transforming the asset.
    pub fn serve(&self, requested_path: &str, segments: &[&str]) -> Result<ServeOutcome, PipelineError> {
        let parsed = parse_segments(segments);

        if parsed.clear {
            if let Err(e) = self.cache.clear(requested_path) {
                warn!(error = %e, path = requested_path, "cache clear failed");
            }
            return Ok(ServeOutcome::Cleared);
        }

        let resolution = self.resolve_with_recovery(requested_path)?;

        let key = fingerprint(&resolution.path, &parsed.params);

        if let Some(cached) = self.try_cache_hit(requested_path, &key) {
            return Ok(ServeOutcome::Served(PipelineOutcome {
                bytes: cached,
                mime: parsed.params.format.mime_type(),
                cache_hit: true,
                is_grouped: resolution.is_grouped,
                fallback: resolution.fallback,
            }));
        }

        let output = self.transform(&resolution.path, &parsed.params)?;

        if let Err(e) = self.cache.store(requested_path, &key, &output) {
            warn!(error = %e, %key, "cache write failed after a successful transform; serving uncached");
        }

        Ok(ServeOutcome::Served(PipelineOutcome {
            bytes: output,
            mime: parsed.params.format.mime_type(),
            cache_hit: false,
            is_grouped: resolution.is_grouped,
            fallback: resolution.fallback,
        }))
    }

    /// Resolve the requested path, recovering any sanitizer or resolver
    /// failure by substituting the system default directly. Only a
    /// missing system default (with no fallback left) is unrecoverable.
    fn resolve_with_recovery(&self, requested_path: &str) -> Result<ResolutionResult, PipelineError> {
        match self.resolver.resolve(requested_path, None) {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!(error = %e, path = requested_path, "resolution failed, substituting system default");
                if self.system_default_path.is_file() {
                    Ok(ResolutionResult {
                        path: self.system_default_path.clone(),
                        is_grouped: false,
                        fallback: FallbackKind::SystemDefault,
                    })
                } else {
                    Err(PipelineError::Unrecoverable(e))
                }
            }
        }
    }

    fn try_cache_hit(&self, requested_path: &str, key: &str) -> Option<Vec<u8>> {
        match self.cache.retrieve(requested_path, key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, %key, "cache read failed, treating as a miss");
                None
            }
        }
    }

    fn transform(&self, path: &Path, params: &TransformParams) -> Result<Vec<u8>, PipelineError> {
        let bytes = fs::read(path)?;
        let out = self.codec.transform(&bytes, params)?;
        Ok(out)
    }
}
