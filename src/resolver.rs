//! File resolution: extension auto-detection, grouped-asset defaults,
//! and the missing-asset fallback chain.
//!
//! The extension-priority scan mirrors the teacher's own image-extension
//! handling in `scan.rs`; the `RwLock`-guarded resolution cache follows
//! the same coarse-lock, `Sync`-safe shape the teacher uses for shared
//! state in `imaging/backend.rs`'s `MockBackend`.

use crate::path_safety::{self, PathSafetyError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Extensions tried, in order, when a request names an asset without one.
pub const EXTENSION_PRIORITY: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// The name used for a directory's group default asset, tried per
/// extension in [`EXTENSION_PRIORITY`] order (`default.jpg`,
/// `default.jpeg`, ...).
pub const GROUP_DEFAULT_STEM: &str = "default";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("path rejected: {0}")]
    PathSafety(#[from] PathSafetyError),
    #[error("no asset, group default, or system default could be resolved")]
    NotFound,
}

/// Which rung of the fallback chain produced a [`ResolutionResult`].
///
/// `None` is not "no result" — it means the asset actually named by the
/// request was found, whether that was a direct file match (step 2/4)
/// or a directory's own group default reached because the request named
/// the directory itself (step 3). Per spec.md §4.3, step 3 is
/// explicitly "not fallback" even though it resolves through the group
/// mechanism — that distinction is carried separately on
/// [`ResolutionResult::is_grouped`], orthogonal to this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// No fallback: the requested asset (or the group it directly named) was found.
    None,
    /// The request named a missing asset; the containing directory's
    /// `default.*` was used instead (step 5).
    GroupDefault,
    /// The service-wide system default was used.
    SystemDefault,
    /// A caller-supplied default (e.g. a route-specific placeholder) was used.
    ProvidedDefault,
}

/// `(resolved_path, is_grouped, is_fallback, fallback_kind)` per
/// spec.md §3 — `is_fallback` is derived from `fallback` rather than
/// stored twice (`fallback != FallbackKind::None`), since the two can
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub path: PathBuf,
    /// `true` whenever this result came through the group-default
    /// mechanism (a directory's `default.*`), regardless of whether
    /// that was a direct group match (step 3, not a fallback) or the
    /// fallback chain's group rung (step 5).
    pub is_grouped: bool,
    pub fallback: FallbackKind,
}

impl ResolutionResult {
    pub fn is_fallback(&self) -> bool {
        self.fallback != FallbackKind::None
    }
}

pub struct FileResolver {
    asset_root: PathBuf,
    system_default_path: PathBuf,
    cache: Option<RwLock<HashMap<String, PathBuf>>>,
}

impl FileResolver {
    pub fn new(asset_root: impl Into<PathBuf>, system_default_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            system_default_path: system_default_path.into(),
            cache: None,
        }
    }

    /// Enable the in-memory resolution cache. Entries are never
    /// automatically invalidated by filesystem changes — callers that
    /// mutate the asset tree must call [`FileResolver::invalidate`] or
    /// [`FileResolver::invalidate_all`] themselves.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(RwLock::new(HashMap::new()));
        self
    }

    pub fn invalidate(&self, requested: &str) {
        if let Some(cache) = &self.cache {
            cache.write().unwrap().remove(requested);
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.write().unwrap().clear();
        }
    }

    /// Resolve a client-supplied, not-yet-sanitized path into an actual
    /// file on disk, walking the fallback chain on any miss.
    ///
    /// `provided_default`, when given, is tried after the system
    /// default and before giving up entirely.
    pub fn resolve(
        &self,
        requested: &str,
        provided_default: Option<&Path>,
    ) -> Result<ResolutionResult, ResolveError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.read().unwrap().get(requested) {
                return Ok(ResolutionResult {
                    path: hit.clone(),
                    is_grouped: false,
                    fallback: FallbackKind::None,
                });
            }
        }

        let result = self.resolve_uncached(requested, provided_default)?;

        // Only a non-fallback, non-grouped hit is cached: a fallback
        // result (or a group default reached via the request naming the
        // directory itself) can change the moment the asset tree gains
        // the file it's missing, and the cache has no invalidation
        // signal for that — caching it would pin a stale miss.
        if let (Some(cache), FallbackKind::None, false) =
            (&self.cache, result.fallback, result.is_grouped)
        {
            cache
                .write()
                .unwrap()
                .insert(requested.to_string(), result.path.clone());
        }

        Ok(result)
    }

    fn resolve_uncached(
        &self,
        requested: &str,
        provided_default: Option<&Path>,
    ) -> Result<ResolutionResult, ResolveError> {
        let sanitized = path_safety::sanitize(&self.asset_root, requested)?;

        if let Some(found) = self.find_exact_or_by_extension(&sanitized) {
            return Ok(ResolutionResult {
                path: found,
                is_grouped: false,
                fallback: FallbackKind::None,
            });
        }

        if sanitized.is_dir() {
            if let Some(found) = self.find_group_default(&sanitized) {
                return Ok(ResolutionResult {
                    path: found,
                    is_grouped: true,
                    fallback: FallbackKind::None,
                });
            }
        }

        if let Some(group_dir) = self.first_segment_group_dir(requested) {
            if let Some(found) = self.find_group_default(&group_dir) {
                return Ok(ResolutionResult {
                    path: found,
                    is_grouped: true,
                    fallback: FallbackKind::GroupDefault,
                });
            }
        }

        if self.system_default_path.is_file() {
            return Ok(ResolutionResult {
                path: self.system_default_path.clone(),
                is_grouped: false,
                fallback: FallbackKind::SystemDefault,
            });
        }

        if let Some(provided) = provided_default {
            if provided.is_file() {
                return Ok(ResolutionResult {
                    path: provided.to_path_buf(),
                    is_grouped: false,
                    fallback: FallbackKind::ProvidedDefault,
                });
            }
        }

        Err(ResolveError::NotFound)
    }

    /// Exact match if `sanitized` is already a file. If it carries a
    /// recognized extension but no such file exists, this is the end of
    /// the line for this rung — spec.md §4.3 step 4's extension-search
    /// only applies when the path has *no* extension at all, so
    /// `photo.png` missing on disk does not fall back to trying
    /// `photo.jpg`/`photo.webp`; it proceeds straight to the
    /// group/system-default fallback chain instead. Re-validates
    /// against the asset root after every filesystem hit, since a
    /// symlink can point outside the tree without the lexical sanitizer
    /// ever seeing a `..` component.
    fn find_exact_or_by_extension(&self, sanitized: &Path) -> Option<PathBuf> {
        if sanitized.is_file() {
            return self.confine(sanitized);
        }

        if sanitized.is_dir() {
            return None;
        }

        if path_has_recognized_extension(sanitized) {
            return None;
        }

        for ext in EXTENSION_PRIORITY {
            let candidate = sanitized.with_extension(ext);
            if candidate.is_file() {
                if let Some(confined) = self.confine(&candidate) {
                    return Some(confined);
                }
            }
        }
        None
    }

    /// The group directory used by the last-resort fallback (spec.md
    /// §4.3 step 5): the asset root joined with the *first* segment of
    /// the original request, used only when the request "looks
    /// grouped" — i.e. contains more than one segment. Distinct from
    /// the step-3 check (`sanitized.is_dir()`), which tests whether the
    /// whole sanitized path names a directory; this instead always
    /// walks back to the top-level segment regardless of nesting depth,
    /// matching the spec's literal wording ("take the first segment as
    /// a group name"), not the immediate parent of a deeper path.
    fn first_segment_group_dir(&self, requested: &str) -> Option<PathBuf> {
        let mut segments = requested.trim_start_matches('/').split('/');
        let first = segments.next().filter(|s| !s.is_empty())?;
        segments.next()?;
        Some(self.asset_root.join(first))
    }

    fn find_group_default(&self, dir: &Path) -> Option<PathBuf> {
        for ext in EXTENSION_PRIORITY {
            let candidate = dir.join(format!("{GROUP_DEFAULT_STEM}.{ext}"));
            if candidate.is_file() {
                if let Some(confined) = self.confine(&candidate) {
                    return Some(confined);
                }
            }
        }
        None
    }

    fn confine(&self, candidate: &Path) -> Option<PathBuf> {
        let canonical_root = fs::canonicalize(&self.asset_root).ok()?;
        let canonical = fs::canonicalize(candidate).ok()?;
        canonical.starts_with(&canonical_root).then_some(canonical)
    }

    /// Split a full URL path (already percent-decoded, slash-separated)
    /// into the file-path prefix C7 hands to [`FileResolver::resolve`]
    /// and the remaining parameter segments C4 classifies.
    ///
    /// The first segment always starts the prefix — a lone segment with
    /// no extension is still a candidate file-stem or group name (the
    /// resolver's own fallback chain disambiguates it), so it can never
    /// be mistaken for a parameter. If that first segment already ends
    /// in a recognized extension, it's the whole prefix. Otherwise,
    /// later segments join the prefix for as long as the path
    /// accumulated so far names a directory under the asset root or
    /// gains a recognized extension; the first segment that does
    /// neither starts the parameter suffix.
    pub fn split_request_path<'a>(&self, full_path: &'a str) -> (String, Vec<&'a str>) {
        let segments: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut prefix_len = 1;
        if !has_recognized_extension(segments[0]) {
            for segment in &segments[1..] {
                let candidate = segments[..prefix_len].join("/") + "/" + segment;
                let joined = self.asset_root.join(&candidate);
                if joined.is_dir() {
                    prefix_len += 1;
                } else if has_recognized_extension(segment) {
                    prefix_len += 1;
                    break;
                } else {
                    break;
                }
            }
        }

        let prefix = segments[..prefix_len].join("/");
        let params = segments[prefix_len..].to_vec();
        (prefix, params)
    }
}

fn has_recognized_extension(segment: &str) -> bool {
    match segment.rsplit_once('.') {
        Some((_, ext)) => EXTENSION_PRIORITY.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

fn path_has_recognized_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSION_PRIORITY.contains(&e.to_ascii_lowercase().as_str()))
}
