//! The Pre-cache Executor: warms the cache for an entire asset tree
//! ahead of traffic, at a single fixed set of warm-up parameters.
//!
//! Uses a bounded channel plus a fixed-size worker group rather than a
//! data-parallel iterator — see DESIGN.md's note on why `rayon` was
//! dropped in favor of `tokio` tasks draining a `tokio::sync::mpsc`
//! queue, which is the natural shape for a `tokio`-hosted service. The
//! worker-count policy (clamp to available cores, never exceed it)
//! mirrors the teacher's `config::effective_threads`/`main::
//! init_thread_pool`; the `WalkDir`-based scan mirrors
//! `other_examples/.../imgproxy/cache.rs`'s `run_cleanup`.

use crate::cache::CacheStore;
use crate::fingerprint::fingerprint;
use crate::imaging::backend::Codec;
use crate::params::{OutputFormat, TransformParams};
use crate::resolver::{FileResolver, EXTENSION_PRIORITY};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PrecacheError {
    #[error("asset root {0} does not exist or is not a directory")]
    AssetRootMissing(PathBuf),
}

/// The single, fixed transform applied during warm-up. Spec-mandated,
/// not configurable: 1000x1000, WebP, quality 95.
pub const WARMUP_PARAMS: TransformParams = TransformParams {
    width: 1000,
    height: 1000,
    format: OutputFormat::Webp,
    quality: 95,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheStats {
    pub scanned: usize,
    pub warmed: usize,
    pub skipped_already_cached: usize,
    pub failed: usize,
}

/// Observer for a pre-cache run. Methods are called from whichever
/// worker task happens to finish a unit of work, so implementations
/// must be `Send + Sync`.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, total: usize);
    fn item_done(&self, processed: usize, total: usize);
    fn item_failed(&self, path: &Path, message: &str);
    fn complete(&self, stats: &PrecacheStats);
}

/// `println!`-based reporter for CLI invocations, matching the texture
/// of the teacher's own tree-printing `output.rs`.
pub struct TerminalReporter;

impl ProgressReporter for TerminalReporter {
    fn start(&self, total: usize) {
        println!("==> Pre-caching {total} assets");
    }

    fn item_done(&self, processed: usize, total: usize) {
        if processed % 50 == 0 || processed == total {
            println!("    {processed}/{total}");
        }
    }

    fn item_failed(&self, path: &Path, message: &str) {
        println!("    FAILED {}: {message}", path.display());
    }

    fn complete(&self, stats: &PrecacheStats) {
        println!(
            "==> Pre-cache complete: {} warmed, {} already cached, {} failed",
            stats.warmed, stats.skipped_already_cached, stats.failed
        );
    }
}

/// `tracing`-based reporter for the long-running server process.
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn start(&self, total: usize) {
        tracing::info!(total, "pre-cache started");
    }

    fn item_done(&self, processed: usize, total: usize) {
        tracing::debug!(processed, total, "pre-cache progress");
    }

    fn item_failed(&self, path: &Path, message: &str) {
        tracing::warn!(path = %path.display(), message, "pre-cache item failed");
    }

    fn complete(&self, stats: &PrecacheStats) {
        tracing::info!(
            warmed = stats.warmed,
            skipped = stats.skipped_already_cached,
            failed = stats.failed,
            "pre-cache complete"
        );
    }
}

/// The cache-directory request-path component for a scanned asset: its
/// path relative to the asset root, using forward slashes regardless of
/// platform so it matches the request-path shape the HTTP layer uses.
fn request_path_for(asset_root: &Path, path: &Path) -> String {
    path.strip_prefix(asset_root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct PrecacheExecutor<C: Codec> {
    asset_root: PathBuf,
    system_default_path: PathBuf,
    resolver: Arc<FileResolver>,
    cache: Arc<CacheStore>,
    codec: Arc<C>,
    workers: usize,
}

impl<C: Codec + Send + 'static> PrecacheExecutor<C> {
    /// `resolver` is spec.md §4.8's "resolver" input: every scanned path
    /// is resolved through it before fingerprinting, so the warm-up key
    /// matches the canonicalized, confined path the serving pipeline
    /// (C3 via `resolver::resolve`) fingerprints at request time — not
    /// the raw, possibly-relative path `WalkDir` happened to hand back.
    pub fn new(
        asset_root: impl Into<PathBuf>,
        system_default_path: impl Into<PathBuf>,
        resolver: FileResolver,
        cache: Arc<CacheStore>,
        codec: Arc<C>,
        workers: usize,
    ) -> Self {
        Self {
            asset_root: asset_root.into(),
            system_default_path: system_default_path.into(),
            resolver: Arc::new(resolver),
            cache,
            codec,
            workers: workers.max(1),
        }
    }

    /// Every file under `asset_root` with a recognized extension,
    /// excluding `system_default_path` itself. Group-default files
    /// (`default.*`) ARE included — only the system-wide default is
    /// excluded from warm-up, per spec.
    fn scan(&self) -> Vec<PathBuf> {
        let system_default = self.system_default_path.canonicalize().ok();

        WalkDir::new(&self.asset_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| has_recognized_extension(entry.path()))
            .filter(|entry| {
                entry
                    .path()
                    .canonicalize()
                    .ok()
                    .is_none_or(|p| Some(p) != system_default)
            })
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Run the warm-up pass. Per-image failures are isolated and
    /// counted and never abort the run; a missing asset root is the one
    /// failure that aborts the whole run before any work is scheduled.
    pub async fn run(
        &self,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<PrecacheStats, PrecacheError> {
        if !self.asset_root.is_dir() {
            return Err(PrecacheError::AssetRootMissing(self.asset_root.clone()));
        }

        let files = self.scan();
        let total = files.len();
        reporter.start(total);

        let (tx, rx) = mpsc::channel::<PathBuf>(self.workers * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let scanned = Arc::new(AtomicUsize::new(0));
        let warmed = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let feeder = {
            let tx = tx.clone();
            tokio::spawn(async move {
                for file in files {
                    if tx.send(file).await.is_err() {
                        break;
                    }
                }
            })
        };
        drop(tx);

        // Each worker is its own `tokio::spawn`ed task, not a future
        // polled sequentially by this one — a `Vec` of plain futures
        // awaited one at a time would let the first worker drain the
        // whole channel by itself before the others are ever polled,
        // defeating the pool entirely.
        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let rx = Arc::clone(&rx);
            let cache = Arc::clone(&self.cache);
            let codec = Arc::clone(&self.codec);
            let resolver = Arc::clone(&self.resolver);
            let reporter = Arc::clone(&reporter);
            let asset_root = self.asset_root.clone();
            let scanned = Arc::clone(&scanned);
            let warmed = Arc::clone(&warmed);
            let skipped = Arc::clone(&skipped);
            let failed = Arc::clone(&failed);
            let processed = Arc::clone(&processed);

            handles.push(tokio::spawn(async move {
                loop {
                    let path = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(path) = path else { break };

                    scanned.fetch_add(1, Ordering::Relaxed);
                    match warm_one(&asset_root, &path, &resolver, &cache, &codec).await {
                        Ok(true) => {
                            warmed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(message) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            reporter.item_failed(&path, &message);
                        }
                    }
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.item_done(done, total);
                }
            }));
        }

        let _ = feeder.await;
        for handle in handles {
            let _ = handle.await;
        }

        let stats = PrecacheStats {
            scanned: scanned.load(Ordering::Relaxed),
            warmed: warmed.load(Ordering::Relaxed),
            skipped_already_cached: skipped.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        reporter.complete(&stats);
        Ok(stats)
    }
}

/// Warm a single file: skip if already cached, otherwise transform and
/// store. Returns `Ok(true)` if it was freshly warmed, `Ok(false)` if it
/// was already cached, `Err(message)` if the transform or I/O failed —
/// isolated per-image, never aborting the overall run.
///
/// Resolves `path` through `resolver` before fingerprinting: the
/// serving pipeline fingerprints the canonicalized, confined path
/// `FileResolver::resolve` produces (`path_safety::sanitize`/`confine`
/// both `fs::canonicalize`), not the raw `WalkDir` path relative to
/// whatever form `asset_root` happens to take. Fingerprinting the raw
/// path here would key every warm-up entry under a hash the serve path
/// never recomputes, making the warm cache dead weight.
async fn warm_one<C: Codec>(
    asset_root: &Path,
    path: &Path,
    resolver: &FileResolver,
    cache: &CacheStore,
    codec: &C,
) -> Result<bool, String> {
    let request_path = request_path_for(asset_root, path);
    let resolution = resolver
        .resolve(&request_path, None)
        .map_err(|e| format!("resolve failed: {e}"))?;
    let key = fingerprint(&resolution.path, &WARMUP_PARAMS);

    match cache.retrieve(&request_path, &key) {
        Ok(Some(_)) => return Ok(false),
        Ok(None) => {}
        Err(e) => return Err(format!("cache read failed: {e}")),
    }

    let bytes = tokio::fs::read(&resolution.path)
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    let output = codec
        .transform(&bytes, &WARMUP_PARAMS)
        .map_err(|e| format!("transform failed: {e}"))?;
    cache
        .store(&request_path, &key, &output)
        .map_err(|e| format!("cache write failed: {e}"))?;

    Ok(true)
}

fn has_recognized_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| EXTENSION_PRIORITY.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockCodec;
    use std::fs;
    use tempfile::TempDir;

    struct NullReporter;
    impl ProgressReporter for NullReporter {
        fn start(&self, _total: usize) {}
        fn item_done(&self, _processed: usize, _total: usize) {}
        fn item_failed(&self, _path: &Path, _message: &str) {}
        fn complete(&self, _stats: &PrecacheStats) {}
    }

    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = JPEG_MAGIC.to_vec();
        bytes.extend_from_slice(b"body");
        bytes
    }

    #[tokio::test]
    async fn warms_every_recognized_file() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("a.jpg"), jpeg_bytes()).unwrap();
        fs::write(assets.join("b.png"), jpeg_bytes()).unwrap();
        fs::write(assets.join("notes.txt"), b"ignore me").unwrap();

        let default_path = tmp.path().join("no-system-default");
        let executor = PrecacheExecutor::new(
            &assets,
            &default_path,
            FileResolver::new(&assets, &default_path),
            Arc::new(CacheStore::new(tmp.path().join("cache"))),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            2,
        );

        let stats = executor.run(Arc::new(NullReporter)).await.unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.warmed, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn excludes_the_system_default_from_the_scan() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        let default_path = assets.join("system-default.jpg");
        fs::write(&default_path, jpeg_bytes()).unwrap();
        fs::write(assets.join("a.jpg"), jpeg_bytes()).unwrap();

        let executor = PrecacheExecutor::new(
            &assets,
            &default_path,
            FileResolver::new(&assets, &default_path),
            Arc::new(CacheStore::new(tmp.path().join("cache"))),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            2,
        );

        let stats = executor.run(Arc::new(NullReporter)).await.unwrap();
        assert_eq!(stats.scanned, 1);
    }

    #[tokio::test]
    async fn skips_entries_already_cached() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("a.jpg"), jpeg_bytes()).unwrap();

        let cache = Arc::new(CacheStore::new(tmp.path().join("cache")));
        // Keyed on the canonicalized path, matching what `warm_one`
        // fingerprints via the resolver — not the raw joined path.
        let key = fingerprint(&assets.join("a.jpg").canonicalize().unwrap(), &WARMUP_PARAMS);
        cache.store("a.jpg", &key, b"already warm").unwrap();

        let default_path = tmp.path().join("no-system-default");
        let executor = PrecacheExecutor::new(
            &assets,
            &default_path,
            FileResolver::new(&assets, &default_path),
            Arc::clone(&cache),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            2,
        );

        let stats = executor.run(Arc::new(NullReporter)).await.unwrap();
        assert_eq!(stats.skipped_already_cached, 1);
        assert_eq!(stats.warmed, 0);
    }

    #[tokio::test]
    async fn isolates_per_image_failures() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("bad.jpg"), b"not a real image").unwrap();
        fs::write(assets.join("good.jpg"), jpeg_bytes()).unwrap();

        let default_path = tmp.path().join("no-system-default");
        let executor = PrecacheExecutor::new(
            &assets,
            &default_path,
            FileResolver::new(&assets, &default_path),
            Arc::new(CacheStore::new(tmp.path().join("cache"))),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            2,
        );

        let stats = executor.run(Arc::new(NullReporter)).await.unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.warmed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn missing_asset_root_aborts_the_whole_run() {
        let tmp = TempDir::new().unwrap();
        let missing_assets = tmp.path().join("does-not-exist");

        let default_path = tmp.path().join("no-system-default");
        let executor = PrecacheExecutor::new(
            &missing_assets,
            &default_path,
            FileResolver::new(&missing_assets, &default_path),
            Arc::new(CacheStore::new(tmp.path().join("cache"))),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            2,
        );

        assert!(matches!(
            executor.run(Arc::new(NullReporter)).await,
            Err(PrecacheError::AssetRootMissing(_))
        ));
    }

    #[tokio::test]
    async fn warmed_entries_are_keyed_on_the_resolved_canonical_path() {
        // Regression: warm_one must fingerprint the path `resolver`
        // hands back (canonicalized, confined), not the raw path
        // `WalkDir` produced relative to `asset_root` — otherwise the
        // serve-time fingerprint (computed from the resolver's
        // canonical path) never matches what pre-cache stored.
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("a.jpg"), jpeg_bytes()).unwrap();

        let default_path = tmp.path().join("no-system-default");
        let resolver = FileResolver::new(&assets, &default_path);
        let cache = Arc::new(CacheStore::new(tmp.path().join("cache")));
        let executor = PrecacheExecutor::new(
            &assets,
            &default_path,
            FileResolver::new(&assets, &default_path),
            Arc::clone(&cache),
            Arc::new(MockCodec::new(b"warmed".to_vec())),
            1,
        );

        executor.run(Arc::new(NullReporter)).await.unwrap();

        let resolved = resolver.resolve("a.jpg", None).unwrap();
        let expected_key = fingerprint(&resolved.path, &WARMUP_PARAMS);
        assert_eq!(
            cache.retrieve("a.jpg", &expected_key).unwrap(),
            Some(b"warmed".to_vec())
        );
    }
}
