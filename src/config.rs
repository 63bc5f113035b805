//! Service configuration.
//!
//! Loaded from an optional `config.toml` next to the binary (or at a
//! path given on the CLI), following the teacher's `SiteConfig`/
//! `load_config` shape: every field defaulted, `serde(default)`
//! everywhere, a missing file silently yields defaults rather than an
//! error. The `confique`/`clapfig` dependencies the teacher's own
//! `Cargo.toml` carried for this are dropped here — grepping the
//! teacher's `src/` shows neither was ever actually called; the real
//! loading path was always plain `serde` + `toml`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! asset_root = "content"
//! cache_root = ".imgforge-cache"
//! system_default_path = "content/system-default.jpg"
//! bind_addr = "127.0.0.1:8080"
//! dev_mode = false
//!
//! [pre_cache]
//! enabled = false
//! workers = 4              # omit for auto = CPU cores
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level service configuration.
///
/// `dev_mode` widens error detail in the HTTP error-response glue
/// (`error.rs`) only — it is a config field, not a process-wide mutable
/// static, per the Design Notes' instruction to keep global state out of
/// the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub asset_root: PathBuf,
    pub cache_root: PathBuf,
    pub system_default_path: PathBuf,
    pub bind_addr: String,
    pub dev_mode: bool,
    pub pre_cache: PreCacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("content"),
            cache_root: PathBuf::from(".imgforge-cache"),
            system_default_path: PathBuf::from("content/system-default.jpg"),
            bind_addr: "127.0.0.1:8080".to_string(),
            dev_mode: false,
            pre_cache: PreCacheConfig::default(),
        }
    }
}

/// Pre-cache warm-up settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreCacheConfig {
    /// Whether `serve` runs a warm-up pass before accepting traffic.
    pub enabled: bool,
    /// Worker pool size. `None`, `Some(0)`, or a negative value in the
    /// TOML source all mean "use all available cores"; values larger
    /// than the core count are clamped down, never up.
    pub workers: Option<usize>,
}

impl Default for PreCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: None,
        }
    }
}

/// Resolve the effective worker-pool size from config.
///
/// `0` is treated the same as `None` (hardware concurrency) rather than
/// a literal zero-worker pool, since a worker count of zero would never
/// process anything — `0`/absent both mean "auto" per the config docs.
pub fn effective_workers(config: &PreCacheConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match config.workers {
        None | Some(0) => cores,
        Some(n) => n.min(cores),
    }
}

/// Load `config.toml` from `root`, or return defaults if it's absent.
pub fn load_config(root: &Path) -> Result<ServiceConfig, ConfigError> {
    let config_path = root.join("config.toml");
    if !config_path.exists() {
        return Ok(ServiceConfig::default());
    }

    let content = fs::read_to_string(&config_path)?;
    let config: ServiceConfig = toml::from_str(&content)?;
    Ok(config)
}

/// A fully-documented stock `config.toml`, for the `gen-config` subcommand.
pub fn stock_config_toml() -> String {
    r#"# imgforge configuration. Every field is optional; the values
# below are the defaults imgforge uses when this file is absent or a
# field is omitted.

# Directory tree of source images to serve transforms of.
asset_root = "content"

# Directory where transformed variants are cached, content-addressed.
cache_root = ".imgforge-cache"

# Served whenever a requested asset and every group default are
# missing. Never itself subject to path-safety rejection.
system_default_path = "content/system-default.jpg"

# Address the HTTP server binds to.
bind_addr = "127.0.0.1:8080"

# Widens error detail in HTTP responses. Leave false in production.
dev_mode = false

[pre_cache]
# Run a warm-up pass over the whole asset tree before `serve` starts
# accepting traffic.
enabled = false

# Worker pool size for the warm-up pass. Omit for "all available cores".
# workers = 4
"#
    .to_string()
}
