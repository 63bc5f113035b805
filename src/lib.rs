//! # imgforge
//!
//! An on-demand image transformation and caching HTTP service. Images
//! live in a plain directory tree; a request path names an asset plus,
//! optionally, a resize/format/quality transform to apply to it. The
//! first request for a given asset/transform pair pays the decode and
//! encode cost; every later request for the same pair is served
//! straight off disk from a content-addressed cache.
//!
//! # Never 404
//!
//! A request for a missing asset, an unreadable path, or a transform
//! the decoder rejects does not become an HTTP error if a fallback is
//! available: the service substitutes a directory's `default.*`, then
//! the service-wide system default, before finally giving up. Only a
//! missing system default turns a miss into a real error.
//!
//! # Request Lifecycle
//!
//! ```text
//! GET /albums/tokyo/skyline.jpg/800x600/webp/q80
//!      └──────────┬──────────┘ └──────┬──────┘
//!            asset path          transform params
//! ```
//!
//! 1. [`resolver::FileResolver::split_request_path`] divides the URL
//!    into the asset-path prefix and the parameter suffix.
//! 2. [`params::parse_segments`] classifies each parameter segment
//!    permissively — unrecognized segments are dropped, not rejected.
//! 3. [`path_safety::sanitize`] confines the asset path to the asset
//!    root, rejecting traversal and symlink escapes.
//! 4. [`resolver::FileResolver::resolve`] walks the fallback chain:
//!    exact match → extension auto-detection → group default → system
//!    default → caller-provided default.
//! 5. [`fingerprint::fingerprint`] derives the cache key from the
//!    resolved path and the parsed transform parameters.
//! 6. [`cache::CacheStore`] is checked before paying the cost of
//!    [`imaging::backend::Codec::transform`], and written to after.
//!
//! [`pipeline::RequestPipeline`] orchestrates all of the above behind a
//! single `serve_url` entry point; [`server`] is the thin `axum` layer
//! that calls it.
//!
//! # Pre-caching
//!
//! [`precache::PrecacheExecutor`] walks the whole asset tree and warms
//! the cache at a single fixed set of parameters ahead of traffic,
//! either as a one-shot CLI run or as a startup phase before `serve`
//! begins accepting connections.

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod imaging;
pub mod params;
pub mod path_safety;
pub mod pipeline;
pub mod precache;
pub mod resolver;
pub mod server;
