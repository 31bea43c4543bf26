//! # pixiv-courier
//!
//! Polls a pixiv follow feed and emails each new illustration exactly once,
//! with its image pages attached.
//!
//! ## Architecture
//!
//! One run is a sequential pipeline:
//!
//! ```text
//! Token → Feed → (per item) Media → Notification → Delivery → Cache
//! ```
//!
//! The cache only advances past an item after its notification has been
//! accepted by the mail server, so items are never lost and never delivered
//! twice across clean runs.
//!
//! ## Quick Start
//!
//! ```bash
//! # One polling run (configuration comes from the environment)
//! pixiv-courier sync
//!
//! # Inspect the cache without network access
//! pixiv-courier status
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires together config, cache, provider
/// client and media downloader.
pub mod app;

/// Token lifecycle: reuse the cached credential, refresh on expiry.
pub mod auth;

/// Durable seen-set and credential cache, one JSON file rewritten in full
/// on every mutation.
pub mod cache;

/// Command-line interface using clap.
///
/// - `sync` - one polling run
/// - `status` - cache introspection
pub mod cli;

/// Environment-variable configuration surface.
pub mod config;

/// Core domain models.
///
/// - [`Illust`](domain::Illust): one feed item with its page layout
/// - [`Credential`](domain::Credential): cached bearer token
pub mod domain;

/// Notification assembly and SMTP delivery, including the size-rejection
/// fallback that resends without attachments.
pub mod mailer;

/// External downloader invocation and local page-path resolution.
pub mod media;

/// Provider API client for token refresh and the follow feed.
pub mod pixiv;

/// The per-run orchestration loop.
pub mod sync;
