//! # Feedwatch
//!
//! A daemon that watches RSS/Atom feeds and pushes matching entries to
//! Telegram.
//!
//! ## Architecture
//!
//! Feedwatch follows a per-feed pipeline architecture:
//!
//! ```text
//! Fetcher → Parser → Filter → Dedup Store → (Media) → Notifier
//! ```
//!
//! One independent task runs per configured feed, each on its own
//! interval. The only shared state is the dedup store, which records
//! every entry that has been notified so restarts never re-send.
//!
//! - [`fetcher`]: HTTP transport with cookies, proxy, and retries
//! - [`parser`]: Converts RSS/Atom documents to unified [`domain::Entry`] values
//! - [`filter`]: Per-feed composite predicate (keywords/categories/authors/regex)
//! - [`store`]: SQLite-backed seen-entry persistence
//! - [`media`]: Video URL discovery and best-effort download
//! - [`notify`]: Telegram Bot API client
//! - [`watcher`]: Scheduler and per-feed poll loop

/// Application context and error handling.
///
/// [`WatchContext`](app::WatchContext) wires together the components
/// shared by all pollers: store, fetcher, parser, notifier, downloader.
pub mod app;

/// Configuration management.
///
/// Loads a TOML file once at startup, applies `${VAR}` environment
/// substitution, and validates everything that could fail at runtime
/// (filter regexes included) so startup fails fast.
pub mod config;

/// Core domain models.
///
/// - [`Entry`](domain::Entry): one normalized feed item with a stable id
/// - [`MediaRef`](domain::MediaRef): a discovered downloadable media URL
pub mod domain;

/// Feed fetching over HTTP.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for feed transport
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Filter evaluation engine.
///
/// [`EntryFilter`](filter::EntryFilter) compiles a feed's
/// [`FilterSpec`](config::FilterSpec) once and evaluates entries with
/// AND-across-dimensions / OR-within-dimension semantics.
pub mod filter;

/// Media discovery and download.
pub mod media;

/// Outbound notifications.
///
/// - [`Notifier`](notify::Notifier): async trait for notification channels
/// - [`TelegramNotifier`](notify::TelegramNotifier): Bot API implementation
pub mod notify;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0 and Atom 0.3/1.0 into unified
/// [`Entry`](domain::Entry) structs via feed-rs.
pub mod parser;

/// Seen-entry persistence.
///
/// - [`Store`](store::Store): trait defining dedup operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Scheduler and per-feed poll loop.
pub mod watcher;
