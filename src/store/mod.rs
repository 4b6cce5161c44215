pub mod sqlite;

use crate::app::Result;
use crate::domain::Entry;

pub use sqlite::SqliteStore;

/// Durable record of which entries have already been notified, keyed by
/// `(feed_name, entry_id)`. Shared by all pollers; implementations must be
/// safe for concurrent use.
pub trait Store: Send + Sync {
    /// Reflects every prior committed mark, including those from previous
    /// process lifetimes. An error must be propagated, never coerced to
    /// seen or not-seen.
    fn has_seen(&self, feed_name: &str, entry_id: &str) -> Result<bool>;

    /// Idempotent: marking the same key twice leaves exactly one record.
    fn mark_seen(&self, feed_name: &str, entry_id: &str, title: &str, link: &str) -> Result<()>;

    /// Batch variant used by first-run seeding; one transaction.
    fn mark_many_seen(&self, feed_name: &str, entries: &[Entry]) -> Result<usize>;

    /// Whether the feed's first polling cycle has completed.
    fn is_initialized(&self, feed_name: &str) -> Result<bool>;

    fn mark_initialized(&self, feed_name: &str) -> Result<()>;

    fn seen_count(&self, feed_name: Option<&str>) -> Result<i64>;
}
