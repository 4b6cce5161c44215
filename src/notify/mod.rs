pub mod telegram;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Entry;

pub use telegram::TelegramNotifier;

/// Outbound notification channel. Formatting and wire protocol live behind
/// this trait; the poller only sees success or failure per entry.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Verify the channel is reachable before any poller starts.
    async fn test_connection(&self) -> bool;

    /// Dispatch one entry. An error means the entry must not be marked
    /// seen; it will be retried on the feed's next cycle.
    async fn notify(&self, entry: &Entry) -> Result<()>;
}
