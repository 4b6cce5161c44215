use std::sync::Arc;

use crate::app::{Result, WatchContext};
use crate::config::{DefaultsConfig, FeedConfig};
use crate::filter::EntryFilter;
use crate::media;

/// Per-feed polling unit: one full cycle is fetch → parse → process.
///
/// A cycle that fails (transport, parse, or store error) mutates nothing
/// and is retried on the feed's next interval.
pub struct FeedPoller {
    feed: Arc<FeedConfig>,
    filter: EntryFilter,
    ctx: Arc<WatchContext>,
    media_dir: Option<String>,
    media_all_entries: bool,
}

impl FeedPoller {
    pub fn new(
        feed: Arc<FeedConfig>,
        defaults: &DefaultsConfig,
        ctx: Arc<WatchContext>,
    ) -> Result<Self> {
        let filter = EntryFilter::new(&feed.filters)?;
        let media_dir = feed.media_dir(defaults).map(String::from);
        let media_all_entries = feed.media_all_entries(defaults);

        Ok(Self {
            feed,
            filter,
            ctx,
            media_dir,
            media_all_entries,
        })
    }

    pub fn feed_name(&self) -> &str {
        &self.feed.name
    }

    /// Run one polling cycle. Returns the number of notifications sent.
    pub async fn check(&self) -> Result<usize> {
        tracing::debug!("Checking feed: {}", self.feed.name);

        let body = self
            .ctx
            .fetcher
            .fetch(&self.feed.url, self.feed.cookies.as_ref())
            .await?;

        let entries = self.ctx.parser.parse(&self.feed.name, &body)?;

        if !self.ctx.store.is_initialized(&self.feed.name)? {
            return self.seed_first_run(&entries);
        }

        let mut notified = 0;

        // Feed-document order; notification order follows it.
        for entry in &entries {
            if self.ctx.store.has_seen(&self.feed.name, &entry.id)? {
                continue;
            }

            let accepted = self.filter.matches(entry);

            if let (Some(dir), Some(downloader)) = (&self.media_dir, &self.ctx.downloader) {
                if self.media_all_entries || (accepted && !media::media_refs(entry).is_empty()) {
                    downloader.download_entry(entry, dir).await;
                }
            }

            if !accepted {
                // Not marked seen: a later filter loosening may surface it.
                continue;
            }

            match self.ctx.notifier.notify(entry).await {
                Ok(()) => {
                    self.ctx
                        .store
                        .mark_seen(&self.feed.name, &entry.id, &entry.title, &entry.link)?;
                    notified += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to notify for entry '{}' in '{}': {}",
                        entry.display_title(),
                        self.feed.name,
                        e
                    );
                }
            }
        }

        if notified > 0 {
            tracing::info!(
                "Sent {} notification(s) for '{}'",
                notified,
                self.feed.name
            );
        }

        Ok(notified)
    }

    /// First cycle for a feed: mark currently-accepted entries as seen
    /// without notifying, so adding a feed doesn't flood the channel with
    /// its backlog.
    fn seed_first_run(&self, entries: &[crate::domain::Entry]) -> Result<usize> {
        let mut to_seed = Vec::new();
        for entry in entries {
            if self.ctx.store.has_seen(&self.feed.name, &entry.id)? {
                continue;
            }
            if self.filter.matches(entry) {
                to_seed.push(entry.clone());
            }
        }

        if !to_seed.is_empty() {
            let seeded = self.ctx.store.mark_many_seen(&self.feed.name, &to_seed)?;
            tracing::info!(
                "New feed detected: marked {} existing entr{} as seen for '{}'",
                seeded,
                if seeded == 1 { "y" } else { "ies" },
                self.feed.name
            );
        }
        self.ctx.store.mark_initialized(&self.feed.name)?;

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::app::FeedwatchError;
    use crate::config::{FilterSpec, KeywordRule};
    use crate::domain::Entry;
    use crate::fetcher::Fetcher;
    use crate::notify::Notifier;
    use crate::parser::FeedParser;
    use crate::store::{SqliteStore, Store};

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <item>
      <title>Learning Rust basics</title>
      <link>https://example.com/rust</link>
      <guid>item-rust</guid>
      <description>Intro post</description>
    </item>
    <item>
      <title>Python only</title>
      <link>https://example.com/python</link>
      <guid>item-python</guid>
      <description>Another post</description>
    </item>
  </channel>
</rss>"#;

    struct StaticFetcher {
        body: Vec<u8>,
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _cookies: Option<&HashMap<String, String>>,
        ) -> Result<Vec<u8>> {
            Ok(self.body.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn test_connection(&self) -> bool {
            true
        }

        async fn notify(&self, entry: &Entry) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FeedwatchError::Notify("channel down".into()));
            }
            self.sent.lock().unwrap().push(entry.id.clone());
            Ok(())
        }
    }

    struct FailingStore;

    impl Store for FailingStore {
        fn has_seen(&self, _feed: &str, _entry: &str) -> Result<bool> {
            Err(FeedwatchError::Other("disk unavailable".into()))
        }
        fn mark_seen(&self, _f: &str, _e: &str, _t: &str, _l: &str) -> Result<()> {
            Err(FeedwatchError::Other("disk unavailable".into()))
        }
        fn mark_many_seen(&self, _f: &str, _entries: &[Entry]) -> Result<usize> {
            Err(FeedwatchError::Other("disk unavailable".into()))
        }
        fn is_initialized(&self, _f: &str) -> Result<bool> {
            Ok(true)
        }
        fn mark_initialized(&self, _f: &str) -> Result<()> {
            Ok(())
        }
        fn seen_count(&self, _f: Option<&str>) -> Result<i64> {
            Ok(0)
        }
    }

    fn feed_config(filters: FilterSpec) -> Arc<FeedConfig> {
        Arc::new(FeedConfig {
            name: "feed1".into(),
            url: "https://example.com/feed.xml".into(),
            check_interval: None,
            filters,
            enabled: true,
            cookies: None,
            media_dir: None,
            media_all_entries: None,
        })
    }

    fn context(
        store: Arc<dyn Store>,
        notifier: Arc<RecordingNotifier>,
        body: &str,
    ) -> Arc<WatchContext> {
        Arc::new(WatchContext {
            store,
            fetcher: Arc::new(StaticFetcher {
                body: body.as_bytes().to_vec(),
            }),
            parser: FeedParser::new(),
            notifier,
            downloader: None,
        })
    }

    fn poller(filters: FilterSpec, ctx: Arc<WatchContext>) -> FeedPoller {
        FeedPoller::new(feed_config(filters), &DefaultsConfig::default(), ctx).unwrap()
    }

    fn rust_only_filter() -> FilterSpec {
        FilterSpec {
            keywords: KeywordRule {
                include: vec!["rust".into()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_run_seeds_without_notifying() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(FilterSpec::default(), ctx);

        assert_eq!(poller.check().await.unwrap(), 0);

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert!(store.is_initialized("feed1").unwrap());
        assert!(store.has_seen("feed1", "item-rust").unwrap());
        assert!(store.has_seen("feed1", "item-python").unwrap());

        // Next cycle is quiet: everything was seeded.
        assert_eq!(poller.check().await.unwrap(), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_run_does_not_seed_filtered_entries() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(rust_only_filter(), ctx);

        poller.check().await.unwrap();

        assert!(store.has_seen("feed1", "item-rust").unwrap());
        assert!(!store.has_seen("feed1", "item-python").unwrap());
    }

    #[tokio::test]
    async fn test_new_entries_notified_in_document_order() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        store.mark_initialized("feed1").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(FilterSpec::default(), ctx);

        assert_eq!(poller.check().await.unwrap(), 2);

        assert_eq!(
            *notifier.sent.lock().unwrap(),
            vec!["item-rust".to_string(), "item-python".to_string()]
        );
        assert!(store.has_seen("feed1", "item-rust").unwrap());
    }

    #[tokio::test]
    async fn test_already_seen_entry_skipped_without_notify() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        store.mark_initialized("feed1").unwrap();
        store.mark_seen("feed1", "item-rust", "", "").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(FilterSpec::default(), ctx);

        assert_eq!(poller.check().await.unwrap(), 1);
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["item-python".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_entry_not_notified_and_not_marked() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        store.mark_initialized("feed1").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(rust_only_filter(), ctx);

        assert_eq!(poller.check().await.unwrap(), 1);

        assert_eq!(*notifier.sent.lock().unwrap(), vec!["item-rust".to_string()]);
        // Rejected entry stays unseen so a loosened filter can surface it.
        assert!(!store.has_seen("feed1", "item-python").unwrap());
    }

    #[tokio::test]
    async fn test_notify_failure_leaves_entry_unseen_and_retries() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        store.mark_initialized("feed1").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail.store(true, Ordering::SeqCst);
        let ctx = context(store.clone(), notifier.clone(), RSS_SAMPLE);
        let poller = poller(FilterSpec::default(), ctx);

        // Failed dispatch: cycle completes, nothing marked.
        assert_eq!(poller.check().await.unwrap(), 0);
        assert!(!store.has_seen("feed1", "item-rust").unwrap());

        // Channel recovers: entries are re-offered on the next cycle.
        notifier.fail.store(false, Ordering::SeqCst);
        assert_eq!(poller.check().await.unwrap(), 2);
        assert!(store.has_seen("feed1", "item-rust").unwrap());
    }

    #[tokio::test]
    async fn test_store_error_skips_cycle_before_notifying() {
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(Arc::new(FailingStore), notifier.clone(), RSS_SAMPLE);
        let poller = poller(FilterSpec::default(), ctx);

        assert!(poller.check().await.is_err());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_document_is_cycle_error() {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), "not a feed");
        let poller = poller(FilterSpec::default(), ctx);

        assert!(poller.check().await.is_err());
        assert!(!store.is_initialized("feed1").unwrap());
    }

    #[tokio::test]
    async fn test_empty_feed_marks_initialized() {
        const EMPTY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let store: Arc<SqliteStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = context(store.clone(), notifier.clone(), EMPTY);
        let poller = poller(FilterSpec::default(), ctx);

        assert_eq!(poller.check().await.unwrap(), 0);
        assert!(store.is_initialized("feed1").unwrap());
    }
}
