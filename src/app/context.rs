use std::sync::Arc;

use crate::app::Result;
use crate::config::Config;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::media::MediaDownloader;
use crate::notify::{Notifier, TelegramNotifier};
use crate::parser::FeedParser;
use crate::store::{SqliteStore, Store};

/// Download timeout is independent of the feed-fetch timeout; media files
/// are large.
const MEDIA_TIMEOUT_SECS: u64 = 300;

/// Wires together the components shared by all pollers.
pub struct WatchContext {
    pub store: Arc<dyn Store>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: FeedParser,
    pub notifier: Arc<dyn Notifier>,
    pub downloader: Option<Arc<MediaDownloader>>,
}

impl WatchContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&config.storage.database_path)?);

        let proxy = config.defaults.proxy.as_deref();
        if let Some(proxy_url) = proxy {
            tracing::info!(
                "Using proxy: {}",
                proxy_url.rsplit('@').next().unwrap_or(proxy_url)
            );
        }

        let fetcher = Arc::new(HttpFetcher::new(
            config.defaults.request_timeout,
            config.defaults.max_retries,
            proxy,
        )?);

        let notifier = Arc::new(TelegramNotifier::new(config.telegram.clone(), proxy)?);

        let downloader = if config
            .feeds
            .iter()
            .any(|f| f.media_dir(&config.defaults).is_some())
        {
            Some(Arc::new(MediaDownloader::new(MEDIA_TIMEOUT_SECS, proxy)?))
        } else {
            None
        };

        Ok(Self {
            store,
            fetcher,
            parser: FeedParser::new(),
            notifier,
            downloader,
        })
    }
}
