pub mod http_fetcher;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;

/// Transport boundary for feed polling. Retries, proxying, and cookie
/// injection live behind this trait; pollers only see bytes or an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, cookies: Option<&HashMap<String, String>>)
        -> Result<Vec<u8>>;
}
