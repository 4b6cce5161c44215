use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, COOKIE};
use reqwest::{Client, Proxy};

use crate::app::{FeedwatchError, Result};
use crate::fetcher::Fetcher;

const USER_AGENT: &str = concat!("feedwatch/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, max_retries: u32, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT);

        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                FeedwatchError::Config(format!("invalid proxy url '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }
}

fn cookie_header(cookies: &HashMap<String, String>) -> Option<HeaderValue> {
    let joined = cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&joined).ok()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        cookies: Option<&HashMap<String, String>>,
    ) -> Result<Vec<u8>> {
        let mut last_error: Option<FeedwatchError> = None;

        for attempt in 1..=self.max_retries {
            let mut request = self.client.get(url);
            if let Some(value) = cookies.and_then(cookie_header) {
                request = request.header(COOKIE, value);
            }

            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => {
                    let body = response.bytes().await?.to_vec();
                    return Ok(body);
                }
                Err(e) => {
                    tracing::warn!(
                        "Fetch attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_retries,
                        url,
                        e
                    );
                    last_error = Some(e.into());
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| FeedwatchError::Other(format!("fetch failed for {}", url))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_joins_pairs() {
        let mut cookies = HashMap::new();
        cookies.insert("session".to_string(), "abc".to_string());
        let value = cookie_header(&cookies).unwrap();
        assert_eq!(value.to_str().unwrap(), "session=abc");
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        assert!(HttpFetcher::new(30, 3, Some("not a url")).is_err());
    }

    #[test]
    fn test_builds_without_proxy() {
        assert!(HttpFetcher::new(30, 3, None).is_ok());
    }
}
