//! Telegram notification client speaking the Bot API directly.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Proxy};
use serde::Deserialize;
use serde_json::json;

use crate::app::{FeedwatchError, Result};
use crate::config::TelegramConfig;
use crate::domain::Entry;
use crate::notify::Notifier;

const MAX_MESSAGE_LENGTH: usize = 4096;
const MAX_SUMMARY_LENGTH: usize = 500;
const MAX_TAGS: usize = 5;

pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));

        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                FeedwatchError::Config(format!("invalid proxy url '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    fn format_entry(&self, entry: &Entry) -> String {
        if self.config.parse_mode == "HTML" {
            format_html(entry)
        } else {
            format_markdown(entry)
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<ApiResponse> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await?;

        let api: ApiResponse = response.json().await?;
        Ok(api)
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": self.config.disable_web_page_preview,
        });

        let api = self.call("sendMessage", body.clone()).await?;
        if api.ok {
            return Ok(());
        }

        // Rate limited: wait out retry_after and try once more.
        if let Some(secs) = api.parameters.and_then(|p| p.retry_after) {
            tracing::warn!("Telegram rate limit, waiting {} seconds", secs);
            tokio::time::sleep(Duration::from_secs(secs)).await;

            let retried = self.call("sendMessage", body).await?;
            if retried.ok {
                return Ok(());
            }
            return Err(FeedwatchError::Notify(
                retried.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }

        Err(FeedwatchError::Notify(
            api.description.unwrap_or_else(|| "unknown error".into()),
        ))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn test_connection(&self) -> bool {
        match self.call("getMe", json!({})).await {
            Ok(api) if api.ok => {
                let username = api
                    .result
                    .as_ref()
                    .and_then(|r| r.get("username"))
                    .and_then(|u| u.as_str())
                    .unwrap_or("unknown");
                tracing::info!("Connected to Telegram as @{}", username);
                true
            }
            Ok(api) => {
                tracing::error!(
                    "Failed to connect to Telegram: {}",
                    api.description.unwrap_or_else(|| "unknown error".into())
                );
                false
            }
            Err(e) => {
                tracing::error!("Failed to connect to Telegram: {}", e);
                false
            }
        }
    }

    async fn notify(&self, entry: &Entry) -> Result<()> {
        let message = self.format_entry(entry);
        self.send_message(&message).await?;
        tracing::info!("Sent notification for: {}", entry.display_title());
        Ok(())
    }
}

fn format_html(entry: &Entry) -> String {
    use html_escape::encode_text;

    let mut parts = Vec::new();

    parts.push(format!("<b>[{}]</b>", encode_text(&entry.feed_name)));

    let title = if entry.title.is_empty() {
        "No title".to_string()
    } else {
        encode_text(&entry.title).to_string()
    };
    if entry.link.is_empty() {
        parts.push(format!("\n<b>{}</b>", title));
    } else {
        parts.push(format!(
            "\n<b><a href=\"{}\">{}</a></b>",
            encode_text(&entry.link),
            title
        ));
    }

    if !entry.author.is_empty() {
        parts.push(format!("\n<i>by {}</i>", encode_text(&entry.author)));
    }

    if !entry.categories.is_empty() {
        let tags = entry
            .categories
            .iter()
            .take(MAX_TAGS)
            .map(|c| format!("#{}", encode_text(&c.replace(' ', "_"))))
            .collect::<Vec<_>>()
            .join(" ");
        parts.push(format!("\n{}", tags));
    }

    if !entry.content.is_empty() {
        let summary = truncate(&clean_content(&entry.content), MAX_SUMMARY_LENGTH);
        parts.push(format!("\n\n{}", encode_text(&summary)));
    }

    truncate(&parts.concat(), MAX_MESSAGE_LENGTH)
}

fn format_markdown(entry: &Entry) -> String {
    let mut parts = Vec::new();

    parts.push(format!("*\\[{}\\]*", escape_markdown(&entry.feed_name)));

    let title = if entry.title.is_empty() {
        "No title".to_string()
    } else {
        escape_markdown(&entry.title)
    };
    if entry.link.is_empty() {
        parts.push(format!("\n*{}*", title));
    } else {
        parts.push(format!("\n[{}]({})", title, entry.link));
    }

    if !entry.author.is_empty() {
        parts.push(format!("\n_by {}_", escape_markdown(&entry.author)));
    }

    if !entry.categories.is_empty() {
        let tags = entry
            .categories
            .iter()
            .take(MAX_TAGS)
            .map(|c| format!("#{}", c.replace(' ', "_")))
            .collect::<Vec<_>>()
            .join(" ");
        parts.push(format!("\n{}", escape_markdown(&tags)));
    }

    if !entry.content.is_empty() {
        let summary = truncate(&clean_content(&entry.content), MAX_SUMMARY_LENGTH);
        parts.push(format!("\n\n{}", escape_markdown(&summary)));
    }

    truncate(&parts.concat(), MAX_MESSAGE_LENGTH)
}

/// Strip HTML tags, decode entities, collapse whitespace.
fn clean_content(content: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();

    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static pattern"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));

    let text = tag.replace_all(content, "");
    let text = html_escape::decode_html_entities(&text);
    space.replace_all(&text, " ").trim().to_string()
}

fn escape_markdown(text: &str) -> String {
    const ESCAPE: &str = r"_*[]()~`>#+-=|{}.!";
    text.chars()
        .flat_map(|c| {
            if ESCAPE.contains(c) {
                vec!['\\', c]
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Char-boundary-safe truncation with a trailing ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
