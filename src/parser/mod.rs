//! Feed parsing and normalization.
//!
//! Converts raw RSS/Atom documents into unified [`Entry`] values. Entry
//! order follows document order, which downstream processing relies on.

use chrono::Utc;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FeedwatchError, Result};
use crate::domain::{Enclosure, Entry};

#[derive(Debug, Clone, Default)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, feed_name: &str, body: &[u8]) -> Result<Vec<Entry>> {
        let feed = parser::parse(body).map_err(|e| FeedwatchError::FeedParse(e.to_string()))?;

        let entries: Vec<Entry> = feed
            .entries
            .into_iter()
            .map(|raw| {
                let title = raw
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string())
                    .unwrap_or_default();

                // Content preferred over summary, matching notification needs.
                let content = raw
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| raw.summary.map(|s| s.content))
                    .map(|body| decode_html_entities(&body).to_string())
                    .unwrap_or_default();

                let link = raw
                    .links
                    .iter()
                    .find(|l| l.rel.as_deref() != Some("enclosure"))
                    .map(|l| l.href.clone())
                    .unwrap_or_default();

                let author = raw
                    .authors
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default();

                let categories: Vec<String> = raw
                    .categories
                    .into_iter()
                    .map(|c| c.term)
                    .filter(|term| !term.is_empty())
                    .collect();

                let published_at = raw
                    .published
                    .or(raw.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                let mut enclosures: Vec<Enclosure> = raw
                    .links
                    .iter()
                    .filter(|l| l.rel.as_deref() == Some("enclosure"))
                    .map(|l| Enclosure {
                        url: l.href.clone(),
                        mime_type: l.media_type.clone().unwrap_or_default(),
                    })
                    .collect();

                for media in &raw.media {
                    for content in &media.content {
                        if let Some(url) = &content.url {
                            enclosures.push(Enclosure {
                                url: url.to_string(),
                                mime_type: content
                                    .content_type
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_default(),
                            });
                        }
                    }
                }

                let id = Entry::derive_id(&raw.id, &title, &link, published_at.as_ref());

                Entry {
                    id,
                    feed_name: feed_name.to_string(),
                    title,
                    author,
                    link,
                    content,
                    categories,
                    published_at,
                    enclosures,
                    ..Default::default()
                }
            })
            .collect();

        Ok(entries)
    }
}
