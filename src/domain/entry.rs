use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A downloadable media URL discovered in an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
}

impl MediaRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A media link captured at parse time from RSS enclosures or
/// Media RSS extensions. Raw material for media extraction.
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
}

/// One normalized feed item, independent of feed format.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub id: String,
    pub feed_name: String,
    pub title: String,
    pub author: String,
    pub link: String,
    pub content: String,
    pub categories: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub enclosures: Vec<Enclosure>,
    pub(crate) media_cache: OnceLock<Vec<MediaRef>>,
}

impl Entry {
    pub fn new(feed_name: &str, id: String) -> Self {
        Self {
            id,
            feed_name: feed_name.to_string(),
            ..Default::default()
        }
    }

    /// Derive a stable entry identifier.
    ///
    /// The feed's native id/guid is used verbatim when present; otherwise a
    /// SHA256 hash over title, link, and publication time. Re-parsing the
    /// same document yields the same id for an unchanged item.
    pub fn derive_id(
        native_id: &str,
        title: &str,
        link: &str,
        published_at: Option<&DateTime<Utc>>,
    ) -> String {
        if !native_id.trim().is_empty() {
            return native_id.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(link.as_bytes());
        if let Some(ts) = published_at {
            hasher.update(ts.to_rfc3339().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_native_id_preferred() {
        let id = Entry::derive_id("tag:example.com,2024:1", "Title", "https://e.com/1", None);
        assert_eq!(id, "tag:example.com,2024:1");
    }

    #[test]
    fn test_hash_fallback_deterministic() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id1 = Entry::derive_id("", "Title", "https://e.com/1", Some(&ts));
        let id2 = Entry::derive_id("", "Title", "https://e.com/1", Some(&ts));
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_hash_fallback_is_hex_sha256() {
        let id = Entry::derive_id("", "Title", "https://e.com/1", None);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_differs_on_different_inputs() {
        let id1 = Entry::derive_id("", "Title A", "https://e.com/1", None);
        let id2 = Entry::derive_id("", "Title B", "https://e.com/1", None);
        let id3 = Entry::derive_id("", "Title A", "https://e.com/2", None);
        assert_ne!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_blank_native_id_falls_back_to_hash() {
        let id = Entry::derive_id("   ", "Title", "https://e.com/1", None);
        assert_eq!(id.len(), 64);
    }

    #[test]
    fn test_display_title() {
        let mut entry = Entry::new("feed", "e1".into());
        assert_eq!(entry.display_title(), "(untitled)");
        entry.title = "My Article".into();
        assert_eq!(entry.display_title(), "My Article");
    }
}
