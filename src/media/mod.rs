//! Media discovery and download.
//!
//! Extraction is pure URL discovery over an entry's content and enclosure
//! metadata; downloading is a best-effort side channel that never blocks
//! notification delivery.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use reqwest::{Client, Proxy};
use sha2::{Digest, Sha256};
use url::Url;

use crate::app::{FeedwatchError, Result};
use crate::domain::{Entry, MediaRef};

const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/mpeg",
    "video/3gpp",
    "video/x-flv",
];

fn is_video_mime(mime: &str) -> bool {
    let mime = mime.to_lowercase();
    mime.starts_with("video/") || VIDEO_MIME_TYPES.contains(&mime.as_str())
}

fn video_src_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r#"<video[^>]*\ssrc=["']([^"']+)["']"#)
            .case_insensitive(true)
            .build()
            .expect("static pattern")
    })
}

fn source_src_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r#"<source[^>]*\ssrc=["']([^"']+)["']"#)
            .case_insensitive(true)
            .build()
            .expect("static pattern")
    })
}

/// Discover downloadable media references in an entry.
///
/// Scans, in order: `<video src>` tags, `<source src>` tags, then feed
/// enclosures and Media RSS content with a video mime type. The result is
/// ordered and deduplicated by URL. No network access.
pub fn extract(entry: &Entry) -> Vec<MediaRef> {
    let mut refs: Vec<MediaRef> = Vec::new();
    let mut push = |url: &str| {
        if !url.is_empty() && !refs.iter().any(|r| r.url == url) {
            refs.push(MediaRef::new(url));
        }
    };

    for pattern in [video_src_pattern(), source_src_pattern()] {
        for caps in pattern.captures_iter(&entry.content) {
            push(&caps[1]);
        }
    }

    for enclosure in &entry.enclosures {
        if is_video_mime(&enclosure.mime_type) {
            push(&enclosure.url);
        }
    }

    refs
}

/// Cached accessor: extraction runs at most once per entry.
pub fn media_refs(entry: &Entry) -> &[MediaRef] {
    entry.media_cache.get_or_init(|| extract(entry))
}

fn sanitize(name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let pattern = RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static pattern"));

    let sanitized = pattern.replace_all(name, "_");
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    let mut out: String = sanitized.chars().take(200).collect();
    if out.is_empty() {
        out = "media".to_string();
    }
    out
}

fn filename_from_url(url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(String::from))
        })
        .unwrap_or_default();

    if name.is_empty() {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("media_{}", &hex::encode(hasher.finalize())[..8])
    } else {
        name
    }
}

/// Downloads discovered media into a per-feed directory. Failures are
/// logged and partial files removed; errors never propagate to callers.
pub struct MediaDownloader {
    client: Client,
}

impl MediaDownloader {
    pub fn new(timeout_secs: u64, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy_url) = proxy {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                FeedwatchError::Config(format!("invalid proxy url '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Download every media reference of an entry. Best-effort: returns the
    /// paths that were written; a failed URL is skipped and logged.
    pub async fn download_entry(&self, entry: &Entry, media_dir: &str) -> Vec<PathBuf> {
        let refs = media_refs(entry);
        if refs.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            "Processing {} media file(s) for entry '{}'",
            refs.len(),
            entry.display_title()
        );

        let mut downloaded = Vec::new();
        for media in refs {
            match self.download(&media.url, &entry.feed_name, media_dir).await {
                Ok(path) => downloaded.push(path),
                Err(e) => {
                    tracing::warn!("Failed to download media from {}: {}", media.url, e);
                }
            }
        }
        downloaded
    }

    async fn download(&self, url: &str, feed_name: &str, media_dir: &str) -> Result<PathBuf> {
        let feed_dir = Path::new(media_dir).join(sanitize(feed_name));
        tokio::fs::create_dir_all(&feed_dir).await?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}", timestamp, sanitize(&filename_from_url(url)));
        let file_path = feed_dir.join(filename);

        tracing::debug!("Downloading media from {}", url);

        let result = self.stream_to_file(url, &file_path).await;
        if result.is_err() && file_path.exists() {
            let _ = tokio::fs::remove_file(&file_path).await;
        }
        result?;

        let size = tokio::fs::metadata(&file_path).await?.len();
        tracing::info!(
            "Downloaded media: {} ({:.2} MB)",
            file_path.display(),
            size as f64 / (1024.0 * 1024.0)
        );

        Ok(file_path)
    }

    async fn stream_to_file(&self, url: &str, path: &Path) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.is_empty()
            && !is_video_mime(content_type)
            && !content_type.starts_with("application/octet-stream")
        {
            tracing::warn!(
                "Unexpected content type '{}' for {}, downloading anyway",
                content_type,
                url
            );
        }

        let mut file = tokio::fs::File::create(path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Enclosure;

    fn entry_with_content(content: &str) -> Entry {
        Entry {
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_video_tag() {
        let entry =
            entry_with_content(r#"<p>clip</p><video controls src="https://e.com/a.mp4"></video>"#);
        let refs = extract(&entry);
        assert_eq!(refs, vec![MediaRef::new("https://e.com/a.mp4")]);
    }

    #[test]
    fn test_extract_source_tag_single_quotes() {
        let entry = entry_with_content(r#"<video><source src='https://e.com/b.webm'></video>"#);
        let refs = extract(&entry);
        assert_eq!(refs, vec![MediaRef::new("https://e.com/b.webm")]);
    }

    #[test]
    fn test_extract_dedupes_across_sources() {
        let mut entry = entry_with_content(r#"<video src="https://e.com/a.mp4"></video>"#);
        entry.enclosures = vec![Enclosure {
            url: "https://e.com/a.mp4".into(),
            mime_type: "video/mp4".into(),
        }];
        assert_eq!(extract(&entry).len(), 1);
    }

    #[test]
    fn test_extract_ignores_non_video_enclosures() {
        let mut entry = Entry::default();
        entry.enclosures = vec![
            Enclosure {
                url: "https://e.com/cover.jpg".into(),
                mime_type: "image/jpeg".into(),
            },
            Enclosure {
                url: "https://e.com/a.mkv".into(),
                mime_type: "video/x-matroska".into(),
            },
        ];
        let refs = extract(&entry);
        assert_eq!(refs, vec![MediaRef::new("https://e.com/a.mkv")]);
    }

    #[test]
    fn test_extract_preserves_order() {
        let mut entry = entry_with_content(
            r#"<video src="https://e.com/1.mp4"></video><video src="https://e.com/2.mp4"></video>"#,
        );
        entry.enclosures = vec![Enclosure {
            url: "https://e.com/3.mp4".into(),
            mime_type: "video/mp4".into(),
        }];
        let refs = extract(&entry);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://e.com/1.mp4", "https://e.com/2.mp4", "https://e.com/3.mp4"]
        );
    }

    #[test]
    fn test_extract_empty_when_no_media() {
        let entry = entry_with_content("<p>just text</p>");
        assert!(extract(&entry).is_empty());
    }

    #[test]
    fn test_media_refs_cached() {
        let entry = entry_with_content(r#"<video src="https://e.com/a.mp4"></video>"#);
        let first = media_refs(&entry).as_ptr();
        let second = media_refs(&entry).as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sanitize_replaces_problem_characters() {
        assert_eq!(sanitize("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize("  spaced  "), "spaced");
        assert_eq!(sanitize("..."), "media");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://e.com/videos/clip.mp4?sig=abc"),
            "clip.mp4"
        );
        assert!(filename_from_url("https://e.com/").starts_with("media_"));
    }

    #[test]
    fn test_is_video_mime() {
        assert!(is_video_mime("video/mp4"));
        assert!(is_video_mime("VIDEO/MP4"));
        assert!(is_video_mime("video/anything-new"));
        assert!(!is_video_mime("image/png"));
        assert!(!is_video_mime(""));
    }
}
