use serde::{Deserialize, Serialize};

/// A raw source as configured: the page URL plus the kind tag that decides
/// how the URL resolves to a feed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub url: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// WeChat official-account album, served through a feed bridge.
    Wechat,
    /// Zhihu user activity, served through a feed bridge.
    Zhihu,
    /// A plain RSS feed URL, used as-is.
    Rss,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Wechat => "wechat",
            SourceKind::Zhihu => "zhihu",
            SourceKind::Rss => "rss",
        }
    }
}

/// Channel-level feed metadata. Not persisted on its own; every field is
/// denormalized onto the items parsed from the same feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedChannel {
    pub title: Option<String>,
    pub link: Option<String>,
    pub atom_link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

/// The unit of work and the persisted row shape. `link` is the natural key:
/// the store holds at most one row per distinct link, and re-ingestion of a
/// known link overwrites every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub source: String,
    pub title: Option<String>,
    /// Bounded plain-text summary derived from `content`.
    pub description: Option<String>,
    pub link: String,
    pub guid: Option<String>,
    /// Normalized to `YYYY-MM-DD HH:MM:SS`; absent when the feed's date
    /// could not be parsed.
    pub pub_date: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    /// The original item body, possibly HTML.
    pub content: String,
    pub image_url: Option<String>,
    pub language: Option<String>,
    pub channel_title: Option<String>,
    pub channel_link: Option<String>,
    pub channel_atom_link: Option<String>,
    pub channel_description: Option<String>,
}

/// Outcome of classifying a single item. Transient: consumed right after the
/// classification phase to pick the subset worth persisting.
#[derive(Debug, Clone)]
pub struct ClassificationVerdict {
    pub item: FeedItem,
    pub relevant: bool,
}

/// Row-level totals accumulated across all upsert batches of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("failed to fetch feed {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse feed {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("invalid source url {url}: {reason}")]
    Source { url: String, reason: String },

    #[error("classification failed for {link}: {reason}")]
    Classification { link: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
