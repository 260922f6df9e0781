//! RSS feed and sitemap entries

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum length of a feed item description
pub const FEED_DESCRIPTION_LEN: usize = 200;

/// RSS 2.0 channel
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Feed {
    pub title: String,
    pub description: String,
    /// Site-relative link of the channel
    pub link: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
}

/// How often a sitemap location is expected to change
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
    Weekly,
    Never,
}

/// One `<url>` of the sitemap
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SitemapEntry {
    /// Site-relative path
    pub location: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: ChangeFreq,
    pub priority: f32,
}
