//! Blog article model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Author, Category, Tag};

/// Blog article row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    /// Unpublished articles have no publication time
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: i64,
    pub category_id: i64,
}

/// Input for creating an article
#[derive(Debug, Clone)]
pub struct CreateArticleInput {
    pub title: String,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: i64,
    pub category_id: i64,
    pub tag_ids: Vec<i64>,
}

/// Article with its author, category and tags loaded
#[derive(Debug, Clone, Serialize)]
pub struct ArticleWithRelations {
    #[serde(flatten)]
    pub article: Article,
    pub author: Author,
    pub category: Category,
    pub tags: Vec<Tag>,
}

impl ArticleWithRelations {
    /// Path of the article detail page
    pub fn url(&self) -> String {
        format!("/blog/articles/{}/", self.article.id)
    }

    /// First `limit` characters of the body
    pub fn excerpt(&self, limit: usize) -> String {
        truncate_chars(self.article.body.as_deref().unwrap_or(""), limit)
    }
}

/// Truncate a string to at most `limit` characters
pub fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_url_and_excerpt() {
        let item = ArticleWithRelations {
            article: Article {
                id: 7,
                title: "T".into(),
                body: None,
                published_at: None,
                author_id: 1,
                category_id: 1,
            },
            author: Author {
                id: 1,
                name: "A".into(),
                bio: String::new(),
            },
            category: Category {
                id: 1,
                name: "C".into(),
            },
            tags: vec![],
        };
        assert_eq!(item.url(), "/blog/articles/7/");
        assert_eq!(item.excerpt(200), "");
    }
}
