//! Blog service
//!
//! Published article listings, article detail, the latest-articles feed
//! and sample data seeding.

use crate::db::repositories::{
    ArticleRepository, AuthorRepository, CategoryRepository, TagRepository,
};
use crate::models::{
    Article, ArticleWithRelations, CreateArticleInput, Feed, FeedItem, FEED_DESCRIPTION_LEN,
};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const SEED_AUTHORS: [&str; 3] = ["Alex Jons", "Nick Smith", "Cindy McDaniel"];
const SEED_AUTHOR_BIO: &str = "Author`s bio.";
const SEED_CATEGORIES: [&str; 3] = ["Some category", "Another category", "Sample category"];
const SEED_TAGS: [&str; 5] = ["Tag_1", "Tag_2", "Tag_3", "Tag_4", "Tag_5"];
const SEED_TITLES: [&str; 10] = [
    "Introduction to REST APIs",
    "10 simple Italian pasta recipes",
    "A weekend guide to Prague",
    "The future of artificial intelligence",
    "Autumn fashion trends",
    "Starting yoga at home",
    "Docker basics for beginners",
    "Secrets of the perfect steak",
    "Travelling the Norwegian fjords",
    "Benefits of cloud computing",
];

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Article not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Counts of rows touched by a seeding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub authors: usize,
    pub categories: usize,
    pub tags: usize,
    pub articles: usize,
}

/// Random choices for one seeded article, drawn before touching the
/// database
struct SeedPlan {
    title: &'static str,
    author: usize,
    category: usize,
    age: Duration,
    repeat: usize,
    tags: Vec<usize>,
}

pub struct BlogService {
    article_repo: Arc<dyn ArticleRepository>,
    author_repo: Arc<dyn AuthorRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tag_repo: Arc<dyn TagRepository>,
}

impl BlogService {
    pub fn new(
        article_repo: Arc<dyn ArticleRepository>,
        author_repo: Arc<dyn AuthorRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tag_repo: Arc<dyn TagRepository>,
    ) -> Self {
        Self {
            article_repo,
            author_repo,
            category_repo,
            tag_repo,
        }
    }

    /// Published articles, newest first
    pub async fn list_published(&self) -> Result<Vec<ArticleWithRelations>, BlogServiceError> {
        Ok(self.article_repo.list_published().await?)
    }

    pub async fn get_article(&self, id: i64) -> Result<ArticleWithRelations, BlogServiceError> {
        self.article_repo
            .get_with_relations(id)
            .await?
            .ok_or(BlogServiceError::NotFound(id))
    }

    pub async fn create_article(&self, input: &CreateArticleInput) -> Result<Article, BlogServiceError> {
        let article = self.article_repo.create(input).await?;
        tracing::info!("Created article {} ({})", article.id, article.title);
        Ok(article)
    }

    /// RSS channel over the published articles
    pub async fn latest_feed(&self) -> Result<Feed, BlogServiceError> {
        let items = self
            .list_published()
            .await?
            .iter()
            .map(|a| FeedItem {
                title: a.article.title.clone(),
                description: a.excerpt(FEED_DESCRIPTION_LEN),
                link: a.url(),
                pub_date: a.article.published_at,
            })
            .collect();

        Ok(Feed {
            title: "Blog articles (latest)".to_string(),
            description: "Updates on changes and additions blog articles".to_string(),
            link: "/blog/articles/".to_string(),
            items,
        })
    }

    /// Create sample authors, categories and tags (get-or-create), then
    /// ten randomly assembled articles
    pub async fn seed(&self) -> Result<SeedReport, BlogServiceError> {
        let mut authors = Vec::new();
        for name in SEED_AUTHORS {
            authors.push(self.author_repo.get_or_create(name, SEED_AUTHOR_BIO).await?);
        }

        let mut categories = Vec::new();
        for name in SEED_CATEGORIES {
            categories.push(self.category_repo.get_or_create(name).await?);
        }

        let mut tags = Vec::new();
        for name in SEED_TAGS {
            tags.push(self.tag_repo.get_or_create(name).await?);
        }

        let plans = plan_articles(&mut StdRng::from_entropy(), authors.len(), categories.len(), tags.len());
        let now = Utc::now();

        for plan in &plans {
            let author = &authors[plan.author];
            let category = &categories[plan.category];
            let body = format!(
                "Content of the article '{}'. There could be a lot of interesting text about {}, written by {}.{}",
                plan.title,
                category.name,
                author.name,
                "This is sample text for filling the database. ".repeat(plan.repeat)
            );

            self.create_article(&CreateArticleInput {
                title: plan.title.to_string(),
                body: Some(body),
                published_at: Some(now - plan.age),
                author_id: author.id,
                category_id: category.id,
                tag_ids: plan.tags.iter().map(|&i| tags[i].id).collect(),
            })
            .await?;
        }

        Ok(SeedReport {
            authors: authors.len(),
            categories: categories.len(),
            tags: tags.len(),
            articles: plans.len(),
        })
    }
}

fn plan_articles<R: Rng>(rng: &mut R, authors: usize, categories: usize, tags: usize) -> Vec<SeedPlan> {
    let tag_indexes: Vec<usize> = (0..tags).collect();

    SEED_TITLES
        .iter()
        .map(|&title| {
            let age = Duration::days(rng.gen_range(1..=365))
                + Duration::hours(rng.gen_range(1..=23))
                + Duration::minutes(rng.gen_range(1..=59));
            let tag_count = rng.gen_range(1..=3).min(tags);

            SeedPlan {
                title,
                author: rng.gen_range(0..authors),
                category: rng.gen_range(0..categories),
                age,
                repeat: rng.gen_range(1..=5),
                tags: tag_indexes.choose_multiple(rng, tag_count).copied().collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxAuthorRepository, SqlxCategoryRepository, SqlxTagRepository,
    };
    use std::collections::HashSet;

    async fn service() -> BlogService {
        let pool = setup_pool().await;
        BlogService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxAuthorRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool),
        )
    }

    #[test]
    fn test_plan_articles_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let plans = plan_articles(&mut rng, 3, 3, 5);

        assert_eq!(plans.len(), 10);
        for plan in &plans {
            assert!(plan.author < 3 && plan.category < 3);
            assert!((1..=5).contains(&plan.repeat));
            assert!((1..=3).contains(&plan.tags.len()));
            let distinct: HashSet<_> = plan.tags.iter().collect();
            assert_eq!(distinct.len(), plan.tags.len());
            assert!(plan.age >= Duration::days(1) && plan.age <= Duration::days(366));
        }
    }

    #[tokio::test]
    async fn test_seed_is_repeatable_for_lookups() {
        let service = service().await;

        let first = service.seed().await.unwrap();
        assert_eq!(first.articles, 10);
        service.seed().await.unwrap();

        // Authors, categories and tags are reused, articles are added
        assert_eq!(service.author_repo.list().await.unwrap().len(), 3);
        assert_eq!(service.category_repo.list().await.unwrap().len(), 3);
        assert_eq!(service.tag_repo.list().await.unwrap().len(), 5);
        assert_eq!(service.list_published().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_list_published_newest_first() {
        let service = service().await;
        service.seed().await.unwrap();

        let articles = service.list_published().await.unwrap();
        let dates: Vec<_> = articles.iter().map(|a| a.article.published_at).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert!(articles.iter().all(|a| !a.tags.is_empty()));
    }

    #[tokio::test]
    async fn test_get_article_not_found() {
        let service = service().await;
        assert!(matches!(service.get_article(42).await, Err(BlogServiceError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_latest_feed() {
        let service = service().await;
        let author = service.author_repo.get_or_create("A", "").await.unwrap();
        let category = service.category_repo.get_or_create("C").await.unwrap();

        service
            .create_article(&CreateArticleInput {
                title: "Draft".into(),
                body: None,
                published_at: None,
                author_id: author.id,
                category_id: category.id,
                tag_ids: vec![],
            })
            .await
            .unwrap();
        let published = service
            .create_article(&CreateArticleInput {
                title: "Long".into(),
                body: Some("x".repeat(500)),
                published_at: Some(Utc::now()),
                author_id: author.id,
                category_id: category.id,
                tag_ids: vec![],
            })
            .await
            .unwrap();

        let feed = service.latest_feed().await.unwrap();
        assert_eq!(feed.title, "Blog articles (latest)");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].description.chars().count(), 200);
        assert_eq!(feed.items[0].link, format!("/blog/articles/{}/", published.id));
    }
}
