//! Article repository
//!
//! Articles are always read together with their author, category and
//! tags: one joined query for the article rows plus one batched query
//! for the tags of every returned article.

use crate::db::DbPool;
use crate::models::{Article, ArticleWithRelations, Author, Category, CreateArticleInput, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Create an article and its tag links in one transaction
    async fn create(&self, input: &CreateArticleInput) -> Result<Article>;

    /// Published articles, newest first
    async fn list_published(&self) -> Result<Vec<ArticleWithRelations>>;

    /// Article by ID with relations
    async fn get_with_relations(&self, id: i64) -> Result<Option<ArticleWithRelations>>;
}

pub struct SqlxArticleRepository {
    pool: DbPool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }

    /// Load tags for the given articles, keyed by article id
    async fn tags_for(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
        if article_ids.is_empty() {
            return Ok(tags);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT at.article_id, t.id, t.name FROM article_tags at \
             INNER JOIN tags t ON t.id = at.tag_id WHERE at.article_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in article_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY t.id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to load article tags")?;

        for row in rows {
            tags.entry(row.get("article_id")).or_default().push(Tag {
                id: row.get("id"),
                name: row.get("name"),
            });
        }
        Ok(tags)
    }

    async fn attach_tags(&self, rows: Vec<SqliteRow>) -> Result<Vec<ArticleWithRelations>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut tags = self.tags_for(&ids).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut item = row_to_article_with_relations(row);
                item.tags = tags.remove(&item.article.id).unwrap_or_default();
                item
            })
            .collect())
    }
}

const SELECT_WITH_RELATIONS: &str = r#"
    SELECT a.id, a.title, a.body, a.published_at, a.author_id, a.category_id,
           au.name AS author_name, au.bio AS author_bio,
           c.name AS category_name
    FROM articles a
    INNER JOIN authors au ON au.id = a.author_id
    INNER JOIN categories c ON c.id = a.category_id
"#;

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, input: &CreateArticleInput) -> Result<Article> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO articles (title, body, published_at, author_id, category_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.published_at)
        .bind(input.author_id)
        .bind(input.category_id)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?;
        let id = result.last_insert_rowid();

        for tag_id in &input.tag_ids {
            sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to link tag to article")?;
        }

        tx.commit().await?;

        Ok(Article {
            id,
            title: input.title.clone(),
            body: input.body.clone(),
            published_at: input.published_at,
            author_id: input.author_id,
            category_id: input.category_id,
        })
    }

    async fn list_published(&self) -> Result<Vec<ArticleWithRelations>> {
        let rows = sqlx::query(&format!(
            "{} WHERE a.published_at IS NOT NULL ORDER BY a.published_at DESC, a.id DESC",
            SELECT_WITH_RELATIONS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list published articles")?;

        self.attach_tags(rows).await
    }

    async fn get_with_relations(&self, id: i64) -> Result<Option<ArticleWithRelations>> {
        let row = sqlx::query(&format!("{} WHERE a.id = ?", SELECT_WITH_RELATIONS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get article")?;

        match row {
            Some(row) => Ok(self.attach_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn row_to_article_with_relations(row: &SqliteRow) -> ArticleWithRelations {
    let article = Article {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        published_at: row.get("published_at"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
    };
    ArticleWithRelations {
        author: Author {
            id: article.author_id,
            name: row.get("author_name"),
            bio: row.get("author_bio"),
        },
        category: Category {
            id: article.category_id,
            name: row.get("category_name"),
        },
        tags: Vec::new(),
        article,
    }
}
