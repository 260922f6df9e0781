//! Product repository
//!
//! Products, their images, search/ordering queries, bulk writes and
//! price aggregates.

use crate::db::DbPool;
use crate::models::{
    PriceStats, Price, Product, ProductCsvRow, ProductImage, ProductInput, ProductQuery,
    ProductWithImages,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::sync::Arc;

/// Product repository trait
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Create a product
    async fn create(&self, input: &ProductInput, created_by: Option<i64>) -> Result<Product>;

    /// Insert many products in one transaction; nothing is written on failure
    async fn create_many(&self, rows: &[ProductCsvRow]) -> Result<Vec<Product>>;

    /// Get product by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Product>>;

    /// Get product by ID with its images
    async fn get_with_images(&self, id: i64) -> Result<Option<ProductWithImages>>;

    /// Non-archived products ordered by pk
    async fn list_active(&self) -> Result<Vec<Product>>;

    /// All products filtered and ordered by the query
    async fn list(&self, query: &ProductQuery) -> Result<Vec<Product>>;

    /// The most recently created non-archived products
    async fn latest_active(&self, limit: i64) -> Result<Vec<Product>>;

    /// Replace the editable fields of a product
    async fn update(&self, id: i64, input: &ProductInput) -> Result<()>;

    /// Mark a product as archived
    async fn archive(&self, id: i64) -> Result<bool>;

    /// Delete a product
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Set the preview image path
    async fn set_preview(&self, id: i64, path: &str) -> Result<()>;

    /// Attach an image to a product
    async fn add_image(&self, product_id: i64, path: &str, description: &str) -> Result<ProductImage>;

    /// Set the discount of every product whose name contains `pattern`
    async fn set_discount_where_name_contains(&self, pattern: &str, discount: i64) -> Result<u64>;

    /// Price aggregates, optionally restricted to names containing a pattern
    async fn price_stats(&self, name_contains: Option<&str>) -> Result<PriceStats>;
}

pub struct SqlxProductRepository {
    pool: DbPool,
}

impl SqlxProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }
}

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, discount, created_at, archived, created_by, preview";

/// Escape LIKE wildcards so user input matches literally
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn create(&self, input: &ProductInput, created_by: Option<i64>) -> Result<Product> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, description, price_cents, discount, created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price.cents())
        .bind(input.discount)
        .bind(now)
        .bind(created_by)
        .execute(&self.pool)
        .await
        .context("Failed to create product")?;

        Ok(Product {
            id: result.last_insert_rowid(),
            name: input.name.clone(),
            description: input.description.clone(),
            price: input.price,
            discount: input.discount,
            created_at: now,
            archived: false,
            created_by,
            preview: None,
        })
    }

    async fn create_many(&self, rows: &[ProductCsvRow]) -> Result<Vec<Product>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let result = sqlx::query(
                r#"
                INSERT INTO products (name, description, price_cents, discount, created_at, created_by)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.name)
            .bind(&row.description)
            .bind(row.price.cents())
            .bind(row.discount)
            .bind(now)
            .bind(row.created_by)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert product row {}", index + 1))?;

            created.push(Product {
                id: result.last_insert_rowid(),
                name: row.name.clone(),
                description: row.description.clone(),
                price: row.price,
                discount: row.discount,
                created_at: now,
                archived: false,
                created_by: row.created_by,
                preview: None,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get product")?;

        Ok(row.as_ref().map(row_to_product))
    }

    async fn get_with_images(&self, id: i64) -> Result<Option<ProductWithImages>> {
        let Some(product) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT id, product_id, image, description FROM product_images WHERE product_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load product images")?;

        let images = rows
            .into_iter()
            .map(|row| ProductImage {
                id: row.get("id"),
                product_id: row.get("product_id"),
                image: row.get("image"),
                description: row.get("description"),
            })
            .collect();

        Ok(Some(ProductWithImages { product, images }))
    }

    async fn list_active(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products WHERE archived = 0 ORDER BY id",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active products")?;

        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn list(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM products WHERE 1 = 1", PRODUCT_COLUMNS));

        for term in &query.search_terms {
            let pattern = like_pattern(term);
            qb.push(" AND (LOWER(name) LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR LOWER(description) LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\')");
        }

        qb.push(" ORDER BY ");
        for (field, desc) in &query.ordering {
            qb.push(field.column());
            qb.push(if *desc { " DESC, " } else { " ASC, " });
        }
        qb.push("id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list products")?;

        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn latest_active(&self, limit: i64) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM products WHERE archived = 0 ORDER BY created_at DESC, id DESC LIMIT ?",
            PRODUCT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list latest products")?;

        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn update(&self, id: i64, input: &ProductInput) -> Result<()> {
        sqlx::query(
            "UPDATE products SET name = ?, description = ?, price_cents = ?, discount = ? WHERE id = ?",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price.cents())
        .bind(input.discount)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update product")?;
        Ok(())
    }

    async fn archive(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET archived = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to archive product")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete product")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_preview(&self, id: i64, path: &str) -> Result<()> {
        sqlx::query("UPDATE products SET preview = ? WHERE id = ?")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to set product preview")?;
        Ok(())
    }

    async fn add_image(&self, product_id: i64, path: &str, description: &str) -> Result<ProductImage> {
        let result = sqlx::query(
            "INSERT INTO product_images (product_id, image, description) VALUES (?, ?, ?)",
        )
        .bind(product_id)
        .bind(path)
        .bind(description)
        .execute(&self.pool)
        .await
        .context("Failed to add product image")?;

        Ok(ProductImage {
            id: result.last_insert_rowid(),
            product_id,
            image: path.to_string(),
            description: description.to_string(),
        })
    }

    async fn set_discount_where_name_contains(&self, pattern: &str, discount: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE products SET discount = ? WHERE name LIKE ? ESCAPE '\\'")
            .bind(discount)
            .bind(like_pattern(pattern))
            .execute(&self.pool)
            .await
            .context("Failed to update discounts")?;
        Ok(result.rows_affected())
    }

    async fn price_stats(&self, name_contains: Option<&str>) -> Result<PriceStats> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(id) AS count, AVG(price_cents) AS avg, MAX(price_cents) AS max, \
             MIN(price_cents) AS min, SUM(price_cents) AS sum FROM products",
        );
        if let Some(pattern) = name_contains {
            qb.push(" WHERE name LIKE ");
            qb.push_bind(like_pattern(pattern));
            qb.push(" ESCAPE '\\'");
        }

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to aggregate prices")?;

        let avg: Option<f64> = row.get("avg");
        Ok(PriceStats {
            count: row.get("count"),
            avg: avg.map(|a| Price::from_cents(a.round() as i64)),
            max: row.get::<Option<i64>, _>("max").map(Price::from_cents),
            min: row.get::<Option<i64>, _>("min").map(Price::from_cents),
            sum: row.get::<Option<i64>, _>("sum").map(Price::from_cents),
        })
    }
}

pub(crate) fn row_to_product(row: &SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        price: Price::from_cents(row.get("price_cents")),
        discount: row.get("discount"),
        created_at: row.get("created_at"),
        archived: row.get("archived"),
        created_by: row.get("created_by"),
        preview: row.get("preview"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::models::ProductOrderField;

    fn input(name: &str, description: &str, cents: i64, discount: i64) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            description: description.to_string(),
            price: Price::from_cents(cents),
            discount,
        }
    }

    async fn seeded() -> SqlxProductRepository {
        let pool = setup_pool().await;
        let repo = SqlxProductRepository::new(pool);
        repo.create(&input("Laptop", "Fast red machine", 199900, 0), None).await.unwrap();
        repo.create(&input("Smartphone X", "Red phone", 99900, 5), None).await.unwrap();
        repo.create(&input("Desktop", "Big box", 299900, 15), None).await.unwrap();
        repo
    }

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_search_requires_every_term() {
        let repo = seeded().await;

        let q = ProductQuery::from_params(Some("RED"), None);
        assert_eq!(names(&repo.list(&q).await.unwrap()), vec!["Laptop", "Smartphone X"]);

        let q = ProductQuery::from_params(Some("red phone"), None);
        assert_eq!(names(&repo.list(&q).await.unwrap()), vec!["Smartphone X"]);

        let q = ProductQuery::from_params(Some("100%"), None);
        assert!(repo.list(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ordering() {
        let repo = seeded().await;

        let q = ProductQuery {
            search_terms: vec![],
            ordering: vec![(ProductOrderField::Price, true)],
        };
        assert_eq!(
            names(&repo.list(&q).await.unwrap()),
            vec!["Desktop", "Laptop", "Smartphone X"]
        );

        let q = ProductQuery::from_params(None, Some("name"));
        assert_eq!(
            names(&repo.list(&q).await.unwrap()),
            vec!["Desktop", "Laptop", "Smartphone X"]
        );
    }

    #[tokio::test]
    async fn test_archive_hides_from_active_lists() {
        let repo = seeded().await;
        let laptop = repo.list_active().await.unwrap().remove(0);

        assert!(repo.archive(laptop.id).await.unwrap());
        assert!(!repo.archive(9999).await.unwrap());

        assert_eq!(names(&repo.list_active().await.unwrap()), vec!["Smartphone X", "Desktop"]);
        assert!(repo.get_by_id(laptop.id).await.unwrap().unwrap().archived);
        assert_eq!(repo.latest_active(5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_images_and_preview() {
        let repo = seeded().await;

        repo.add_image(1, "products/product_1/images/a.png", "").await.unwrap();
        repo.add_image(1, "products/product_1/images/b.png", "").await.unwrap();
        repo.set_preview(1, "products/product_1/preview/p.png").await.unwrap();

        let item = repo.get_with_images(1).await.unwrap().unwrap();
        assert_eq!(item.images.len(), 2);
        assert_eq!(item.product.preview.as_deref(), Some("products/product_1/preview/p.png"));
        assert!(repo.get_with_images(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_many_is_atomic() {
        let pool = setup_pool().await;
        let repo = SqlxProductRepository::new(pool);

        let good = ProductCsvRow {
            name: "A".into(),
            description: String::new(),
            price: Price::from_cents(100),
            discount: 0,
            created_by: None,
        };
        let bad = ProductCsvRow {
            discount: 500,
            ..good.clone()
        };

        assert!(repo.create_many(&[good.clone(), bad]).await.is_err());
        assert!(repo.list(&ProductQuery::default()).await.unwrap().is_empty());

        let created = repo.create_many(&[good.clone(), good]).await.unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn test_discount_and_stats() {
        let repo = seeded().await;

        assert_eq!(repo.set_discount_where_name_contains("Smartphone", 10).await.unwrap(), 1);
        let phone = repo.get_by_id(2).await.unwrap().unwrap();
        assert_eq!(phone.discount, 10);

        let all = repo.price_stats(None).await.unwrap();
        assert_eq!(all.count, 3);
        assert_eq!(all.sum, Some(Price::from_cents(599700)));
        assert_eq!(all.max, Some(Price::from_cents(299900)));
        assert_eq!(all.min, Some(Price::from_cents(99900)));
        assert_eq!(all.avg, Some(Price::from_cents(199900)));

        let none = repo.price_stats(Some("Tablet")).await.unwrap();
        assert_eq!(none.count, 0);
        assert_eq!(none.sum, None);
    }
}
