//! Order repository
//!
//! Orders are written together with their product links inside one
//! transaction. Listings load the user with a join and the products of
//! all returned orders with a single batched query.

use crate::db::repositories::product::{row_to_product, PRODUCT_COLUMNS};
use crate::db::DbPool;
use crate::models::{
    Order, OrderInput, OrderQuery, OrderTotal, OrderWithRelations, Price, Product, User,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashMap;
use std::sync::Arc;

/// Order repository trait
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Create an order with its product links
    async fn create(&self, input: &OrderInput) -> Result<Order>;

    /// Create many orders in one transaction; nothing is written on failure
    async fn create_many(&self, inputs: &[OrderInput]) -> Result<Vec<Order>>;

    /// Find an order by user, address and promocode or create it, then
    /// link the given products. Returns the order and whether it was created.
    async fn get_or_create_with_products(
        &self,
        user_id: i64,
        delivery_address: &str,
        promocode: &str,
        product_ids: &[i64],
    ) -> Result<(Order, bool)>;

    /// Replace all fields and product links of an order
    async fn update(&self, id: i64, input: &OrderInput) -> Result<bool>;

    /// Delete an order
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Get order by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Orders matching exact filters, in the requested order
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Orders with user and products, optionally only for one user
    async fn list_with_relations(&self, user_id: Option<i64>) -> Result<Vec<OrderWithRelations>>;

    /// Order with user and products
    async fn get_with_relations(&self, id: i64) -> Result<Option<OrderWithRelations>>;

    /// Number of products and price sum per order
    async fn totals(&self) -> Result<Vec<OrderTotal>>;

    /// Ids among `ids` that refer to existing products; archived ones are
    /// dropped when `active_only` is set
    async fn existing_product_ids(&self, ids: &[i64], active_only: bool) -> Result<Vec<i64>>;
}

pub struct SqlxOrderRepository {
    pool: DbPool,
}

impl SqlxOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }

    /// Product ids per order, keyed by order id
    async fn product_ids_for(&self, order_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(map);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT order_id, product_id FROM order_products WHERE order_id IN (");
        push_id_list(&mut qb, order_ids);
        qb.push(" ORDER BY product_id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to load order product links")?;

        for row in rows {
            map.entry(row.get("order_id")).or_default().push(row.get("product_id"));
        }
        Ok(map)
    }

    /// Products per order, keyed by order id
    async fn products_for(&self, order_ids: &[i64]) -> Result<HashMap<i64, Vec<Product>>> {
        let mut map: HashMap<i64, Vec<Product>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(map);
        }

        let columns = PRODUCT_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT op.order_id, {} FROM order_products op \
             INNER JOIN products p ON p.id = op.product_id WHERE op.order_id IN (",
            columns
        ));
        push_id_list(&mut qb, order_ids);
        qb.push(" ORDER BY p.id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to load order products")?;

        for row in rows {
            map.entry(row.get("order_id")).or_default().push(row_to_product(&row));
        }
        Ok(map)
    }

    async fn with_relations(&self, rows: Vec<SqliteRow>) -> Result<Vec<OrderWithRelations>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut products = self.products_for(&ids).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut order = row_to_order(row);
                let products = products.remove(&order.id).unwrap_or_default();
                order.product_ids = products.iter().map(|p| p.id).collect();
                let user = row_to_user_prefixed(row);
                OrderWithRelations {
                    order,
                    user,
                    products,
                }
            })
            .collect())
    }
}

/// Push `?, ?, ...)` binding every id
fn push_id_list(qb: &mut QueryBuilder<Sqlite>, ids: &[i64]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

async fn insert_order(conn: &mut SqliteConnection, input: &OrderInput) -> Result<Order> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO orders (delivery_address, promocode, created_at, user_id) VALUES (?, ?, ?, ?)",
    )
    .bind(&input.delivery_address)
    .bind(&input.promocode)
    .bind(now)
    .bind(input.user_id)
    .execute(&mut *conn)
    .await
    .context("Failed to create order")?;
    let id = result.last_insert_rowid();

    link_products(conn, id, &input.product_ids).await?;

    let mut product_ids = input.product_ids.clone();
    product_ids.sort_unstable();
    product_ids.dedup();

    Ok(Order {
        id,
        delivery_address: input.delivery_address.clone(),
        promocode: input.promocode.clone(),
        created_at: now,
        user_id: input.user_id,
        product_ids,
    })
}

async fn link_products(conn: &mut SqliteConnection, order_id: i64, product_ids: &[i64]) -> Result<()> {
    for product_id in product_ids {
        sqlx::query("INSERT OR IGNORE INTO order_products (order_id, product_id) VALUES (?, ?)")
            .bind(order_id)
            .bind(product_id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to link product {} to order", product_id))?;
    }
    Ok(())
}

const SELECT_WITH_USER: &str = r#"
    SELECT o.id, o.delivery_address, o.promocode, o.created_at, o.user_id,
           u.username AS u_username, u.password_hash AS u_password_hash,
           u.first_name AS u_first_name, u.last_name AS u_last_name, u.email AS u_email,
           u.is_staff AS u_is_staff, u.is_superuser AS u_is_superuser,
           u.is_active AS u_is_active, u.date_joined AS u_date_joined
    FROM orders o
    INNER JOIN users u ON u.id = o.user_id
"#;

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, input: &OrderInput) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let order = insert_order(&mut tx, input).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn create_many(&self, inputs: &[OrderInput]) -> Result<Vec<Order>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let order = insert_order(&mut tx, input)
                .await
                .with_context(|| format!("Failed to insert order row {}", index + 1))?;
            created.push(order);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn get_or_create_with_products(
        &self,
        user_id: i64,
        delivery_address: &str,
        promocode: &str,
        product_ids: &[i64],
    ) -> Result<(Order, bool)> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT id FROM orders
            WHERE user_id = ? AND delivery_address = ? AND promocode = ?
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(delivery_address)
        .bind(promocode)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up order")?;

        let (id, created) = match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                link_products(&mut tx, id, product_ids).await?;
                (id, false)
            }
            None => {
                let input = OrderInput {
                    delivery_address: delivery_address.to_string(),
                    promocode: promocode.to_string(),
                    user_id,
                    product_ids: product_ids.to_vec(),
                };
                (insert_order(&mut tx, &input).await?.id, true)
            }
        };

        tx.commit().await?;

        let order = self
            .get_by_id(id)
            .await?
            .context("Order missing after commit")?;
        Ok((order, created))
    }

    async fn update(&self, id: i64, input: &OrderInput) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE orders SET delivery_address = ?, promocode = ?, user_id = ? WHERE id = ?",
        )
        .bind(&input.delivery_address)
        .bind(&input.promocode)
        .bind(input.user_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update order")?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM order_products WHERE order_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear order products")?;
        link_products(&mut tx, id, &input.product_ids).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete order")?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, delivery_address, promocode, created_at, user_id FROM orders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get order")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order(&row);
        order.product_ids = self
            .product_ids_for(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(Some(order))
    }

    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, delivery_address, promocode, created_at, user_id FROM orders WHERE 1 = 1",
        );
        if let Some(address) = &query.delivery_address {
            qb.push(" AND delivery_address = ");
            qb.push_bind(address.clone());
        }
        if let Some(promocode) = &query.promocode {
            qb.push(" AND promocode = ");
            qb.push_bind(promocode.clone());
        }
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ");
            qb.push_bind(user_id);
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
            .context("Failed to list orders")?;

        let mut orders: Vec<Order> = rows.iter().map(row_to_order).collect();
        let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let mut links = self.product_ids_for(&ids).await?;
        for order in &mut orders {
            order.product_ids = links.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn list_with_relations(&self, user_id: Option<i64>) -> Result<Vec<OrderWithRelations>> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!("{} WHERE o.user_id = ? ORDER BY o.id", SELECT_WITH_USER))
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY o.id", SELECT_WITH_USER))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to list orders")?;

        self.with_relations(rows).await
    }

    async fn get_with_relations(&self, id: i64) -> Result<Option<OrderWithRelations>> {
        let row = sqlx::query(&format!("{} WHERE o.id = ?", SELECT_WITH_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get order")?;

        match row {
            Some(row) => Ok(self.with_relations(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn totals(&self) -> Result<Vec<OrderTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id AS order_id,
                   COUNT(p.id) AS product_count,
                   COALESCE(SUM(p.price_cents), 0) AS total
            FROM orders o
            LEFT JOIN order_products op ON op.order_id = o.id
            LEFT JOIN products p ON p.id = op.product_id
            GROUP BY o.id
            ORDER BY o.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute order totals")?;

        Ok(rows
            .into_iter()
            .map(|row| OrderTotal {
                order_id: row.get("order_id"),
                product_count: row.get("product_count"),
                total: Price::from_cents(row.get("total")),
            })
            .collect())
    }

    async fn existing_product_ids(&self, ids: &[i64], active_only: bool) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM products WHERE ");
        if active_only {
            qb.push("archived = 0 AND ");
        }
        qb.push("id IN (");
        push_id_list(&mut qb, ids);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to check product ids")?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }
}

fn row_to_order(row: &SqliteRow) -> Order {
    Order {
        id: row.get("id"),
        delivery_address: row.get("delivery_address"),
        promocode: row.get("promocode"),
        created_at: row.get("created_at"),
        user_id: row.get("user_id"),
        product_ids: Vec::new(),
    }
}

fn row_to_user_prefixed(row: &SqliteRow) -> User {
    User {
        id: row.get("user_id"),
        username: row.get("u_username"),
        password_hash: row.get("u_password_hash"),
        first_name: row.get("u_first_name"),
        last_name: row.get("u_last_name"),
        email: row.get("u_email"),
        is_staff: row.get("u_is_staff"),
        is_superuser: row.get("u_is_superuser"),
        is_active: row.get("u_is_active"),
        date_joined: row.get("u_date_joined"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::{ProductRepository, SqlxProductRepository};
    use crate::models::{OrderOrderField, ProductInput};

    struct Fixture {
        pool: DbPool,
        repo: SqlxOrderRepository,
        alice: i64,
        bob: i64,
        products: Vec<i64>,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;

        let product_repo = SqlxProductRepository::new(pool.clone());
        let mut products = Vec::new();
        for (name, cents) in [("Laptop", 199900), ("Desktop", 299900), ("Phone", 99900)] {
            let p = product_repo
                .create(
                    &ProductInput {
                        name: name.into(),
                        description: String::new(),
                        price: Price::from_cents(cents),
                        discount: 0,
                    },
                    Some(alice),
                )
                .await
                .unwrap();
            products.push(p.id);
        }

        Fixture {
            repo: SqlxOrderRepository::new(pool.clone()),
            pool,
            alice,
            bob,
            products,
        }
    }

    fn input(user_id: i64, address: &str, promocode: &str, product_ids: Vec<i64>) -> OrderInput {
        OrderInput {
            delivery_address: address.into(),
            promocode: promocode.into(),
            user_id,
            product_ids,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = fixture().await;
        let order = f
            .repo
            .create(&input(f.alice, "Street 1", "SALE", vec![f.products[1], f.products[0]]))
            .await
            .unwrap();

        let found = f.repo.get_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(found.product_ids, vec![f.products[0], f.products[1]]);
        assert_eq!(found.promocode, "SALE");
    }

    #[tokio::test]
    async fn test_create_with_unknown_product_rolls_back() {
        let f = fixture().await;
        assert!(f.repo.create(&input(f.alice, "x", "", vec![f.products[0], 999])).await.is_err());

        let row = sqlx::query("SELECT COUNT(*) AS n FROM orders")
            .fetch_one(&f.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_links() {
        let f = fixture().await;
        let order = f
            .repo
            .create(&input(f.alice, "a", "", vec![f.products[0]]))
            .await
            .unwrap();

        assert!(f
            .repo
            .update(order.id, &input(f.bob, "b", "X", vec![f.products[2]]))
            .await
            .unwrap());
        assert!(!f.repo.update(999, &input(f.bob, "b", "", vec![])).await.unwrap());

        let found = f.repo.get_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, f.bob);
        assert_eq!(found.product_ids, vec![f.products[2]]);
    }

    #[tokio::test]
    async fn test_list_filters_and_ordering() {
        let f = fixture().await;
        f.repo.create(&input(f.alice, "b street", "", vec![])).await.unwrap();
        f.repo.create(&input(f.bob, "a street", "PROMO", vec![])).await.unwrap();
        f.repo.create(&input(f.alice, "c street", "PROMO", vec![])).await.unwrap();

        let q = OrderQuery {
            user_id: Some(f.alice),
            ..Default::default()
        };
        assert_eq!(f.repo.list(&q).await.unwrap().len(), 2);

        let q = OrderQuery {
            promocode: Some("PROMO".into()),
            ordering: vec![(OrderOrderField::DeliveryAddress, true)],
            ..Default::default()
        };
        let addresses: Vec<String> = f
            .repo
            .list(&q)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.delivery_address)
            .collect();
        assert_eq!(addresses, vec!["c street", "a street"]);
    }

    #[tokio::test]
    async fn test_relations_and_totals() {
        let f = fixture().await;
        f.repo
            .create(&input(f.alice, "a", "", vec![f.products[0], f.products[2]]))
            .await
            .unwrap();
        f.repo.create(&input(f.bob, "b", "", vec![])).await.unwrap();

        let all = f.repo.list_with_relations(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user.username, "alice");
        assert_eq!(all[0].products.len(), 2);
        assert_eq!(all[0].total(), Price::from_cents(299800));

        let bobs = f.repo.list_with_relations(Some(f.bob)).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert!(bobs[0].products.is_empty());

        let totals = f.repo.totals().await.unwrap();
        assert_eq!(totals[0].product_count, 2);
        assert_eq!(totals[0].total, Price::from_cents(299800));
        assert_eq!(totals[1].product_count, 0);
        assert_eq!(totals[1].total, Price::from_cents(0));
    }

    #[tokio::test]
    async fn test_get_or_create_with_products() {
        let f = fixture().await;

        let (order, created) = f
            .repo
            .get_or_create_with_products(f.alice, "123 Main st", "BLACKFRIDAY", &[f.products[0]])
            .await
            .unwrap();
        assert!(created);

        let (again, created) = f
            .repo
            .get_or_create_with_products(f.alice, "123 Main st", "BLACKFRIDAY", &f.products)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, order.id);
        assert_eq!(again.product_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_existing_product_ids() {
        let f = fixture().await;
        sqlx::query("UPDATE products SET archived = 1 WHERE id = ?")
            .bind(f.products[1])
            .execute(&f.pool)
            .await
            .unwrap();

        let mut all = f
            .repo
            .existing_product_ids(&[f.products[0], f.products[1], 999], false)
            .await
            .unwrap();
        all.sort_unstable();
        assert_eq!(all, vec![f.products[0], f.products[1]]);

        let active = f
            .repo
            .existing_product_ids(&[f.products[0], f.products[1]], true)
            .await
            .unwrap();
        assert_eq!(active, vec![f.products[0]]);
    }
}
