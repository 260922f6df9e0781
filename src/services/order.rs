//! Order service

use crate::cache::{user_orders_export_key, Cache, CacheLayer};
use crate::db::repositories::OrderRepository;
use crate::models::{
    Order, OrderCsvRow, OrderExport, OrderForm, OrderInput, OrderQuery, OrderTotal, OrderWithRelations,
    User, PROMOCODE_MAX_LEN,
};
use crate::services::product::{ProductService, ProductServiceError};
use crate::services::user::{UserService, UserServiceError};
use crate::services::validation::{check_length, FormErrors};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const PERM_VIEW_ORDER: &str = "shopapp.view_order";

/// Lifetime of a cached per-user export
pub const USER_EXPORT_TTL: Duration = Duration::from_secs(300);

/// Error types for order service operations
#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(FormErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FormErrors> for OrderServiceError {
    fn from(errors: FormErrors) -> Self {
        Self::ValidationError(errors)
    }
}

impl From<UserServiceError> for OrderServiceError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(what) => Self::NotFound(what),
            UserServiceError::ValidationError(errors) => Self::ValidationError(errors),
            UserServiceError::PermissionDenied(msg) => Self::InternalError(anyhow::anyhow!(msg)),
            UserServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

impl From<ProductServiceError> for OrderServiceError {
    fn from(err: ProductServiceError) -> Self {
        match err {
            ProductServiceError::NotFound(id) => Self::NotFound(format!("product {}", id)),
            ProductServiceError::ValidationError(errors) => Self::ValidationError(errors),
            ProductServiceError::PermissionDenied(msg) => Self::InternalError(anyhow::anyhow!(msg)),
            ProductServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Body of the staff orders export
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrdersExport {
    pub orders: Vec<OrderExport>,
}

/// Body of a per-user orders export
#[derive(Debug, Clone, Serialize)]
pub struct UserOrdersExport {
    pub user_id: i64,
    pub username: String,
    pub orders: Vec<Order>,
}

pub struct OrderService {
    order_repo: Arc<dyn OrderRepository>,
    users: Arc<UserService>,
    products: Arc<ProductService>,
    cache: Arc<Cache>,
}

impl OrderService {
    pub fn new(
        order_repo: Arc<dyn OrderRepository>,
        users: Arc<UserService>,
        products: Arc<ProductService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            order_repo,
            users,
            products,
            cache,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Every order with user and products
    pub async fn list_all(&self) -> Result<Vec<OrderWithRelations>, OrderServiceError> {
        Ok(self.order_repo.list_with_relations(None).await?)
    }

    /// Orders of one user; the user must exist
    pub async fn list_for_user(
        &self,
        user_id: i64,
    ) -> Result<(User, Vec<OrderWithRelations>), OrderServiceError> {
        let owner = self.users.get_user(user_id).await?;
        let orders = self.order_repo.list_with_relations(Some(user_id)).await?;
        Ok((owner, orders))
    }

    /// Filtered and ordered orders (REST list)
    pub async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>, OrderServiceError> {
        Ok(self.order_repo.list(query).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Order, OrderServiceError> {
        self.order_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| OrderServiceError::NotFound(format!("order {}", id)))
    }

    pub async fn get_with_relations(&self, id: i64) -> Result<OrderWithRelations, OrderServiceError> {
        self.order_repo
            .get_with_relations(id)
            .await?
            .ok_or_else(|| OrderServiceError::NotFound(format!("order {}", id)))
    }

    /// Product count and price sum per order
    pub async fn totals(&self) -> Result<Vec<OrderTotal>, OrderServiceError> {
        Ok(self.order_repo.totals().await?)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Validate raw order fields against the database. With `base` set,
    /// missing fields keep the existing values. `active_only` limits
    /// product choices to non-archived products.
    pub async fn validate(
        &self,
        form: &OrderForm,
        base: Option<&Order>,
        active_only: bool,
    ) -> Result<OrderInput, OrderServiceError> {
        let mut errors = FormErrors::new();

        let delivery_address = form
            .delivery_address
            .clone()
            .or_else(|| base.map(|o| o.delivery_address.clone()))
            .unwrap_or_default();
        let promocode = form
            .promocode
            .clone()
            .or_else(|| base.map(|o| o.promocode.clone()))
            .unwrap_or_default();
        check_length(&mut errors, "promocode", &promocode, false, PROMOCODE_MAX_LEN);

        let user_id = form.user.or_else(|| base.map(|o| o.user_id));
        match user_id {
            None => errors.add("user", "This field is required."),
            Some(id) => {
                if let Err(UserServiceError::NotFound(_)) = self.users.get_user(id).await {
                    errors.add(
                        "user",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                }
            }
        }

        let requested: Vec<i64> = form
            .products
            .clone()
            .or_else(|| base.map(|o| o.product_ids.clone()))
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if requested.is_empty() {
            errors.add("products", "This field is required.");
        } else {
            let existing: HashSet<i64> = self
                .order_repo
                .existing_product_ids(&requested, active_only)
                .await?
                .into_iter()
                .collect();
            for id in requested.iter().filter(|id| !existing.contains(id)) {
                errors.add(
                    "products",
                    format!("Select a valid choice. {} is not one of the available choices.", id),
                );
            }
        }

        errors.into_result()?;
        Ok(OrderInput {
            delivery_address,
            promocode,
            user_id: user_id.unwrap_or_default(),
            product_ids: requested,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create an order; only non-archived products may be chosen
    pub async fn create(&self, form: &OrderForm) -> Result<Order, OrderServiceError> {
        let input = self.validate(form, None, true).await?;
        let order = self.order_repo.create(&input).await?;
        tracing::info!("Created order {} for user {}", order.id, order.user_id);
        self.invalidate(order.user_id).await?;
        Ok(order)
    }

    /// Replace an order's fields; `partial` keeps fields that were not
    /// submitted
    pub async fn update(&self, id: i64, form: &OrderForm, partial: bool) -> Result<Order, OrderServiceError> {
        let current = self.get(id).await?;
        let input = self.validate(form, partial.then_some(&current), false).await?;

        self.order_repo.update(id, &input).await?;
        tracing::info!("Updated order {}", id);
        self.invalidate(current.user_id).await?;
        if input.user_id != current.user_id {
            self.invalidate(input.user_id).await?;
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), OrderServiceError> {
        let order = self.get(id).await?;
        self.order_repo.delete(id).await?;
        tracing::info!("Deleted order {}", id);
        self.invalidate(order.user_id).await
    }

    /// Find or create the user's order and attach every non-archived
    /// product, in one transaction
    pub async fn create_for_username(
        &self,
        username: &str,
        delivery_address: &str,
        promocode: &str,
    ) -> Result<(Order, bool), OrderServiceError> {
        let user = self.users.get_user_by_username(username).await?;
        let product_ids: Vec<i64> = self.products.list_active().await?.iter().map(|p| p.id).collect();

        let (order, created) = self
            .order_repo
            .get_or_create_with_products(user.id, delivery_address, promocode, &product_ids)
            .await?;
        tracing::info!(
            "{} order {} with {} products",
            if created { "Created" } else { "Updated" },
            order.id,
            order.product_ids.len()
        );
        self.invalidate(user.id).await?;
        Ok((order, created))
    }

    // ------------------------------------------------------------------
    // Exports and CSV
    // ------------------------------------------------------------------

    /// Every order ordered by pk
    pub async fn export_all(&self) -> Result<OrdersExport, OrderServiceError> {
        let orders = self.order_repo.list(&OrderQuery::default()).await?;
        Ok(OrdersExport {
            orders: orders.iter().map(OrderExport::from).collect(),
        })
    }

    /// Serialized orders of one user, cached for five minutes
    pub async fn export_for_user(&self, user_id: i64) -> Result<serde_json::Value, OrderServiceError> {
        let key = user_orders_export_key(user_id);
        if let Some(body) = self.cache.get::<serde_json::Value>(&key).await? {
            tracing::debug!("Cache hit for {}", key);
            return Ok(body);
        }

        let user = self.users.get_user(user_id).await?;
        let orders = self
            .order_repo
            .list(&OrderQuery {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await?;
        let export = UserOrdersExport {
            user_id: user.id,
            username: user.username,
            orders,
        };

        let body = serde_json::to_value(&export).map_err(anyhow::Error::from)?;
        self.cache.set(&key, &body, USER_EXPORT_TTL).await?;
        Ok(body)
    }

    /// Parse and insert every row in one transaction; unknown users or
    /// products reject the whole file
    pub async fn import_csv(&self, data: &[u8]) -> Result<Vec<Order>, OrderServiceError> {
        let mut reader = csv::Reader::from_reader(data);
        let mut inputs = Vec::new();
        let mut errors = FormErrors::new();

        for (i, record) in reader.deserialize::<OrderCsvRow>().enumerate() {
            let line = i + 2;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    errors.add("file", format!("Row {}: {}", line, e));
                    continue;
                }
            };
            let product_ids = match row.product_ids() {
                Ok(ids) => ids,
                Err(e) => {
                    errors.add("file", format!("Row {}: invalid product list: {}", line, e));
                    continue;
                }
            };
            if row.promocode.chars().count() > PROMOCODE_MAX_LEN {
                errors.add("file", format!("Row {}: promocode is too long.", line));
                continue;
            }

            if let Err(UserServiceError::NotFound(_)) = self.users.get_user(row.user).await {
                errors.add("file", format!("Row {}: user {} does not exist.", line, row.user));
                continue;
            }
            let existing: HashSet<i64> = self
                .order_repo
                .existing_product_ids(&product_ids, false)
                .await?
                .into_iter()
                .collect();
            if let Some(missing) = product_ids.iter().find(|id| !existing.contains(id)) {
                errors.add("file", format!("Row {}: product {} does not exist.", line, missing));
                continue;
            }

            inputs.push(OrderInput {
                delivery_address: row.delivery_address,
                promocode: row.promocode,
                user_id: row.user,
                product_ids,
            });
        }

        if inputs.is_empty() && errors.is_empty() {
            errors.add("file", "The submitted file contains no rows.");
        }
        errors.into_result()?;

        let orders = self.order_repo.create_many(&inputs).await?;
        tracing::info!("Imported {} orders from CSV", orders.len());
        for user_id in orders.iter().map(|o| o.user_id).collect::<HashSet<_>>() {
            self.invalidate(user_id).await?;
        }
        Ok(orders)
    }

    async fn invalidate(&self, user_id: i64) -> Result<(), OrderServiceError> {
        self.cache.delete(&user_orders_export_key(user_id)).await?;
        Ok(())
    }
}
