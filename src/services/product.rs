//! Product service
//!
//! Catalogue reads, permission-checked writes, cached exports, the
//! latest-products feed and CSV import/export.

use crate::cache::{Cache, CacheLayer, PRODUCTS_EXPORT_KEY};
use crate::db::repositories::ProductRepository;
use crate::models::{
    truncate_chars, Feed, FeedItem, FieldValue, Price, PriceStats, Product, ProductCsvRow, ProductExport,
    ProductForm, ProductInput, ProductQuery, ProductWithImages, User,
    FEED_DESCRIPTION_LEN, NAME_MAX_LEN,
};
use crate::services::media::{product_images_dir, product_preview_dir, MediaError, MediaStorage, UploadedFile};
use crate::services::user::{UserService, UserServiceError};
use crate::services::validation::{check_length, FormErrors};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const PERM_ADD_PRODUCT: &str = "shopapp.add_product";
pub const PERM_CHANGE_PRODUCT: &str = "shopapp.change_product";

/// Lifetime of the cached products export
pub const EXPORT_TTL: Duration = Duration::from_secs(300);
/// Lifetime of a cached REST list response
pub const LIST_TTL: Duration = Duration::from_secs(120);

const LIST_CACHE_PREFIX: &str = "products_api:";
const FEED_SIZE: i64 = 5;
const CSV_HEADER: [&str; 5] = ["name", "description", "price", "discount", "created_by"];

/// Fixed-length cache key for a REST list query; parameter order is ignored
fn list_cache_key(query_string: &str) -> String {
    let mut params: Vec<&str> = query_string.split('&').filter(|p| !p.is_empty()).collect();
    params.sort_unstable();
    let digest = Sha256::digest(params.join("&").as_bytes());
    let hex = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
    format!("{}{}", LIST_CACHE_PREFIX, hex)
}

/// Error types for product service operations
#[derive(Debug, thiserror::Error)]
pub enum ProductServiceError {
    #[error("Product not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(FormErrors),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FormErrors> for ProductServiceError {
    fn from(errors: FormErrors) -> Self {
        Self::ValidationError(errors)
    }
}

impl From<UserServiceError> for ProductServiceError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::ValidationError(errors) => Self::ValidationError(errors),
            UserServiceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            UserServiceError::NotFound(msg) => Self::InternalError(anyhow::anyhow!("{} not found", msg)),
            UserServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

fn media_error(field: &str, err: MediaError) -> ProductServiceError {
    match err {
        MediaError::Io(e) => ProductServiceError::InternalError(e.into()),
        other => FormErrors::single(field, other.to_string()).into(),
    }
}

/// Body of the products export
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ProductsExport {
    pub products: Vec<ProductExport>,
}

/// Validate raw product fields; with `base` set, missing fields keep
/// the existing values (partial update)
pub fn validate_product(form: &ProductForm, base: Option<&Product>) -> Result<ProductInput, FormErrors> {
    let mut errors = FormErrors::new();

    let name = form
        .name
        .clone()
        .or_else(|| base.map(|p| p.name.clone()))
        .unwrap_or_default();
    check_length(&mut errors, "name", &name, true, NAME_MAX_LEN);

    let description = form
        .description
        .clone()
        .or_else(|| base.map(|p| p.description.clone()))
        .unwrap_or_default();

    let price = match (&form.price, base) {
        (Some(value), _) => {
            let text = value.as_text();
            if text.is_empty() {
                errors.add("price", "This field is required.");
                None
            } else {
                match text.parse() {
                    Ok(price) => Some(price),
                    Err(e) => {
                        errors.add("price", format!("{}", e));
                        None
                    }
                }
            }
        }
        (None, Some(product)) => Some(product.price),
        (None, None) => {
            errors.add("price", "This field is required.");
            None
        }
    };

    let discount = match (&form.discount, base) {
        (Some(FieldValue::Text(text)), _) if text.trim().is_empty() => Some(0),
        (Some(value), _) => match value.as_int() {
            Some(d) if (0..=100).contains(&d) => Some(d),
            Some(_) => {
                errors.add("discount", "Ensure this value is between 0 and 100.");
                None
            }
            None => {
                errors.add("discount", "Enter a whole number.");
                None
            }
        },
        (None, Some(product)) => Some(product.discount),
        (None, None) => Some(0),
    };

    match (price, discount) {
        (Some(price), Some(discount)) if errors.is_empty() => Ok(ProductInput {
            name: name.trim().to_string(),
            description,
            price,
            discount,
        }),
        _ => Err(errors),
    }
}

pub struct ProductService {
    product_repo: Arc<dyn ProductRepository>,
    users: Arc<UserService>,
    cache: Arc<Cache>,
    media: Arc<MediaStorage>,
}

impl ProductService {
    pub fn new(
        product_repo: Arc<dyn ProductRepository>,
        users: Arc<UserService>,
        cache: Arc<Cache>,
        media: Arc<MediaStorage>,
    ) -> Self {
        Self {
            product_repo,
            users,
            cache,
            media,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Non-archived products
    pub async fn list_active(&self) -> Result<Vec<Product>, ProductServiceError> {
        Ok(self.product_repo.list_active().await?)
    }

    /// Filtered and ordered products, archived included
    pub async fn list(&self, query: &ProductQuery) -> Result<Vec<Product>, ProductServiceError> {
        Ok(self.product_repo.list(query).await?)
    }

    /// Serialized REST list response, cached per query string
    pub async fn list_cached(
        &self,
        query_string: &str,
        query: &ProductQuery,
    ) -> Result<serde_json::Value, ProductServiceError> {
        let key = list_cache_key(query_string);
        if let Some(body) = self.cache.get::<serde_json::Value>(&key).await? {
            tracing::debug!("Cache hit for {}", key);
            return Ok(body);
        }

        tracing::debug!("Cache miss for {}", key);
        let products = self.list(query).await?;
        let body = serde_json::to_value(&products).map_err(anyhow::Error::from)?;
        self.cache.set(&key, &body, LIST_TTL).await?;
        Ok(body)
    }

    pub async fn get(&self, id: i64) -> Result<Product, ProductServiceError> {
        self.product_repo
            .get_by_id(id)
            .await?
            .ok_or(ProductServiceError::NotFound(id))
    }

    pub async fn get_with_images(&self, id: i64) -> Result<ProductWithImages, ProductServiceError> {
        self.product_repo
            .get_with_images(id)
            .await?
            .ok_or(ProductServiceError::NotFound(id))
    }

    /// Every product ordered by pk, cached for five minutes
    pub async fn export_data(&self) -> Result<ProductsExport, ProductServiceError> {
        if let Some(export) = self.cache.get::<ProductsExport>(PRODUCTS_EXPORT_KEY).await? {
            tracing::debug!("Cache hit for {}", PRODUCTS_EXPORT_KEY);
            return Ok(export);
        }

        let products = self
            .product_repo
            .list(&ProductQuery::default())
            .await?
            .into_iter()
            .map(|p| ProductExport {
                pk: p.id,
                name: p.name,
                descriptions: p.description,
                price: p.price,
                archived: p.archived,
            })
            .collect();
        let export = ProductsExport { products };

        self.cache.set(PRODUCTS_EXPORT_KEY, &export, EXPORT_TTL).await?;
        Ok(export)
    }

    /// RSS channel with the newest non-archived products
    pub async fn latest_feed(&self) -> Result<Feed, ProductServiceError> {
        let items = self
            .product_repo
            .latest_active(FEED_SIZE)
            .await?
            .iter()
            .map(|p| FeedItem {
                title: p.name.clone(),
                description: truncate_chars(&p.description, FEED_DESCRIPTION_LEN),
                link: p.url(),
                pub_date: Some(p.created_at),
            })
            .collect();

        Ok(Feed {
            title: "Latest products in the shop".to_string(),
            description: "Updates on the latest products added to our shop.".to_string(),
            link: "/shop/products/".to_string(),
            items,
        })
    }

    pub async fn price_stats(&self, name_contains: Option<&str>) -> Result<PriceStats, ProductServiceError> {
        Ok(self.product_repo.price_stats(name_contains).await?)
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub async fn can_create(&self, actor: &User) -> Result<bool, ProductServiceError> {
        Ok(self.users.has_perm(actor, PERM_ADD_PRODUCT).await?)
    }

    /// Superusers, or holders of the change permission who created the
    /// product
    pub async fn can_change(&self, actor: &User, product: &Product) -> Result<bool, ProductServiceError> {
        if actor.is_active && actor.is_superuser {
            return Ok(true);
        }
        Ok(product.created_by == Some(actor.id) && self.users.has_perm(actor, PERM_CHANGE_PRODUCT).await?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Validate and insert a product
    pub async fn create(
        &self,
        form: &ProductForm,
        created_by: Option<i64>,
    ) -> Result<Product, ProductServiceError> {
        let input = validate_product(form, None)?;
        let product = self.product_repo.create(&input, created_by).await?;
        tracing::info!("Created product {} ({})", product.id, product.name);
        self.invalidate().await?;
        Ok(product)
    }

    /// Create on behalf of a user holding the add permission, storing an
    /// optional preview image
    pub async fn create_as(
        &self,
        actor: &User,
        form: &ProductForm,
        preview: Option<UploadedFile>,
    ) -> Result<Product, ProductServiceError> {
        if !self.can_create(actor).await? {
            return Err(ProductServiceError::PermissionDenied(PERM_ADD_PRODUCT.into()));
        }

        let input = validate_product(form, None)?;
        if let Some(file) = &preview {
            self.media.validate(file).map_err(|e| media_error("preview", e))?;
        }

        let mut product = self.product_repo.create(&input, Some(actor.id)).await?;
        tracing::info!("User {} created product {} ({})", actor.username, product.id, product.name);

        if let Some(file) = preview {
            product.preview = Some(self.store_preview(product.id, &file).await?);
        }

        self.invalidate().await?;
        Ok(product)
    }

    /// Validate and store new field values; `partial` keeps fields that
    /// were not submitted
    pub async fn update(
        &self,
        id: i64,
        form: &ProductForm,
        partial: bool,
    ) -> Result<Product, ProductServiceError> {
        let current = self.get(id).await?;
        let input = validate_product(form, partial.then_some(&current))?;

        self.product_repo.update(id, &input).await?;
        tracing::info!("Updated product {}", id);
        self.invalidate().await?;
        self.get(id).await
    }

    /// Update on behalf of a user, attaching uploaded images
    pub async fn update_as(
        &self,
        actor: &User,
        id: i64,
        form: &ProductForm,
        preview: Option<UploadedFile>,
        images: Vec<UploadedFile>,
    ) -> Result<ProductWithImages, ProductServiceError> {
        let current = self.get(id).await?;
        if !self.can_change(actor, &current).await? {
            return Err(ProductServiceError::PermissionDenied(PERM_CHANGE_PRODUCT.into()));
        }

        let input = validate_product(form, None)?;
        if let Some(file) = &preview {
            self.media.validate(file).map_err(|e| media_error("preview", e))?;
        }
        for file in &images {
            self.media.validate(file).map_err(|e| media_error("images", e))?;
        }

        // Store every file before any row changes
        let preview_path = match &preview {
            Some(file) => Some(
                self.media
                    .save(&product_preview_dir(id), file)
                    .await
                    .map_err(|e| media_error("preview", e))?,
            ),
            None => None,
        };
        let mut image_paths = Vec::with_capacity(images.len());
        for file in &images {
            let path = self
                .media
                .save(&product_images_dir(id), file)
                .await
                .map_err(|e| media_error("images", e))?;
            image_paths.push(path);
        }

        self.product_repo.update(id, &input).await?;
        if let Some(path) = &preview_path {
            self.product_repo.set_preview(id, path).await?;
        }
        for path in &image_paths {
            self.product_repo.add_image(id, path, "").await?;
        }

        tracing::info!("User {} updated product {}", actor.username, id);
        self.invalidate().await?;
        self.get_with_images(id).await
    }

    /// Hide a product from listings; products are never deleted this way
    pub async fn archive(&self, id: i64) -> Result<(), ProductServiceError> {
        if !self.product_repo.archive(id).await? {
            return Err(ProductServiceError::NotFound(id));
        }
        tracing::info!("Archived product {}", id);
        self.invalidate().await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ProductServiceError> {
        if !self.product_repo.delete(id).await? {
            return Err(ProductServiceError::NotFound(id));
        }
        tracing::info!("Deleted product {}", id);
        self.invalidate().await?;
        Ok(())
    }

    async fn store_preview(&self, id: i64, file: &UploadedFile) -> Result<String, ProductServiceError> {
        let path = self
            .media
            .save(&product_preview_dir(id), file)
            .await
            .map_err(|e| media_error("preview", e))?;
        self.product_repo.set_preview(id, &path).await?;
        Ok(path)
    }

    /// Bulk-create the sample smartphones owned by `owner` and give every
    /// smartphone a 10% discount; returns (created, discounted)
    pub async fn bulk_discount(&self, owner: i64) -> Result<(Vec<Product>, u64), ProductServiceError> {
        let rows: Vec<ProductCsvRow> = [("Smartphone 1", 199), ("Smartphone 2", 299), ("Smartphone 3", 399)]
            .into_iter()
            .map(|(name, price)| ProductCsvRow {
                name: name.to_string(),
                description: String::new(),
                price: Price::from_cents(price * 100),
                discount: 0,
                created_by: Some(owner),
            })
            .collect();

        let created = self.product_repo.create_many(&rows).await?;
        let updated = self
            .product_repo
            .set_discount_where_name_contains("Smartphone", 10)
            .await?;

        tracing::info!("Created {} products, discounted {}", created.len(), updated);
        self.invalidate().await?;
        Ok((created, updated))
    }

    // ------------------------------------------------------------------
    // CSV
    // ------------------------------------------------------------------

    /// Write products as CSV with the import columns
    pub fn to_csv(&self, products: &[Product]) -> Result<Vec<u8>, ProductServiceError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        // serialize() only emits the header together with the first row
        if products.is_empty() {
            writer
                .write_record(CSV_HEADER)
                .map_err(anyhow::Error::from)?;
        }
        for product in products {
            writer
                .serialize(ProductCsvRow {
                    name: product.name.clone(),
                    description: product.description.clone(),
                    price: product.price,
                    discount: product.discount,
                    created_by: product.created_by,
                })
                .map_err(anyhow::Error::from)?;
        }
        writer
            .into_inner()
            .map_err(|e| ProductServiceError::InternalError(anyhow::anyhow!("Failed to write CSV: {}", e)))
    }

    /// Parse and insert every row in one transaction; any bad row
    /// rejects the whole file
    pub async fn import_csv(&self, data: &[u8]) -> Result<Vec<Product>, ProductServiceError> {
        let mut reader = csv::Reader::from_reader(data);
        let mut rows = Vec::new();
        let mut errors = FormErrors::new();

        for (i, record) in reader.deserialize::<ProductCsvRow>().enumerate() {
            let line = i + 2;
            match record {
                Ok(row) => {
                    let form = ProductForm {
                        name: Some(row.name.clone()),
                        description: Some(row.description.clone()),
                        price: Some(FieldValue::Text(row.price.to_string())),
                        discount: Some(FieldValue::Int(row.discount)),
                    };
                    match validate_product(&form, None) {
                        Ok(_) => rows.push(row),
                        Err(e) => errors.add("file", format!("Row {}: {}", line, e)),
                    }
                }
                Err(e) => errors.add("file", format!("Row {}: {}", line, e)),
            }
        }

        let owners: HashSet<i64> = rows.iter().filter_map(|r| r.created_by).collect();
        for owner in owners {
            if let Err(UserServiceError::NotFound(_)) = self.users.get_user(owner).await {
                errors.add("file", format!("User {} does not exist.", owner));
            }
        }

        if rows.is_empty() && errors.is_empty() {
            errors.add("file", "The submitted file contains no rows.");
        }
        errors.into_result()?;

        let products = self.product_repo.create_many(&rows).await?;
        tracing::info!("Imported {} products from CSV", products.len());
        self.invalidate().await?;
        Ok(products)
    }

    async fn invalidate(&self) -> Result<(), ProductServiceError> {
        self.cache.delete(PRODUCTS_EXPORT_KEY).await?;
        self.cache.delete_pattern(&format!("{}*", LIST_CACHE_PREFIX)).await?;
        Ok(())
    }
}
