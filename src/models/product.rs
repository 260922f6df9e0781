//! Shop product model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::{FieldValue, Price};

/// Maximum length of a product name
pub const NAME_MAX_LEN: usize = 100;

/// Product in the shop catalogue
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Product {
    #[serde(rename = "pk")]
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Price,
    /// Percentage, 0..=100
    pub discount: i64,
    pub created_at: DateTime<Utc>,
    /// Archived products are hidden from listings but never deleted
    pub archived: bool,
    /// User who created the product
    pub created_by: Option<i64>,
    /// Preview image path relative to the media root
    #[serde(serialize_with = "serialize_media_url")]
    pub preview: Option<String>,
}

impl Product {
    pub fn url(&self) -> String {
        format!("/shop/products/{}/", self.id)
    }
}

/// Render a stored media path as its public URL
pub fn media_url(path: &str) -> String {
    format!("/media/{}", path.trim_start_matches('/'))
}

fn serialize_media_url<S: Serializer>(path: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    match path {
        Some(path) => s.serialize_some(&media_url(path)),
        None => s.serialize_none(),
    }
}

/// Additional picture attached to a product
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductImage {
    pub id: i64,
    pub product_id: i64,
    pub image: String,
    pub description: String,
}

impl ProductImage {
    pub fn url(&self) -> String {
        media_url(&self.image)
    }
}

/// Product with its images
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithImages {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
}

/// Validated product fields for create/update
#[derive(Debug, Clone, PartialEq)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub discount: i64,
}

/// Raw product fields as submitted by a form or JSON body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<FieldValue>,
    #[serde(default)]
    pub discount: Option<FieldValue>,
}

/// Ordering key for product listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOrderField {
    Name,
    Price,
    Discount,
}

impl ProductOrderField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            "discount" => Some(Self::Discount),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Price => "price_cents",
            Self::Discount => "discount",
        }
    }
}

/// Search and ordering for product list queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    /// Every term must match name or description
    pub search_terms: Vec<String>,
    /// (field, descending)
    pub ordering: Vec<(ProductOrderField, bool)>,
}

impl ProductQuery {
    /// Build from raw `search` and `ordering` query parameters
    pub fn from_params(search: Option<&str>, ordering: Option<&str>) -> Self {
        let search_terms = search
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let ordering = ordering
            .map(|o| {
                o.split(',')
                    .filter_map(|field| {
                        let field = field.trim();
                        let (name, desc) = match field.strip_prefix('-') {
                            Some(name) => (name, true),
                            None => (field, false),
                        };
                        ProductOrderField::parse(name).map(|f| (f, desc))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            search_terms,
            ordering,
        }
    }
}

/// Row of the products CSV format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCsvRow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub discount: i64,
    #[serde(default)]
    pub created_by: Option<i64>,
}

/// Entry of the cached products export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductExport {
    pub pk: i64,
    pub name: String,
    pub descriptions: String,
    pub price: Price,
    pub archived: bool,
}

/// Price aggregates over a set of products
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PriceStats {
    pub count: i64,
    pub avg: Option<Price>,
    pub max: Option<Price>,
    pub min: Option<Price>,
    pub sum: Option<Price>,
}
