//! Shop order model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, Product, User};

/// Maximum length of a promocode
pub const PROMOCODE_MAX_LEN: usize = 20;

/// Order row with the ids of its products
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Order {
    #[serde(rename = "pk")]
    pub id: i64,
    pub delivery_address: String,
    pub promocode: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "user")]
    pub user_id: i64,
    #[serde(rename = "products")]
    pub product_ids: Vec<i64>,
}

/// Order with its user and products loaded
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithRelations {
    pub order: Order,
    pub user: User,
    pub products: Vec<Product>,
}

impl OrderWithRelations {
    pub fn total(&self) -> Price {
        Price::sum(self.products.iter().map(|p| &p.price))
    }
}

/// Fields for creating or replacing an order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderInput {
    pub delivery_address: String,
    pub promocode: String,
    pub user_id: i64,
    pub product_ids: Vec<i64>,
}

/// Raw order fields as submitted by a JSON body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderForm {
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub promocode: Option<String>,
    #[serde(default)]
    pub user: Option<i64>,
    #[serde(default)]
    pub products: Option<Vec<i64>>,
}

/// Ordering key for order listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOrderField {
    DeliveryAddress,
    Promocode,
    CreatedAt,
    User,
}

impl OrderOrderField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "delivery_address" => Some(Self::DeliveryAddress),
            "promocode" => Some(Self::Promocode),
            "created_at" => Some(Self::CreatedAt),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::DeliveryAddress => "delivery_address",
            Self::Promocode => "promocode",
            Self::CreatedAt => "created_at",
            Self::User => "user_id",
        }
    }
}

/// Exact-match filters and ordering for order list queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub delivery_address: Option<String>,
    pub promocode: Option<String>,
    pub user_id: Option<i64>,
    pub ordering: Vec<(OrderOrderField, bool)>,
}

impl OrderQuery {
    pub fn parse_ordering(ordering: Option<&str>) -> Vec<(OrderOrderField, bool)> {
        ordering
            .map(|o| {
                o.split(',')
                    .filter_map(|field| {
                        let field = field.trim();
                        let (name, desc) = match field.strip_prefix('-') {
                            Some(name) => (name, true),
                            None => (field, false),
                        };
                        OrderOrderField::parse(name).map(|f| (f, desc))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Row of the orders CSV format; `product` holds comma separated pks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCsvRow {
    pub delivery_address: String,
    #[serde(default)]
    pub promocode: String,
    pub user: i64,
    #[serde(default)]
    pub product: String,
}

impl OrderCsvRow {
    pub fn product_ids(&self) -> Result<Vec<i64>, std::num::ParseIntError> {
        self.product
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Entry of the staff orders export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderExport {
    pub pk: i64,
    pub delivery_address: String,
    pub promocode: String,
    pub user: i64,
    pub products: Vec<i64>,
}

impl From<&Order> for OrderExport {
    fn from(order: &Order) -> Self {
        Self {
            pk: order.id,
            delivery_address: order.delivery_address.clone(),
            promocode: order.promocode.clone(),
            user: order.user_id,
            products: order.product_ids.clone(),
        }
    }
}

/// Number of products and their summed price for one order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderTotal {
    pub order_id: i64,
    pub product_count: i64,
    pub total: Price,
}
