//! Data models
//!
//! Database entities, request inputs and serialized export formats for
//! the accounts, blog and shop parts of the site.

mod article;
mod author;
mod category;
mod field;
mod order;
mod price;
mod product;
mod session;
mod syndication;
mod tag;
mod user;

pub use article::{truncate_chars, Article, ArticleWithRelations, CreateArticleInput};
pub use author::Author;
pub use category::Category;
pub use field::FieldValue;
pub use order::{
    Order, OrderCsvRow, OrderExport, OrderForm, OrderInput, OrderOrderField, OrderQuery,
    OrderTotal, OrderWithRelations, PROMOCODE_MAX_LEN,
};
pub use price::{Price, PriceError, MAX_CENTS};
pub use product::{
    media_url, PriceStats, Product, ProductCsvRow, ProductExport, ProductForm, ProductImage, ProductInput,
    ProductOrderField, ProductQuery, ProductWithImages, NAME_MAX_LEN,
};
pub use session::Session;
pub use syndication::{ChangeFreq, Feed, FeedItem, SitemapEntry, FEED_DESCRIPTION_LEN};
pub use tag::Tag;
pub use user::{CreateUserInput, Group, Profile, UpdateProfileInput, User, UserFlags, UserWithProfile};
