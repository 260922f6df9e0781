//! Services layer - Business logic
//!
//! Services implement the site's rules on top of the repositories:
//! validation, permission checks, cache use and media storage.

pub mod blog;
pub mod media;
pub mod order;
pub mod password;
pub mod product;
pub mod sitemap;
pub mod user;
pub mod validation;

pub use blog::{BlogService, BlogServiceError, SeedReport};
pub use media::{MediaError, MediaStorage, UploadedFile};
pub use order::{OrderService, OrderServiceError, OrdersExport, PERM_VIEW_ORDER};
pub use password::{hash_password, verify_password};
pub use product::{
    validate_product, ProductService, ProductServiceError, ProductsExport, PERM_ADD_PRODUCT,
    PERM_CHANGE_PRODUCT,
};
pub use sitemap::SitemapService;
pub use user::{can_edit_user, RegisterInput, UserService, UserServiceError};
pub use validation::{FormErrors, NON_FIELD_ERRORS};
