//! Sitemap sections for the blog and the shop

use crate::models::{ChangeFreq, SitemapEntry};
use crate::services::blog::{BlogService, BlogServiceError};
use crate::services::product::{ProductService, ProductServiceError};
use std::sync::Arc;

pub struct SitemapService {
    blog: Arc<BlogService>,
    products: Arc<ProductService>,
}

impl SitemapService {
    pub fn new(blog: Arc<BlogService>, products: Arc<ProductService>) -> Self {
        Self { blog, products }
    }

    /// Published articles, newest first
    pub async fn blog_section(&self) -> Result<Vec<SitemapEntry>, BlogServiceError> {
        Ok(self
            .blog
            .list_published()
            .await?
            .iter()
            .map(|a| SitemapEntry {
                location: a.url(),
                lastmod: a.article.published_at,
                changefreq: ChangeFreq::Never,
                priority: 0.5,
            })
            .collect())
    }

    /// Non-archived products
    pub async fn shop_section(&self) -> Result<Vec<SitemapEntry>, ProductServiceError> {
        Ok(self
            .products
            .list_active()
            .await?
            .iter()
            .map(|p| SitemapEntry {
                location: p.url(),
                lastmod: Some(p.created_at),
                changefreq: ChangeFreq::Weekly,
                priority: 0.9,
            })
            .collect())
    }

    /// Both sections, blog first
    pub async fn entries(&self) -> anyhow::Result<Vec<SitemapEntry>> {
        let mut entries = self.blog_section().await?;
        entries.extend(self.shop_section().await?);
        Ok(entries)
    }
}
