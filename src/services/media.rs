//! Uploaded media storage
//!
//! Files are written below the configured media root in per-object
//! directories such as `profiles/user_3/avatars/`. Stored paths are
//! relative to the root and served under `/media/`.

use std::path::{Path, PathBuf};

use crate::config::MediaConfig;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Upload a valid image. Type {0} is not allowed.")]
    TypeNotAllowed(String),
    #[error("File too large. Maximum size is {0} bytes.")]
    TooLarge(u64),
    #[error("The submitted file is empty.")]
    Empty,
    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded file held in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct MediaStorage {
    config: MediaConfig,
}

impl MediaStorage {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Check type and size without writing anything
    pub fn validate(&self, file: &UploadedFile) -> Result<(), MediaError> {
        if file.data.is_empty() {
            return Err(MediaError::Empty);
        }
        if !self.config.is_type_allowed(&file.content_type) {
            return Err(MediaError::TypeNotAllowed(file.content_type.clone()));
        }
        if file.data.len() as u64 > self.config.max_file_size {
            return Err(MediaError::TooLarge(self.config.max_file_size));
        }
        Ok(())
    }

    /// Validate and write a file into `dir`, returning its relative path
    pub async fn save(&self, dir: &str, file: &UploadedFile) -> Result<String, MediaError> {
        self.validate(file)?;

        let relative = format!("{}/{}", dir.trim_matches('/'), sanitize_file_name(&file.file_name));
        let target = self.config.path.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let target = unique_path(target).await;
        tokio::fs::write(&target, &file.data).await?;

        let stored = target
            .strip_prefix(&self.config.path)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or(relative);

        tracing::info!("Stored upload {} ({} bytes)", stored, file.data.len());
        Ok(stored)
    }
}

/// Directory for a user's avatar
pub fn avatar_dir(user_id: i64) -> String {
    format!("profiles/user_{}/avatars", user_id)
}

/// Directory for a product's preview image
pub fn product_preview_dir(product_id: i64) -> String {
    format!("products/product_{}/preview", product_id)
}

/// Directory for a product's additional images
pub fn product_images_dir(product_id: i64) -> String {
    format!("products/product_{}/images", product_id)
}

/// Reduce an uploaded name to its final path component; empty names get a uuid
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('.');

    if last.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        last.to_string()
    }
}

/// Append a short random suffix when the target already exists
async fn unique_path(path: PathBuf) -> PathBuf {
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..7];

    path.with_file_name(format!("{}_{}{}", stem, suffix, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> MediaStorage {
        MediaStorage::new(MediaConfig {
            path: root.to_path_buf(),
            max_file_size: 16,
            ..MediaConfig::default()
        })
    }

    fn png(name: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\me.png"), "me.png");
        assert_eq!(sanitize_file_name("avatar.png"), "avatar.png");
        assert_eq!(sanitize_file_name("dir/").len(), 36);
    }

    #[test]
    fn test_directories() {
        assert_eq!(avatar_dir(3), "profiles/user_3/avatars");
        assert_eq!(product_preview_dir(5), "products/product_5/preview");
        assert_eq!(product_images_dir(5), "products/product_5/images");
    }

    #[tokio::test]
    async fn test_save_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let stored = storage.save(&avatar_dir(1), &png("me.png", b"img")).await.unwrap();
        assert_eq!(stored, "profiles/user_1/avatars/me.png");
        assert_eq!(std::fs::read(dir.path().join(&stored)).unwrap(), b"img");

        // Same name again gets a distinct path
        let second = storage.save(&avatar_dir(1), &png("me.png", b"img2")).await.unwrap();
        assert_ne!(second, stored);
        assert!(second.starts_with("profiles/user_1/avatars/me_"));
    }

    #[tokio::test]
    async fn test_save_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let mut pdf = png("doc.pdf", b"x");
        pdf.content_type = "application/pdf".into();
        assert!(matches!(storage.save("x", &pdf).await, Err(MediaError::TypeNotAllowed(_))));
        assert!(matches!(
            storage.save("x", &png("big.png", &[0u8; 17])).await,
            Err(MediaError::TooLarge(16))
        ));
        assert!(matches!(storage.save("x", &png("e.png", b"")).await, Err(MediaError::Empty)));
    }
}
