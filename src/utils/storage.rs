// src/utils/storage.rs

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::image::Image;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("not an image")]
    NotAnImage,
    #[error("invalid image name: {0}")]
    InvalidName(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage for uploaded post images and avatars.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` under a fresh name and returns its public reference.
    async fn save(&self, bytes: &[u8]) -> Result<Image, ImageStoreError>;
    /// Removes a stored image. Missing files are not an error.
    async fn delete(&self, name: &str) -> Result<(), ImageStoreError>;
}

pub type SharedImageStore = Arc<dyn ImageStore>;

/// Writes images to a local directory that is served under `url_prefix`.
pub struct LocalImageStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ImageStoreError> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !plain {
            return Err(ImageStoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, bytes: &[u8]) -> Result<Image, ImageStoreError> {
        let kind = infer::get(bytes)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .ok_or(ImageStoreError::NotAnImage)?;

        let name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&name)?, bytes).await?;
        tracing::debug!("Stored image {} ({} bytes)", name, bytes.len());

        Ok(Image {
            url: format!("{}/{}", self.url_prefix, name),
            name,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), ImageStoreError> {
        match tokio::fs::remove_file(self.path_for(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Best-effort removal of images that are no longer referenced.
///
/// Runs after the database change has committed; failures are only logged.
pub async fn discard_images(store: &dyn ImageStore, names: &[&str]) {
    for &name in names {
        if let Err(e) = store.delete(name).await {
            tracing::warn!("Failed to remove image '{}': {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[tokio::test]
    async fn saves_and_deletes_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/images/");

        let image = store.save(PNG_MAGIC).await.unwrap();
        assert!(image.name.ends_with(".png"));
        assert_eq!(image.url, format!("/images/{}", image.name));
        assert!(dir.path().join(&image.name).exists());

        store.delete(&image.name).await.unwrap();
        assert!(!dir.path().join(&image.name).exists());

        // already gone
        store.delete(&image.name).await.unwrap();
    }

    #[tokio::test]
    async fn discarding_skips_missing_and_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/images");

        let first = store.save(PNG_MAGIC).await.unwrap();
        let second = store.save(PNG_MAGIC).await.unwrap();

        discard_images(
            &store,
            &[first.name.as_str(), "never-stored.png", "../escape.png", second.name.as_str()],
        )
        .await;

        assert!(!dir.path().join(&first.name).exists());
        assert!(!dir.path().join(&second.name).exists());
    }

    // Handlers hold the cleanup future across their own awaits.
    #[test]
    fn discard_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let store = LocalImageStore::new("unused", "/images");
        let images = vec![Image {
            name: "a.png".to_string(),
            url: "/images/a.png".to_string(),
        }];
        let names: Vec<&str> = images.iter().map(|i| i.name.as_str()).collect();
        let future = discard_images(&store, &names);
        assert_send(&future);
    }

    #[tokio::test]
    async fn rejects_non_images_and_path_tricks() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path(), "/images");

        assert!(matches!(
            store.save(b"just some text").await,
            Err(ImageStoreError::NotAnImage)
        ));
        assert!(matches!(
            store.delete("../Cargo.toml").await,
            Err(ImageStoreError::InvalidName(_))
        ));
    }
}
