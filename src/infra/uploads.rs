//! Filesystem storage for post images.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use imagesize::ImageType;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Directory, relative to the storage root, that post images are written to.
pub const POST_IMAGE_DIR: &str = "posts";

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file is not a supported image format")]
    UnsupportedImage,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Path relative to the storage root, always using `/` separators.
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a post image under [`POST_IMAGE_DIR`] with a collision-free name.
    pub async fn store_post_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredUpload, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }
        let extension = image_extension(&data).ok_or(UploadStorageError::UnsupportedImage)?;

        let stored_path = format!(
            "{POST_IMAGE_DIR}/{}-{}.{extension}",
            Uuid::new_v4().simple(),
            sanitize_stem(original_name)
        );
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        let digest = Sha256::digest(&data);
        let checksum = hex::encode(&digest[..]);
        Ok(StoredUpload {
            stored_path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

/// File extension for the image formats browsers render inline, detected
/// from the payload. Anything else is refused.
pub fn image_extension(data: &[u8]) -> Option<&'static str> {
    match imagesize::image_type(data).ok()? {
        ImageType::Gif => Some("gif"),
        ImageType::Png => Some("png"),
        ImageType::Jpeg => Some("jpg"),
        ImageType::Webp => Some("webp"),
        ImageType::Bmp => Some("bmp"),
        _ => None,
    }
}

/// Slugified file stem of the client-supplied name. The client's extension
/// is never kept.
fn sanitize_stem(original: &str) -> String {
    let base = Path::new(original)
        .file_stem()
        .and_then(|value| value.to_str())
        .map(slugify)
        .unwrap_or_default();
    if base.is_empty() {
        "image".to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];

    #[test]
    fn sanitize_stem_slugifies_and_drops_directories() {
        assert_eq!(sanitize_stem("My Photo.PNG"), "my-photo");
        assert_eq!(sanitize_stem("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_stem(""), "image");
    }

    #[test]
    fn image_extension_follows_payload_format() {
        assert_eq!(image_extension(TINY_GIF), Some("gif"));
        assert_eq!(image_extension(b"<html><script>alert(1)</script>"), None);
    }

    #[tokio::test]
    async fn stored_images_round_trip_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let stored = storage
            .store_post_image("cat.gif", Bytes::from_static(TINY_GIF))
            .await
            .expect("store");
        assert!(stored.stored_path.starts_with("posts/"));
        assert!(stored.stored_path.ends_with("-cat.gif"));
        assert_eq!(stored.size_bytes, TINY_GIF.len() as u64);

        let bytes = storage.read(&stored.stored_path).await.expect("read");
        assert_eq!(&bytes[..], TINY_GIF);

        storage.delete(&stored.stored_path).await.expect("delete");
        storage
            .delete(&stored.stored_path)
            .await
            .expect("second delete is a no-op");
    }

    #[tokio::test]
    async fn client_extension_is_replaced_by_detected_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let mut payload = TINY_GIF.to_vec();
        payload.extend_from_slice(b"<script>alert(document.cookie)</script>");
        let stored = storage
            .store_post_image("x.html", Bytes::from(payload))
            .await
            .expect("store");
        assert!(stored.stored_path.ends_with("-x.gif"), "{}", stored.stored_path);

        let err = storage
            .store_post_image("page.png", Bytes::from_static(b"<html></html>"))
            .await
            .expect_err("non-image payload");
        assert!(matches!(err, UploadStorageError::UnsupportedImage));
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");
        assert!(matches!(
            storage.read("../secret").await,
            Err(UploadStorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.read("/etc/passwd").await,
            Err(UploadStorageError::InvalidPath)
        ));
    }
}
