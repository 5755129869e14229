/// Storage for images attached to posts
///
/// Files are validated by sniffing their content and written as-is under
/// `<media_root>/posts/`. The stored path (relative to the media root) is what
/// a post records.
use crate::error::{AppError, FieldErrors, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPLOAD_DIR: &str = "posts";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

fn invalid(message: &str) -> AppError {
    AppError::Validation(FieldErrors::single("image", message))
}

/// Keep the final path component and drop anything outside `[A-Za-z0-9._-]`
fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, suffix, ext),
        _ => format!("{}_{}", name, suffix),
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored relative path
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Check that the bytes look like a supported image format
    pub fn validate_image(bytes: &[u8]) -> Result<image::ImageFormat> {
        if bytes.is_empty() {
            return Err(invalid("The submitted file is empty."));
        }
        image::guess_format(bytes).map_err(|_| invalid(INVALID_IMAGE))
    }

    /// Validate and store an uploaded image, returning its relative path
    pub async fn save_image(&self, filename: Option<&str>, bytes: &[u8]) -> Result<String> {
        let format = Self::validate_image(bytes)?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let name = filename
            .and_then(sanitize_filename)
            .unwrap_or_else(|| format!("upload.{}", extension));

        let dir = self.root.join(UPLOAD_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let mut candidate = name.clone();
        let mut file = loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await
            {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let suffix = Uuid::new_v4().simple().to_string();
                    candidate = with_suffix(&name, &suffix[..7]);
                    debug!(file = %candidate, "upload name taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        };

        let relative = format!("{}/{}", UPLOAD_DIR, candidate);
        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            self.remove(&relative).await;
            return Err(e.into());
        }

        info!(path = %relative, size = bytes.len(), "image stored");
        Ok(relative)
    }

    /// Delete a stored image. Paths outside the upload directory are ignored
    /// and failures are only logged.
    pub async fn remove(&self, relative: &str) {
        let inside_uploads = relative
            .strip_prefix(UPLOAD_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| {
                !name.is_empty() && name != ".." && !name.contains(['/', '\\'])
            });
        if !inside_uploads {
            warn!(path = %relative, "refusing to remove file outside the upload directory");
            return;
        }

        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => info!(path = %relative, "image removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %relative, error = %e, "failed to remove image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];

    #[tokio::test]
    async fn test_saves_under_posts_with_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());

        let path = media.save_image(Some("small.gif"), SMALL_GIF).await.unwrap();
        assert_eq!(path, "posts/small.gif");
        assert_eq!(std::fs::read(media.path(&path)).unwrap(), SMALL_GIF);
    }

    #[tokio::test]
    async fn test_remove_deletes_only_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let path = media.save_image(Some("small.gif"), SMALL_GIF).await.unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"keep").unwrap();

        media.remove(&path).await;
        assert!(!media.path(&path).exists());

        media.remove("keep.txt").await;
        media.remove("posts/../keep.txt").await;
        assert!(dir.path().join("keep.txt").exists());

        media.remove(&path).await;
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());

        let first = media.save_image(Some("small.gif"), SMALL_GIF).await.unwrap();
        let second = media.save_image(Some("small.gif"), SMALL_GIF).await.unwrap();
        assert_ne!(first, second);
        assert!(second.starts_with("posts/small_"));
        assert!(second.ends_with(".gif"));
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());

        let err = media
            .save_image(Some("notes.txt"), b"just some text")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(media.save_image(Some("empty.gif"), b"").await.is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\pics\\my cat.png").as_deref(), Some("my_cat.png"));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(with_suffix("cat.png", "abc"), "cat_abc.png");
        assert_eq!(with_suffix("cat", "abc"), "cat_abc");
    }
}
