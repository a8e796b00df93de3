use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    constants::{IMAGE_EXTENSIONS, RECIPE_IMAGE_DIR},
    error::{Error, ErrorKind},
};

/// Decoded `data:image/<ext>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn parse(data: &str) -> Result<Self, Error> {
        let invalid = || Error::field("image", "Upload a valid image.");

        let (header, payload) = data
            .trim()
            .strip_prefix("data:image/")
            .and_then(|rest| rest.split_once(";base64,"))
            .ok_or_else(invalid)?;

        let extension = header.to_ascii_lowercase();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(invalid());
        }

        let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
        if bytes.is_empty() {
            return Err(invalid());
        }

        Ok(Self { extension, bytes })
    }

    /// Writes the image under `media_root` and returns its media-relative path.
    pub async fn store(&self, media_root: &Path) -> Result<String, Error> {
        let directory = media_root.join(RECIPE_IMAGE_DIR);
        let name = format!("{}.{}", uuid::Uuid::new_v4(), self.extension);

        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| storage_error(&directory, e))?;
        tokio::fs::write(directory.join(&name), &self.bytes)
            .await
            .map_err(|e| storage_error(&directory, e))?;

        Ok(format!("{RECIPE_IMAGE_DIR}/{name}"))
    }
}

/// Removes a previously stored image; a missing file is not an error.
pub async fn remove_image(media_root: &Path, path: &str) {
    if path.is_empty() || path.contains("..") {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(media_root.join(path)).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("> Failed to remove {path}: {e}");
        }
    }
}

fn storage_error(directory: &Path, e: std::io::Error) -> Error {
    log::error!("> Failed to store image in {}: {e}", directory.display());
    ErrorKind::Internal.default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn parses_data_uris() {
        let image = InlineImage::parse(PIXEL).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_other_payloads() {
        for data in [
            "https://example.com/a.png",
            "data:image/png;base64,@@@",
            "data:image/svg+xml;base64,PHN2Zz4=",
            "data:text/plain;base64,aGk=",
        ] {
            let error = InlineImage::parse(data).unwrap_err();
            assert!(error.fields.contains_key("image"), "{data}");
        }
    }

    #[tokio::test]
    async fn stores_and_removes_images() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", uuid::Uuid::new_v4()));
        let image = InlineImage::parse(PIXEL).unwrap();

        let path = image.store(&root).await.unwrap();
        assert!(path.starts_with("recipes/images/"));
        assert!(path.ends_with(".png"));
        assert_eq!(tokio::fs::read(root.join(&path)).await.unwrap(), image.bytes);

        remove_image(&root, &path).await;
        assert!(!root.join(&path).exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
