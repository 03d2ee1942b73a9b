//! Image uploads for products and sliders.
//!
//! Uploads go to Cloudinary when it is configured, otherwise to the local
//! upload directory which the server exposes under `/uploads`. The file type
//! is taken from the leading bytes, not from what the client claims.

use std::path::PathBuf;

use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::CloudinaryConfig;

/// Largest accepted upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Errors that can occur when storing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is empty")]
    Empty,

    #[error("image is {size} bytes, the limit is {MAX_IMAGE_BYTES}")]
    TooLarge { size: usize },

    #[error("unsupported image type {0}, use JPEG, PNG or WebP")]
    UnsupportedType(String),

    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudinary upload failed: {0}")]
    Upload(String),
}

impl ImageError {
    /// Whether the client sent something we refuse, as opposed to a storage failure.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::TooLarge { .. } | Self::UnsupportedType(_)
        )
    }
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    /// Sniff the format from magic bytes.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
            Some(Self::Webp)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Check size and format, returning the detected kind.
///
/// # Errors
///
/// Returns `ImageError::Empty`, `TooLarge` or `UnsupportedType`.
pub fn validate(bytes: &[u8], content_type: Option<&str>) -> Result<ImageKind, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge { size: bytes.len() });
    }
    if let Some(declared) = content_type
        && !matches!(declared, "image/jpeg" | "image/jpg" | "image/png" | "image/webp")
    {
        return Err(ImageError::UnsupportedType(declared.to_owned()));
    }
    ImageKind::detect(bytes).ok_or_else(|| {
        ImageError::UnsupportedType(content_type.unwrap_or("unknown").to_owned())
    })
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryErrorBody>,
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

/// Where uploaded images end up.
#[derive(Clone)]
pub enum ImageStore {
    Cloudinary {
        client: reqwest::Client,
        config: CloudinaryConfig,
    },
    Local {
        dir: PathBuf,
        base_url: String,
    },
}

impl ImageStore {
    /// Cloudinary when configured, otherwise the local directory.
    #[must_use]
    pub fn new(cloudinary: Option<CloudinaryConfig>, upload_dir: PathBuf, base_url: &str) -> Self {
        match cloudinary {
            Some(config) => Self::Cloudinary {
                client: reqwest::Client::new(),
                config,
            },
            None => Self::Local {
                dir: upload_dir,
                base_url: base_url.to_owned(),
            },
        }
    }

    /// Validate and store an image under `folder`, returning its public URL.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageError`] for rejected files or storage failures.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        folder: &'static str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, ImageError> {
        let kind = validate(&bytes, content_type)?;
        let name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());

        let url = match self {
            Self::Cloudinary { client, config } => {
                upload_cloudinary(client, config, folder, &name, kind, bytes).await?
            }
            Self::Local { dir, base_url } => {
                let folder_dir = dir.join(folder);
                tokio::fs::create_dir_all(&folder_dir).await?;
                tokio::fs::write(folder_dir.join(&name), &bytes).await?;
                format!("{base_url}/uploads/{folder}/{name}")
            }
        };

        tracing::info!(url = %url, "Image stored");
        Ok(url)
    }
}

async fn upload_cloudinary(
    client: &reqwest::Client,
    config: &CloudinaryConfig,
    folder: &str,
    name: &str,
    kind: ImageKind,
    bytes: Vec<u8>,
) -> Result<String, ImageError> {
    let folder = format!("aurum/{folder}");
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = cloudinary_signature(
        &[("folder", &folder), ("timestamp", &timestamp)],
        config.api_secret.expose_secret(),
    );

    let file = Part::bytes(bytes)
        .file_name(name.to_owned())
        .mime_str(kind.mime())?;
    let form = Form::new()
        .part("file", file)
        .text("api_key", config.api_key.clone())
        .text("timestamp", timestamp)
        .text("folder", folder)
        .text("signature", signature)
        .text("signature_algorithm", "sha256");

    let response = client
        .post(format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            config.cloud_name
        ))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    let body: CloudinaryResponse = response.json().await?;
    match (body.secure_url, body.error) {
        (Some(url), _) if status.is_success() => Ok(url),
        (_, Some(err)) => Err(ImageError::Upload(err.message)),
        _ => Err(ImageError::Upload(format!("HTTP {status}"))),
    }
}

/// SHA-256 over the alphabetically sorted `key=value` pairs joined with
/// `&`, followed by the API secret.
fn cloudinary_signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{to_sign}{api_secret}").as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const WEBP: &[u8] = b"RIFF\x24\0\0\0WEBPVP8 ";

    #[test]
    fn test_detect_formats() {
        assert_eq!(ImageKind::detect(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::detect(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::detect(WEBP), Some(ImageKind::Webp));
        assert_eq!(ImageKind::detect(b"GIF89a"), None);
        assert_eq!(ImageKind::detect(b"RIFF"), None);
    }

    #[test]
    fn test_validate_rejections() {
        assert!(matches!(validate(&[], None), Err(ImageError::Empty)));
        assert!(matches!(
            validate(&vec![0xFF; MAX_IMAGE_BYTES + 1], None),
            Err(ImageError::TooLarge { .. })
        ));
        assert!(matches!(
            validate(PNG, Some("image/gif")),
            Err(ImageError::UnsupportedType(_))
        ));
        // A renamed text file is refused whatever it claims to be.
        assert!(matches!(
            validate(b"hello world", Some("image/png")),
            Err(ImageError::UnsupportedType(_))
        ));
        assert_eq!(validate(JPEG, Some("image/jpeg")).unwrap(), ImageKind::Jpeg);
    }

    #[test]
    fn test_cloudinary_signature_sorts_params() {
        let a = cloudinary_signature(&[("timestamp", "1315060510"), ("folder", "aurum/products")], "abcd");
        let b = cloudinary_signature(&[("folder", "aurum/products"), ("timestamp", "1315060510")], "abcd");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let expected = hex::encode(Sha256::digest(b"folder=aurum/products&timestamp=1315060510abcd"));
        assert_eq!(a, expected);
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let dir = std::env::temp_dir().join(format!("aurum-images-{}", uuid::Uuid::new_v4()));
        let store = ImageStore::new(None, dir.clone(), "http://localhost:3000");
        let url = store.upload("products", PNG.to_vec(), Some("image/png")).await.unwrap();

        assert!(url.starts_with("http://localhost:3000/uploads/products/"));
        assert!(url.ends_with(".png"));
        let name = url.rsplit('/').next().unwrap();
        assert_eq!(std::fs::read(dir.join("products").join(name)).unwrap(), PNG);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
