//! Screenshot blob access
//!
//! Storage keys look like `screenshots/{ExchangeFolder}/{SubFolder...}/{file}`.
//! The filesystem store resolves them under `<root>/screenshots`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

const KEY_PREFIX: &str = "screenshots/";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Screenshot not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob store collaborator
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Screenshots stored as plain files
pub struct FsScreenshotStore {
    root: PathBuf,
}

impl FsScreenshotStore {
    /// `root` is the screenshots directory itself
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, storage_key: &str) -> Result<PathBuf, StoreError> {
        let relative = storage_key.strip_prefix(KEY_PREFIX).unwrap_or(storage_key);
        let path = Path::new(relative);

        let only_normal = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if relative.is_empty() || !only_normal {
            return Err(StoreError::InvalidKey(storage_key.to_string()));
        }

        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ScreenshotStore for FsScreenshotStore {
    async fn fetch(&self, storage_key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(storage_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(storage_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Encode image bytes as a `data:` URL (JPEG by magic bytes, PNG otherwise)
pub fn image_data_url(bytes: &[u8]) -> String {
    let media_type = if bytes.starts_with(JPEG_MAGIC) {
        "image/jpeg"
    } else {
        "image/png"
    };
    format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}

/// Exchange folder of a storage key (`screenshots/{ExchangeFolder}/...`)
pub fn exchange_folder(storage_key: &str) -> Option<&str> {
    let mut parts = storage_key.split('/');
    let prefix = parts.next()?;
    let folder = parts.next()?;
    // A folder must be followed by at least a file name
    parts.next()?;

    (prefix == KEY_PREFIX.trim_end_matches('/') && !folder.trim().is_empty()).then_some(folder)
}

/// Sub-folder path between the exchange folder and the file name
///
/// Present only for keys with more than three parts, e.g.
/// `screenshots/Binance/KYC/Step 1/a.png` gives `KYC/Step 1`.
pub fn folder_hint(storage_key: &str) -> Option<String> {
    let parts: Vec<&str> = storage_key.split('/').collect();
    if parts.len() > 3 {
        Some(parts[2..parts.len() - 1].join("/"))
    } else {
        None
    }
}
