use async_trait::async_trait;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Returns the file bytes and a sniffed content type.
    async fn load(&self, filename: &str) -> Result<(Vec<u8>, String), StoreError>;
    async fn delete(&self, filename: &str) -> Result<(), StoreError>;
}

/// Local-disk store backing the public /uploads prefix.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("upload store rooted at '{}'", root.display());
        Ok(Self { root })
    }

    // Filenames are server-generated, but reject anything path-like anyway.
    fn path_for(&self, filename: &str) -> Result<PathBuf, StoreError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(StoreError::NotFound);
        }
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(filename)?;
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("failed to write upload '{}': {e}", path.display());
            StoreError::Other(e.to_string())
        })
    }

    async fn load(&self, filename: &str) -> Result<(Vec<u8>, String), StoreError> {
        let path = self.path_for(filename)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| StoreError::NotFound)?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, filename: &str) -> Result<(), StoreError> {
        let path = self.path_for(filename)?;
        // Best-effort delete: a missing file is not an error.
        let _ = tokio::fs::remove_file(&path).await;
        Ok(())
    }
}

/// Server-side name for an uploaded file: random stem plus the original
/// extension (lowercased), so client-supplied names never reach the disk.
pub fn unique_filename(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    format!("{}{}", uuid::Uuid::new_v4(), ext)
}

/// Factory used by main; panics early when the upload directory is unusable.
pub fn build_image_store(root: &Path) -> Arc<dyn ImageStore> {
    match FsImageStore::new(root) {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize upload store: {e}"),
    }
}
