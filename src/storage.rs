use std::path::PathBuf;

use async_trait::async_trait;
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed media storage. `name` is the stored filename
/// (hash + extension), already validated by the caller.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), ImageStoreError>;
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
    async fn delete(&self, name: &str) -> Result<(), ImageStoreError>;
}

/// Filesystem store rooted at `MEDIA_ROOT`, sharded by the first two hash
/// characters to keep directories small.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root taken from `MEDIA_ROOT` (default `media/`), created if missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".into());
        std::fs::create_dir_all(&root)?;
        Ok(Self::new(root))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let shard = name.get(0..2).unwrap_or("00");
        self.root.join(shard).join(name)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        let path = self.path_for(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ImageStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("failed to write media file '{}': {e}", path.display());
            ImageStoreError::Other(e.to_string())
        })
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let path = self.path_for(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| ImageStoreError::NotFound)?;
        // Sniff rather than trust the extension.
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, name: &str) -> Result<(), ImageStoreError> {
        // Best-effort: a missing file is treated as deleted.
        let _ = tokio::fs::remove_file(self.path_for(name)).await;
        Ok(())
    }
}
