//! Ciphertext storage contract.

use std::collections::HashMap;

use async_trait::async_trait;
use deadhand_crypto::aead::EncryptedBlob;
use tokio::sync::RwLock;

/// Storage could not be asked.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("blob storage unavailable: {0}")]
pub struct LocatorUnavailable(pub String);

/// Confirms that an encrypted blob is still where the switch says it is.
#[async_trait]
pub trait BlobLocator: Send + Sync {
    async fn blob_exists(&self, location: &str) -> Result<bool, LocatorUnavailable>;
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, EncryptedBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, location: impl Into<String>, blob: EncryptedBlob) {
        self.blobs.write().await.insert(location.into(), blob);
    }

    pub async fn get(&self, location: &str) -> Option<EncryptedBlob> {
        self.blobs.read().await.get(location).cloned()
    }

    pub async fn remove(&self, location: &str) -> Option<EncryptedBlob> {
        self.blobs.write().await.remove(location)
    }
}

#[async_trait]
impl BlobLocator for MemoryBlobStore {
    async fn blob_exists(&self, location: &str) -> Result<bool, LocatorUnavailable> {
        Ok(self.blobs.read().await.contains_key(location))
    }
}
