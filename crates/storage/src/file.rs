use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use shared::domain::{Catalog, Revision};

use crate::{CatalogStore, StoreError};

const LOCK_RETRY_ATTEMPTS: usize = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Single JSON document on disk. The revision marker is the SHA-256 of the
/// bytes currently in the file, so an out-of-band edit conflicts the same
/// way a concurrent writer does. Writes land in a `.tmp` sibling and rename
/// into place while an exclusive `.lock` sidecar is held.
pub struct JsonFileCatalogStore {
    path: PathBuf,
}

impl JsonFileCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(extension);
        PathBuf::from(name)
    }

    async fn read_current(&self) -> Result<(Vec<u8>, Revision), StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound)
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        let revision = Revision::new(content_hash(&bytes));
        Ok((bytes, revision))
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.sibling(".tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonFileCatalogStore {
    async fn load(&self) -> Result<(Catalog, Revision), StoreError> {
        let (bytes, revision) = self.read_current().await?;
        let catalog = serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok((catalog, revision))
    }

    async fn save(
        &self,
        catalog: &Catalog,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let lock = LockFile::acquire(self.sibling(".lock")).await?;
        let (_, current) = self.read_current().await?;
        if current != *expected {
            return Err(StoreError::Conflict);
        }
        let bytes = encode(catalog)?;
        self.write_atomic(&bytes).await?;
        lock.release().await?;
        Ok(Revision::new(content_hash(&bytes)))
    }

    async fn replace(&self, catalog: &Catalog) -> Result<Revision, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let lock = LockFile::acquire(self.sibling(".lock")).await?;
        let bytes = encode(catalog)?;
        self.write_atomic(&bytes).await?;
        lock.release().await?;
        Ok(Revision::new(content_hash(&bytes)))
    }
}

/// Exclusive sidecar created with `create_new`; whoever wins the create owns
/// the write. Dropped without `release` (early error paths) it removes
/// itself best-effort.
struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    async fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        for attempt in 1..=LOCK_RETRY_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    return Ok(Self {
                        path,
                        released: false,
                    })
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        max_attempts = LOCK_RETRY_ATTEMPTS,
                        "catalog file is locked by another writer"
                    );
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
        Err(StoreError::Io(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("lock file {} held by another writer", path.display()),
        )))
    }

    async fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        fs::remove_file(&self.path).await?;
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn encode(catalog: &Catalog) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(catalog)
        .map_err(|err| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "tests/file_tests.rs"]
mod tests;
