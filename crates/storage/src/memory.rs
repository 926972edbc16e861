use async_trait::async_trait;
use tokio::sync::Mutex;

use shared::domain::{Catalog, Revision};

use crate::{CatalogStore, StoreError};

/// In-process store for tests and local development. Revisions are a
/// plain write counter rendered as a string.
pub struct MemoryCatalogStore {
    inner: Mutex<Option<Versioned>>,
}

struct Versioned {
    catalog: Catalog,
    version: u64,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            inner: Mutex::new(Some(Versioned {
                catalog,
                version: 1,
            })),
        }
    }
}

impl Default for MemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn load(&self) -> Result<(Catalog, Revision), StoreError> {
        let inner = self.inner.lock().await;
        match inner.as_ref() {
            Some(versioned) => Ok((
                versioned.catalog.clone(),
                Revision::new(versioned.version.to_string()),
            )),
            None => Err(StoreError::NotFound),
        }
    }

    async fn save(
        &self,
        catalog: &Catalog,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let mut inner = self.inner.lock().await;
        let versioned = inner.as_mut().ok_or(StoreError::NotFound)?;
        if versioned.version.to_string() != expected.as_str() {
            return Err(StoreError::Conflict);
        }
        versioned.catalog = catalog.clone();
        versioned.version += 1;
        Ok(Revision::new(versioned.version.to_string()))
    }

    async fn replace(&self, catalog: &Catalog) -> Result<Revision, StoreError> {
        let mut inner = self.inner.lock().await;
        let version = match inner.as_ref() {
            Some(versioned) => versioned.version + 1,
            None => 1,
        };
        *inner = Some(Versioned {
            catalog: catalog.clone(),
            version,
        });
        Ok(Revision::new(version.to_string()))
    }
}
