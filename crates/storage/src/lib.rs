use async_trait::async_trait;
use thiserror::Error;

use shared::domain::{Catalog, Revision};

pub mod file;
pub mod http;
pub mod memory;

pub use file::JsonFileCatalogStore;
pub use http::HttpCatalogStore;
pub use memory::MemoryCatalogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog document not found")]
    NotFound,
    #[error("catalog revision conflict: document changed since load")]
    Conflict,
    #[error("catalog document is corrupt: {0}")]
    Corrupt(String),
    #[error("catalog store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog store transport: {0}")]
    Transport(String),
}

/// The shared catalog document behind a revision-guarded write. Every
/// mutation anywhere in the system is a `load`, an in-memory edit, and a
/// `save` against the revision the edit was based on; there is no partial
/// or field-level update path.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Current document together with its revision marker.
    async fn load(&self) -> Result<(Catalog, Revision), StoreError>;

    /// Persists `catalog` only if the stored revision still equals
    /// `expected`; returns the revision of the written document. A
    /// `Conflict` means some other writer won the race and the caller must
    /// reload before trying again.
    async fn save(&self, catalog: &Catalog, expected: &Revision)
        -> Result<Revision, StoreError>;

    /// Unconditional overwrite. This is the daily builder's export path;
    /// workers and clients never call it.
    async fn replace(&self, catalog: &Catalog) -> Result<Revision, StoreError>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
