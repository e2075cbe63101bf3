pub mod memory_permission_store;
pub mod sqlite_permission_store;

use crate::errors::OpsError;
use crate::services::permissions::PermissionSet;

pub use memory_permission_store::MemoryPermissionStore;
pub use sqlite_permission_store::SqlitePermissionStore;

pub type PrincipalId = i64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("permission store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("permission store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for OpsError {
    fn from(err: StoreError) -> Self {
        OpsError::internal(err.to_string())
    }
}

/// Durable principal -> permission-set table. Every operation is atomic for a
/// single principal; there are no cross-principal transactions.
pub trait PermissionStore: Send + Sync {
    fn exists(&self, id: PrincipalId) -> Result<bool, StoreError>;

    /// Empty set when the principal is absent or holds nothing.
    fn get(&self, id: PrincipalId) -> Result<PermissionSet, StoreError>;

    /// Create or replace.
    fn put(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError>;

    /// Update an existing principal; silently does nothing when absent.
    fn set(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError>;

    fn delete(&self, id: PrincipalId) -> Result<(), StoreError>;

    /// All principals in primary-key order.
    fn list(&self) -> Result<Vec<(PrincipalId, PermissionSet)>, StoreError>;

    /// Inserts only while the table is completely empty. Returns whether the
    /// row was written.
    fn put_if_empty(&self, id: PrincipalId, permissions: &PermissionSet)
        -> Result<bool, StoreError>;
}
