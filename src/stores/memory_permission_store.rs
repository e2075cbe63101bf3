use super::{PermissionStore, PrincipalId, StoreError};
use crate::services::permissions::PermissionSet;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct MemoryPermissionStore {
    principals: Arc<RwLock<BTreeMap<PrincipalId, PermissionSet>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn exists(&self, id: PrincipalId) -> Result<bool, StoreError> {
        let guard = self.principals.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.contains_key(&id))
    }

    fn get(&self, id: PrincipalId) -> Result<PermissionSet, StoreError> {
        let guard = self.principals.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(&id).cloned().unwrap_or_default())
    }

    fn put(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError> {
        let mut guard = self.principals.write().map_err(|_| StoreError::Poisoned)?;
        guard.insert(id, permissions.clone());
        Ok(())
    }

    fn set(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError> {
        let mut guard = self.principals.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(entry) = guard.get_mut(&id) {
            *entry = permissions.clone();
        }
        Ok(())
    }

    fn delete(&self, id: PrincipalId) -> Result<(), StoreError> {
        let mut guard = self.principals.write().map_err(|_| StoreError::Poisoned)?;
        guard.remove(&id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<(PrincipalId, PermissionSet)>, StoreError> {
        let guard = self.principals.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.iter().map(|(id, set)| (*id, set.clone())).collect())
    }

    fn put_if_empty(
        &self,
        id: PrincipalId,
        permissions: &PermissionSet,
    ) -> Result<bool, StoreError> {
        let mut guard = self.principals.write().map_err(|_| StoreError::Poisoned)?;
        if !guard.is_empty() {
            return Ok(false);
        }
        guard.insert(id, permissions.clone());
        Ok(true)
    }
}
