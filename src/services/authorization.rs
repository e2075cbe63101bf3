use crate::errors::OpsError;
use crate::services::logger::Logger;
use crate::services::permissions::{Permission, PermissionSet};
use crate::stores::{PermissionStore, PrincipalId};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const NOT_AUTHORIZED_MESSAGE: &str = "You are not authorized. Contact an administrator.";
pub const NO_PERMISSION_MESSAGE: &str = "You do not have permission to run this command.";

#[derive(Clone)]
pub struct AuthorizationService {
    logger: Logger,
    store: Arc<dyn PermissionStore>,
    bootstrap_secret: Option<String>,
}

impl AuthorizationService {
    pub fn new(
        logger: Logger,
        store: Arc<dyn PermissionStore>,
        bootstrap_secret: Option<String>,
    ) -> Self {
        Self {
            logger: logger.child("auth"),
            store,
            bootstrap_secret,
        }
    }

    pub fn is_authorized(&self, id: PrincipalId) -> Result<bool, OpsError> {
        Ok(self.store.exists(id)?)
    }

    pub fn has_capability(&self, id: PrincipalId, permission: Permission) -> Result<bool, OpsError> {
        Ok(self.store.get(id)?.allows(permission))
    }

    pub fn permissions_of(&self, id: PrincipalId) -> Result<PermissionSet, OpsError> {
        Ok(self.store.get(id)?)
    }

    pub fn require_known(&self, id: PrincipalId) -> Result<(), OpsError> {
        if self.is_authorized(id)? {
            Ok(())
        } else {
            Err(OpsError::unauthorized(NOT_AUTHORIZED_MESSAGE))
        }
    }

    pub fn require(&self, id: PrincipalId, permission: Permission) -> Result<(), OpsError> {
        self.require_known(id)?;
        if self.has_capability(id, permission)? {
            return Ok(());
        }
        self.logger.info(
            "capability check failed",
            Some(&serde_json::json!({"chat_id": id, "permission": permission.as_str()})),
        );
        Err(OpsError::denied(NO_PERMISSION_MESSAGE))
    }

    /// One-time creation of the first admin. Allowed only while the store is
    /// empty and only with the configured secret.
    pub fn bootstrap(&self, id: PrincipalId, secret: Option<&str>) -> Result<(), OpsError> {
        if !self.store.list()?.is_empty() {
            return Err(OpsError::conflict("Initialization has already been completed."));
        }
        let matches = match (self.bootstrap_secret.as_deref(), secret) {
            (Some(expected), Some(given)) => secrets_match(expected, given),
            _ => false,
        };
        if !matches {
            self.logger
                .warn("bootstrap refused", Some(&serde_json::json!({"chat_id": id})));
            return Err(OpsError::denied("Invalid initialization password."));
        }
        if !self.store.put_if_empty(id, &PermissionSet::admin())? {
            return Err(OpsError::conflict("Initialization has already been completed."));
        }
        self.logger
            .info("bootstrap admin created", Some(&serde_json::json!({"chat_id": id})));
        Ok(())
    }

    /// Create-or-replace: an existing principal is reset to the empty set.
    pub fn add_principal(&self, actor: PrincipalId, target: PrincipalId) -> Result<(), OpsError> {
        self.require(actor, Permission::Admin)?;
        let replaced = self.store.exists(target)?;
        self.store.put(target, &PermissionSet::empty())?;
        self.logger.info(
            "principal added",
            Some(&serde_json::json!({"by": actor, "chat_id": target, "replaced": replaced})),
        );
        Ok(())
    }

    pub fn remove_principal(&self, actor: PrincipalId, target: PrincipalId) -> Result<(), OpsError> {
        self.require(actor, Permission::Admin)?;
        if !self.store.exists(target)? {
            return Err(OpsError::not_found("User not found."));
        }
        self.store.delete(target)?;
        self.logger.info(
            "principal removed",
            Some(&serde_json::json!({"by": actor, "chat_id": target})),
        );
        Ok(())
    }

    /// Full replace of a principal's permissions. Any token outside the
    /// vocabulary rejects the whole update.
    pub fn update_permissions(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        tokens: &[&str],
    ) -> Result<PermissionSet, OpsError> {
        self.require(actor, Permission::Admin)?;
        let permissions = PermissionSet::parse_tokens(tokens.iter().copied()).map_err(|invalid| {
            OpsError::invalid_params(format!("Invalid permissions: {}.", invalid.join(", ")))
                .with_hint(format!("Available: {}", Permission::vocabulary()))
        })?;
        if !self.store.exists(target)? {
            return Err(OpsError::not_found("User not found."));
        }
        self.store.set(target, &permissions)?;
        self.logger.info(
            "permissions updated",
            Some(&serde_json::json!({
                "by": actor,
                "chat_id": target,
                "permissions": permissions.to_storage(),
            })),
        );
        Ok(permissions)
    }

    pub fn list_principals(
        &self,
        actor: PrincipalId,
    ) -> Result<Vec<(PrincipalId, PermissionSet)>, OpsError> {
        self.require(actor, Permission::Admin)?;
        Ok(self.store.list()?)
    }
}

fn secrets_match(expected: &str, given: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(given.as_bytes())
}
