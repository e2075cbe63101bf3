use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Deploy,
    ContainersList,
    ContainersStart,
    ContainersStop,
    ContainersRemove,
    LogsView,
    LogsMonitor,
    BackupsCreate,
    BackupsDownload,
    BackupsRestore,
    FilesUpload,
    FilesDownload,
    Admin,
}

impl Permission {
    pub const ALL: [Permission; 13] = [
        Permission::Deploy,
        Permission::ContainersList,
        Permission::ContainersStart,
        Permission::ContainersStop,
        Permission::ContainersRemove,
        Permission::LogsView,
        Permission::LogsMonitor,
        Permission::BackupsCreate,
        Permission::BackupsDownload,
        Permission::BackupsRestore,
        Permission::FilesUpload,
        Permission::FilesDownload,
        Permission::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Deploy => "deploy",
            Permission::ContainersList => "containers_list",
            Permission::ContainersStart => "containers_start",
            Permission::ContainersStop => "containers_stop",
            Permission::ContainersRemove => "containers_remove",
            Permission::LogsView => "logs_view",
            Permission::LogsMonitor => "logs_monitor",
            Permission::BackupsCreate => "backups_create",
            Permission::BackupsDownload => "backups_download",
            Permission::BackupsRestore => "backups_restore",
            Permission::FilesUpload => "files_upload",
            Permission::FilesDownload => "files_download",
            Permission::Admin => "admin",
        }
    }

    pub fn vocabulary() -> String {
        Permission::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPermission(pub String);

impl fmt::Display for UnknownPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown permission token: {}", self.0)
    }
}

impl std::error::Error for UnknownPermission {}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == raw)
            .ok_or_else(|| UnknownPermission(raw.to_string()))
    }
}

/// Capability set of a principal. The comma-joined string form exists only at
/// the storage boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn admin() -> Self {
        Self::from_iter([Permission::Admin])
    }

    /// Strict parse: every non-empty token must belong to the vocabulary.
    /// Returns all offending tokens on failure.
    pub fn parse_tokens<'a, I>(tokens: I) -> Result<Self, Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = BTreeSet::new();
        let mut invalid = Vec::new();
        for token in tokens.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<Permission>() {
                Ok(permission) => {
                    set.insert(permission);
                }
                Err(_) => invalid.push(token.to_string()),
            }
        }
        if invalid.is_empty() {
            Ok(Self(set))
        } else {
            Err(invalid)
        }
    }

    /// Lenient parse of a stored string; unknown tokens are returned separately
    /// so the caller can log them.
    pub fn from_storage(raw: &str) -> (Self, Vec<String>) {
        let mut set = BTreeSet::new();
        let mut unknown = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<Permission>() {
                Ok(permission) => {
                    set.insert(permission);
                }
                Err(_) => unknown.push(token.to_string()),
            }
        }
        (Self(set), unknown)
    }

    pub fn to_storage(&self) -> String {
        self.0
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Admin satisfies every capability.
    pub fn allows(&self, permission: Permission) -> bool {
        self.contains(permission) || self.contains(Permission::Admin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.to_storage())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_token_roundtrips_through_its_string() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>(), Ok(permission));
        }
    }

    #[test]
    fn admin_allows_tokens_never_granted() {
        let set = PermissionSet::admin();
        for permission in Permission::ALL {
            assert!(set.allows(permission), "admin must allow {}", permission);
        }
    }

    #[test]
    fn storage_form_is_order_independent() {
        let (a, _) = PermissionSet::from_storage("logs_view,logs_monitor");
        let (b, _) = PermissionSet::from_storage("logs_monitor, logs_view");
        assert_eq!(a, b);
        assert_eq!(a.to_storage(), "logs_view,logs_monitor");
    }

    #[test]
    fn empty_string_is_the_empty_set() {
        let (set, unknown) = PermissionSet::from_storage("");
        assert!(set.is_empty());
        assert!(unknown.is_empty());
        assert_eq!(set.to_string(), "none");
    }

    #[test]
    fn strict_parse_reports_every_invalid_token() {
        let err = PermissionSet::parse_tokens(["deploy", "root", "logs_view", "sudo"])
            .expect_err("must reject");
        assert_eq!(err, vec!["root".to_string(), "sudo".to_string()]);
    }

    #[test]
    fn lenient_parse_drops_unknown_tokens() {
        let (set, unknown) = PermissionSet::from_storage("deploy,legacy_token");
        assert!(set.contains(Permission::Deploy));
        assert_eq!(unknown, vec!["legacy_token".to_string()]);
    }
}
