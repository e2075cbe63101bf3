use super::{PermissionStore, PrincipalId, StoreError};
use crate::services::logger::Logger;
use crate::services::permissions::PermissionSet;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store. A connection is opened per operation so concurrent
/// handlers never share one; SQLite serializes the writes.
#[derive(Clone)]
pub struct SqlitePermissionStore {
    logger: Logger,
    db_path: PathBuf,
}

impl SqlitePermissionStore {
    pub fn open(logger: Logger, db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            logger: logger.child("store"),
            db_path: db_path.as_ref().to_path_buf(),
        };
        if let Some(parent) = store.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = store.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              chat_id INTEGER PRIMARY KEY,
              permissions TEXT
            );
            "#,
        )?;
        store.logger.debug(
            "permission store ready",
            Some(&serde_json::json!({"path": store.db_path.display().to_string()})),
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Ok(conn)
    }

    fn decode(&self, id: PrincipalId, raw: Option<String>) -> PermissionSet {
        let (set, unknown) = PermissionSet::from_storage(raw.as_deref().unwrap_or(""));
        if !unknown.is_empty() {
            self.logger.warn(
                "ignoring unknown stored permission tokens",
                Some(&serde_json::json!({"chat_id": id, "tokens": unknown})),
            );
        }
        set
    }
}

impl PermissionStore for SqlitePermissionStore {
    fn exists(&self, id: PrincipalId) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM users WHERE chat_id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, id: PrincipalId) -> Result<PermissionSet, StoreError> {
        let conn = self.connect()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT permissions FROM users WHERE chat_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(self.decode(id, raw.flatten()))
    }

    fn put(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO users (chat_id, permissions) VALUES (?1, ?2)",
            params![id, permissions.to_storage()],
        )?;
        Ok(())
    }

    fn set(&self, id: PrincipalId, permissions: &PermissionSet) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE users SET permissions = ?1 WHERE chat_id = ?2",
            params![permissions.to_storage(), id],
        )?;
        Ok(())
    }

    fn delete(&self, id: PrincipalId) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM users WHERE chat_id = ?1", params![id])?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<(PrincipalId, PermissionSet)>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT chat_id, permissions FROM users ORDER BY chat_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            out.push((id, self.decode(id, raw)));
        }
        Ok(out)
    }

    fn put_if_empty(
        &self,
        id: PrincipalId,
        permissions: &PermissionSet,
    ) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let written = conn.execute(
            "INSERT INTO users (chat_id, permissions) \
             SELECT ?1, ?2 WHERE NOT EXISTS (SELECT 1 FROM users)",
            params![id, permissions.to_storage()],
        )?;
        Ok(written == 1)
    }
}
