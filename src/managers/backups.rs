use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::errors::OpsError;
use crate::managers::files::deliver_remote_file;
use crate::managers::remote::{RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::utils::command_errors::unknown_command_error;
use crate::utils::shell::{join_remote_path, quote, split_remote_path};
use async_trait::async_trait;
use std::sync::Arc;

pub const BACKUP_COMMANDS: &[&str] = &["backup", "restore", "list_backups", "download"];

/// Archive name for a directory: `<dirname>_<YYYYmmddHHMMSS>.tar.gz`.
pub fn archive_name(dir_name: &str, at: chrono::DateTime<chrono::Local>) -> String {
    format!("{}_{}.tar.gz", dir_name, at.format("%Y%m%d%H%M%S"))
}

pub struct BackupsManager {
    logger: Logger,
    validation: Validation,
    connector: Arc<dyn RemoteConnector>,
    backup_dir: String,
    max_transfer_bytes: u64,
}

impl BackupsManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        connector: Arc<dyn RemoteConnector>,
        backup_dir: String,
        max_transfer_bytes: u64,
    ) -> Self {
        Self {
            logger: logger.child("backups"),
            validation,
            connector,
            backup_dir,
            max_transfer_bytes,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        match ctx.name() {
            "backup" => self.backup(ctx).await,
            "restore" => self.restore(ctx).await,
            "list_backups" => self.list_backups(ctx).await,
            "download" => self.download(ctx).await,
            other => Err(unknown_command_error(other, BACKUP_COMMANDS)),
        }
    }

    async fn backup(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/backup <path>")?;
        let path = self
            .validation
            .ensure_absolute_path(&ctx.args()[0], "backup source")?;
        let (parent, dir_name) = split_remote_path(&path)
            .ok_or_else(|| OpsError::invalid_params("The root directory cannot be backed up."))?;

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            if !directory_exists(session.as_ref(), &path).await? {
                return Err(OpsError::not_found(format!(
                    "Directory {} does not exist on the server.",
                    path
                )));
            }
            self.ensure_backup_dir(session.as_ref()).await?;
            let name = archive_name(&dir_name, chrono::Local::now());
            let archive = join_remote_path(&self.backup_dir, &name);
            ctx.progress(&format!("Creating a backup of {}...", path)).await;
            let output = session
                .execute(&format!(
                    "tar -czf {} -C {} {}",
                    quote(&archive),
                    quote(&parent),
                    quote(&dir_name)
                ))
                .await?;
            if !output.success() {
                return Err(output.failure("Backup failed"));
            }
            self.logger.info(
                "backup created",
                Some(&serde_json::json!({"source": path, "archive": archive})),
            );
            Ok(format!("Backup created: {}", name))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn restore(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 2, 2, "/restore <backup_name> <target_dir>")?;
        let name = self
            .validation
            .ensure_file_name(&ctx.args()[0], "Backup name")?;
        let target = self
            .validation
            .ensure_absolute_path(&ctx.args()[1], "target directory")?;
        let archive = join_remote_path(&self.backup_dir, &name);

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            self.ensure_archive_exists(session.as_ref(), &name, &archive)
                .await?;
            let created = session
                .execute(&format!("mkdir -p {}", quote(&target)))
                .await?;
            if !created.success() {
                return Err(created.failure(&format!("Failed to create directory {}", target)));
            }
            ctx.progress(&format!("Restoring {} into {}...", name, target))
                .await;
            let output = session
                .execute(&format!("tar -xzf {} -C {}", quote(&archive), quote(&target)))
                .await?;
            if !output.success() {
                return Err(output.failure("Restore failed"));
            }
            self.logger.info(
                "backup restored",
                Some(&serde_json::json!({"archive": archive, "target": target})),
            );
            Ok(format!("Backup {} restored into {}.", name, target))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn list_backups(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 0, 0, "/list_backups")?;
        let mut session = self.connector.open().await?;
        let outcome = session
            .execute(&format!("ls -lh {}", quote(&self.backup_dir)))
            .await;
        session.close().await;
        let output = outcome?;
        if !output.success() {
            return Err(output.failure("Failed to list backups"));
        }
        let listing = output.stdout.trim();
        if listing.is_empty() {
            return Ok(format!("No backups found in {}.", self.backup_dir));
        }
        Ok(format!("Backups in {}:\n{}", self.backup_dir, listing))
    }

    async fn download(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/download <backup_name>")?;
        let name = self
            .validation
            .ensure_file_name(&ctx.args()[0], "Backup name")?;
        let archive = join_remote_path(&self.backup_dir, &name);

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            self.ensure_archive_exists(session.as_ref(), &name, &archive)
                .await?;
            ctx.progress(&format!("Downloading {}...", name)).await;
            deliver_remote_file(
                ctx,
                session.as_ref(),
                &archive,
                &name,
                self.max_transfer_bytes,
            )
            .await?;
            Ok(format!("Backup {} sent.", name))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn ensure_backup_dir(&self, session: &dyn RemoteSession) -> Result<(), OpsError> {
        let output = session
            .execute(&format!("mkdir -p {}", quote(&self.backup_dir)))
            .await?;
        if !output.success() {
            return Err(output.failure(&format!(
                "Failed to create backup directory {}",
                self.backup_dir
            )));
        }
        Ok(())
    }

    async fn ensure_archive_exists(
        &self,
        session: &dyn RemoteSession,
        name: &str,
        archive: &str,
    ) -> Result<(), OpsError> {
        let probe = session
            .execute(&format!("test -f {} && echo exists", quote(archive)))
            .await?;
        if probe.printed("exists") {
            return Ok(());
        }
        Err(OpsError::not_found(format!(
            "Backup {} does not exist in {}.",
            name, self.backup_dir
        )))
    }
}

async fn directory_exists(session: &dyn RemoteSession, path: &str) -> Result<bool, OpsError> {
    let probe = session
        .execute(&format!("test -d {} && echo exists", quote(path)))
        .await?;
    Ok(probe.printed("exists"))
}

#[async_trait]
impl CommandHandler for BackupsManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
