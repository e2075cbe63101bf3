use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::errors::OpsError;
use crate::managers::remote::{probe_readable, RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::utils::command_errors::unknown_command_error;
use crate::utils::fs_atomic::ScratchDir;
use crate::utils::shell::{file_size_command, join_remote_path, split_remote_path, writable_dir_probe};
use async_trait::async_trait;
use std::sync::Arc;

pub const FILE_COMMANDS: &[&str] = &["upload", "download_file"];

const DEFAULT_UPLOAD_NAME: &str = "uploaded_file";

pub struct FilesManager {
    logger: Logger,
    validation: Validation,
    connector: Arc<dyn RemoteConnector>,
    max_transfer_bytes: u64,
}

impl FilesManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        connector: Arc<dyn RemoteConnector>,
        max_transfer_bytes: u64,
    ) -> Self {
        Self {
            logger: logger.child("files"),
            validation,
            connector,
            max_transfer_bytes,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        match ctx.name() {
            "upload" => self.upload(ctx).await,
            "download_file" => self.download_file(ctx).await,
            other => Err(unknown_command_error(other, FILE_COMMANDS)),
        }
    }

    async fn upload(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/upload <path_to_dir> as the file caption")?;
        let dir = self
            .validation
            .ensure_absolute_path(&ctx.args()[0], "directory")?;
        let document = ctx.command.document.clone().ok_or_else(|| {
            OpsError::invalid_params("Please attach a file to the message.")
                .with_hint("Send the file with the caption /upload <path_to_dir>.")
        })?;
        if let Some(size) = document.file_size {
            self.ensure_transferable(size)?;
        }
        let file_name = self.validation.ensure_file_name(
            document.file_name.as_deref().unwrap_or(DEFAULT_UPLOAD_NAME),
            "File name",
        )?;
        let remote_path = join_remote_path(&dir, &file_name);

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            let probe = session.execute(&writable_dir_probe(&dir)).await?;
            if !probe.printed("writable") {
                return Err(OpsError::not_found(format!(
                    "Directory {} does not exist or is not writable.",
                    dir
                )));
            }
            let bytes = ctx
                .transport
                .fetch_document(&document.file_id, self.max_transfer_bytes)
                .await?;
            ctx.progress(&format!("Uploading {} to {}...", file_name, remote_path))
                .await;
            let size = bytes.len();
            session.upload(bytes, &remote_path).await?;
            self.logger.info(
                "file uploaded",
                Some(&serde_json::json!({"path": remote_path, "bytes": size})),
            );
            Ok(format!("File {} uploaded to {}.", file_name, remote_path))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn download_file(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/download_file <path_to_file>")?;
        let path = self.validation.ensure_absolute_path(&ctx.args()[0], "file")?;
        let (_, file_name) = split_remote_path(&path)
            .ok_or_else(|| OpsError::invalid_params("Please name a file, not the root directory."))?;

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            probe_readable(session.as_ref(), &path).await?;
            ctx.progress(&format!("Downloading {}...", path)).await;
            deliver_remote_file(
                ctx,
                session.as_ref(),
                &path,
                &file_name,
                self.max_transfer_bytes,
            )
            .await?;
            Ok(format!("File {} sent.", file_name))
        }
        .await;
        session.close().await;
        outcome
    }

    fn ensure_transferable(&self, size: u64) -> Result<(), OpsError> {
        ensure_within_limit(size, self.max_transfer_bytes)
    }
}

pub(crate) fn ensure_within_limit(size: u64, limit: u64) -> Result<(), OpsError> {
    if size > limit {
        return Err(OpsError::too_large(format!(
            "File is too large (>{} MB) for the chat transport.",
            limit / (1024 * 1024)
        )));
    }
    Ok(())
}

pub(crate) async fn remote_file_size(session: &dyn RemoteSession, path: &str) -> Result<u64, OpsError> {
    let output = session.execute(&file_size_command(path)).await?;
    if !output.success() {
        return Err(output.failure("Failed to check the file size"));
    }
    output.stdout.trim().parse::<u64>().map_err(|_| {
        OpsError::remote(format!(
            "Unexpected file size output: {}",
            output.stdout.trim()
        ))
    })
}

/// Checks the size limit, copies the remote file into a scratch directory and
/// sends it as a document. The scratch copy is removed on every path.
pub(crate) async fn deliver_remote_file(
    ctx: &CommandContext,
    session: &dyn RemoteSession,
    remote_path: &str,
    file_name: &str,
    limit: u64,
) -> Result<u64, OpsError> {
    let size = remote_file_size(session, remote_path).await?;
    ensure_within_limit(size, limit)?;
    let scratch = ScratchDir::new("opsbot-download")
        .map_err(|err| OpsError::internal(format!("Failed to create scratch directory: {}", err)))?;
    let local_path = scratch.join(file_name);
    let written = session.download_to(remote_path, &local_path).await?;
    let bytes = tokio::fs::read(&local_path)
        .await
        .map_err(|err| OpsError::internal(format!("Failed to read downloaded file: {}", err)))?;
    ctx.send_document(file_name, bytes).await?;
    Ok(written)
}

#[async_trait]
impl CommandHandler for FilesManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
