use crate::errors::OpsError;
use crate::utils::shell::readable_file_probe;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Result of one remote command. Consumed once by the handler that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
            truncated: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// grep-style contract: 1 means "ran fine, nothing matched".
    pub fn search_completed(&self) -> bool {
        self.exit_status == 0 || self.exit_status == 1
    }

    /// True when the command succeeded and printed exactly `marker`.
    pub fn printed(&self, marker: &str) -> bool {
        self.success() && self.stdout.trim() == marker
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Remote error for a failed command, carrying stderr or, when that is
    /// empty, the exit status.
    pub fn failure(&self, context: &str) -> OpsError {
        let stderr = self.stderr_trimmed();
        if stderr.is_empty() {
            OpsError::remote(format!("{} (exit status {})", context, self.exit_status))
        } else {
            OpsError::remote(format!("{}: {}", context, stderr))
        }
    }
}

/// One authenticated connection to the managed host. Dropping a session
/// releases it; `close` does the same explicitly and can be awaited.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput, OpsError>;

    async fn execute_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, OpsError>;

    async fn upload(&self, bytes: Vec<u8>, remote_path: &str) -> Result<(), OpsError>;

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, OpsError>;

    /// Writes the remote file to `local_path`, creating parent directories.
    /// Returns the number of bytes written.
    async fn download_to(&self, remote_path: &str, local_path: &Path) -> Result<u64, OpsError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, OpsError>;
}

/// Fails with NotFound unless `path` is a regular file the remote user can read.
pub async fn probe_readable(session: &dyn RemoteSession, path: &str) -> Result<(), OpsError> {
    let probe = session.execute(&readable_file_probe(path)).await?;
    if probe.printed("readable") {
        return Ok(());
    }
    let mut message = format!("File {} does not exist or is not readable.", path);
    if !probe.stderr_trimmed().is_empty() {
        message.push(' ');
        message.push_str(probe.stderr_trimmed());
    }
    Err(OpsError::not_found(message))
}
