use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::constants::limits::DEFAULT_TAIL_LINES;
use crate::constants::monitor::DEFAULT_INTERVAL_SECS;
use crate::errors::OpsError;
use crate::managers::remote::{probe_readable, RemoteConnector};
use crate::services::logger::Logger;
use crate::services::monitor::MonitorService;
use crate::services::validation::Validation;
use crate::utils::command_errors::unknown_command_error;
use crate::utils::shell::quote;
use async_trait::async_trait;
use std::sync::Arc;

pub const LOG_COMMANDS: &[&str] = &["log_logs", "tail", "monitor_logs", "stop_monitoring"];

pub struct LogsManager {
    logger: Logger,
    validation: Validation,
    connector: Arc<dyn RemoteConnector>,
    monitor: Arc<MonitorService>,
}

impl LogsManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        connector: Arc<dyn RemoteConnector>,
        monitor: Arc<MonitorService>,
    ) -> Self {
        Self {
            logger: logger.child("logs"),
            validation,
            connector,
            monitor,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        match ctx.name() {
            "log_logs" => self.search(ctx).await,
            "tail" => self.tail(ctx).await,
            "monitor_logs" => self.monitor_logs(ctx).await,
            "stop_monitoring" => self.stop_monitoring(ctx),
            other => Err(unknown_command_error(other, LOG_COMMANDS)),
        }
    }

    /// `grep` over one file; exit status 1 (no match) is a normal outcome.
    async fn search(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 2, 2, "/log_logs <path> <pattern>")?;
        let path = self
            .validation
            .ensure_absolute_path(&ctx.args()[0], "log file")?;
        let pattern = ctx.args()[1].clone();

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            probe_readable(session.as_ref(), &path).await?;
            let output = session
                .execute(&format!("grep -e {} -- {}", quote(&pattern), quote(&path)))
                .await?;
            if !output.search_completed() {
                return Err(output.failure("Log search failed"));
            }
            if output.truncated {
                self.logger.warn(
                    "search output truncated",
                    Some(&serde_json::json!({"path": path})),
                );
            }
            if output.stdout.trim().is_empty() {
                return Ok(format!(
                    "No lines in {} match the pattern '{}'.",
                    path, pattern
                ));
            }
            Ok(format!(
                "Search results in {} (pattern: {}):\n{}",
                path,
                pattern,
                output.stdout.trim_end()
            ))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn tail(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 2, "/tail <path> [n]")?;
        let path = self
            .validation
            .ensure_absolute_path(&ctx.args()[0], "log file")?;
        let lines = match ctx.args().get(1) {
            Some(raw) => self.validation.ensure_positive_int(raw, "Line count")?,
            None => DEFAULT_TAIL_LINES,
        };

        let mut session = self.connector.open().await?;
        let outcome: Result<String, OpsError> = async {
            probe_readable(session.as_ref(), &path).await?;
            let output = session
                .execute(&format!("tail -n {} {}", lines, quote(&path)))
                .await?;
            if !output.success() {
                return Err(output.failure("Failed to read the log"));
            }
            if output.stdout.trim().is_empty() {
                return Ok(format!("File {} is empty.", path));
            }
            Ok(format!(
                "Last {} lines of {}:\n{}",
                lines,
                path,
                output.stdout.trim_end()
            ))
        }
        .await;
        session.close().await;
        outcome
    }

    async fn monitor_logs(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 2, "/monitor_logs <path> [interval]")?;
        let path = self
            .validation
            .ensure_absolute_path(&ctx.args()[0], "log file")?;
        let interval = match ctx.args().get(1) {
            Some(raw) => self.validation.ensure_interval(raw)?,
            None => DEFAULT_INTERVAL_SECS,
        };
        let job = self
            .monitor
            .start(ctx.principal(), ctx.chat_id(), &path, interval)
            .await?;
        Ok(format!(
            "Monitoring {} every {} s. Stop it with /stop_monitoring.",
            job.path, job.interval_secs
        ))
    }

    fn stop_monitoring(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 0, 0, "/stop_monitoring")?;
        self.monitor.stop(ctx.principal())?;
        Ok("Log monitoring stopped.".to_string())
    }
}

#[async_trait]
impl CommandHandler for LogsManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
