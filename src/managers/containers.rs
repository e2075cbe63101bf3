use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::constants::limits::CONTAINER_LOG_LINES;
use crate::errors::OpsError;
use crate::managers::remote::{RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::utils::command_errors::unknown_command_error;
use crate::utils::shell::quote;
use async_trait::async_trait;
use std::sync::Arc;

pub const CONTAINER_COMMANDS: &[&str] = &[
    "containers",
    "start_container",
    "stop",
    "remove",
    "logs",
    "stats",
];

const LIST_COMMAND: &str =
    r#"docker ps -a --format "{{.ID}}\t{{.Names}}\t{{.Ports}}\t{{.Status}}""#;
const STATS_COMMAND: &str =
    r#"docker stats --no-stream --format "{{.Name}}\t{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}""#;

#[derive(Debug)]
enum ContainerAction {
    List,
    Stats,
    Start(String),
    Stop(String),
    Remove(String),
    Logs(String),
}

pub struct ContainersManager {
    logger: Logger,
    validation: Validation,
    connector: Arc<dyn RemoteConnector>,
}

impl ContainersManager {
    pub fn new(logger: Logger, validation: Validation, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            logger: logger.child("containers"),
            validation,
            connector,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        let action = self.parse_action(ctx)?;
        let mut session = self.connector.open().await?;
        let outcome = match &action {
            ContainerAction::List => list(session.as_ref()).await,
            ContainerAction::Stats => stats(session.as_ref()).await,
            ContainerAction::Start(id) => start(session.as_ref(), id).await,
            ContainerAction::Stop(id) => stop(session.as_ref(), id).await,
            ContainerAction::Remove(id) => remove(session.as_ref(), id).await,
            ContainerAction::Logs(id) => logs(session.as_ref(), id).await,
        };
        session.close().await;
        if let Err(err) = &outcome {
            self.logger.debug(
                "container command failed",
                Some(&serde_json::json!({"action": format!("{:?}", action), "error": err.message})),
            );
        }
        outcome
    }

    /// Validates arguments before any connection is made.
    fn parse_action(&self, ctx: &CommandContext) -> Result<ContainerAction, OpsError> {
        match ctx.name() {
            "containers" => {
                self.validation.ensure_arg_count(ctx.args(), 0, 0, "/containers")?;
                Ok(ContainerAction::List)
            }
            "stats" => {
                self.validation.ensure_arg_count(ctx.args(), 0, 0, "/stats")?;
                Ok(ContainerAction::Stats)
            }
            "start_container" => self
                .container_id(ctx, "/start_container <container_id>")
                .map(ContainerAction::Start),
            "stop" => self
                .container_id(ctx, "/stop <container_id>")
                .map(ContainerAction::Stop),
            "remove" => self
                .container_id(ctx, "/remove <container_id>")
                .map(ContainerAction::Remove),
            "logs" => self
                .container_id(ctx, "/logs <container_id>")
                .map(ContainerAction::Logs),
            other => Err(unknown_command_error(other, CONTAINER_COMMANDS)),
        }
    }

    fn container_id(&self, ctx: &CommandContext, usage: &str) -> Result<String, OpsError> {
        self.validation.ensure_arg_count(ctx.args(), 1, 1, usage)?;
        self.validation
            .ensure_identifier(&ctx.args()[0], "Container id")
    }
}

async fn list(session: &dyn RemoteSession) -> Result<String, OpsError> {
    let output = session.execute(LIST_COMMAND).await?;
    if !output.success() {
        return Err(output.failure("Failed to list containers"));
    }
    let rows = output.stdout.trim();
    if rows.is_empty() {
        return Ok("No containers found.".to_string());
    }
    Ok(format!("Containers:\nID\tName\tPorts\tStatus\n{}", rows))
}

async fn stats(session: &dyn RemoteSession) -> Result<String, OpsError> {
    let output = session.execute(STATS_COMMAND).await?;
    if !output.success() {
        return Err(output.failure("Failed to read container stats"));
    }
    let rows = output.stdout.trim();
    if rows.is_empty() {
        return Ok("No containers found.".to_string());
    }
    Ok(format!("Container stats:\nName\tCPU\tMemory\tNet I/O\n{}", rows))
}

async fn start(session: &dyn RemoteSession, id: &str) -> Result<String, OpsError> {
    let output = session.execute(&format!("docker start {}", quote(id))).await?;
    if !output.success() {
        return Err(output.failure(&format!("Failed to start container {}", id)));
    }
    Ok(format!("Container {} started.", id))
}

async fn stop(session: &dyn RemoteSession, id: &str) -> Result<String, OpsError> {
    let output = session.execute(&format!("docker stop {}", quote(id))).await?;
    if !output.success() {
        return Err(output.failure(&format!("Failed to stop container {}", id)));
    }
    Ok(format!("Container {} stopped.", id))
}

/// Stops the container first when it is running, then removes it.
async fn remove(session: &dyn RemoteSession, id: &str) -> Result<String, OpsError> {
    let quoted = quote(id);
    let inspect = session
        .execute(&format!(
            "docker inspect --format '{{{{.State.Running}}}}' {}",
            quoted
        ))
        .await?;
    if !inspect.success() {
        return Err(inspect.failure(&format!("Failed to inspect container {}", id)));
    }
    if inspect.stdout.trim() == "true" {
        let stopped = session.execute(&format!("docker stop {}", quoted)).await?;
        if !stopped.success() {
            return Err(stopped.failure(&format!("Failed to stop container {}", id)));
        }
    }
    let removed = session.execute(&format!("docker rm {}", quoted)).await?;
    if !removed.success() {
        return Err(removed.failure(&format!("Failed to remove container {}", id)));
    }
    Ok(format!("Container {} removed.", id))
}

async fn logs(session: &dyn RemoteSession, id: &str) -> Result<String, OpsError> {
    let output = session
        .execute(&format!(
            "docker logs --tail {} {}",
            CONTAINER_LOG_LINES,
            quote(id)
        ))
        .await?;
    if !output.success() {
        return Err(output.failure(&format!("Failed to read logs of container {}", id)));
    }
    let body = output.stdout.trim();
    if body.is_empty() {
        return Ok(format!("Logs of container {} are empty.", id));
    }
    Ok(format!("Logs of container {}:\n{}", id, body))
}

#[async_trait]
impl CommandHandler for ContainersManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
