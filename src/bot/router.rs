use crate::bot::command::{CommandContext, InboundCommand};
use crate::bot::transport::{send_chunked, ChatTransport};
use crate::errors::{OpsError, OpsErrorKind};
use crate::services::authorization::AuthorizationService;
use crate::services::logger::Logger;
use crate::services::permissions::Permission;
use crate::utils::command_errors::unknown_command_error;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs one command and returns the final reply text.
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError>;
}

/// Who may reach a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Anyone, including senders unknown to the permission store.
    Open,
    /// Known principals holding the capability (or admin).
    Capability(Permission),
}

#[derive(Clone)]
struct Route {
    gate: Gate,
    handler: Arc<dyn CommandHandler>,
}

pub struct CommandRouter {
    logger: Logger,
    auth: Arc<AuthorizationService>,
    transport: Arc<dyn ChatTransport>,
    routes: BTreeMap<String, Route>,
}

impl CommandRouter {
    pub fn new(
        logger: Logger,
        auth: Arc<AuthorizationService>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            logger: logger.child("router"),
            auth,
            transport,
            routes: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, gate: Gate, handler: Arc<dyn CommandHandler>) {
        self.routes
            .insert(name.to_string(), Route { gate, handler });
    }

    pub fn commands(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn gate_of(&self, name: &str) -> Option<Gate> {
        self.routes.get(name).map(|route| route.gate)
    }

    /// Runs the command and returns the reply text; every error is converted
    /// into its user-facing form here.
    pub async fn execute(&self, command: InboundCommand) -> String {
        let started = Instant::now();
        let name = command.name.clone();
        let principal = command.principal;
        let outcome = self.run(command).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(reply) => {
                self.logger.debug(
                    "command finished",
                    Some(&serde_json::json!({
                        "command": name,
                        "chat_id": principal,
                        "duration_ms": duration_ms,
                    })),
                );
                reply
            }
            Err(err) => {
                let meta = serde_json::json!({
                    "command": name,
                    "chat_id": principal,
                    "kind": err.kind,
                    "code": err.code,
                    "error": err.message,
                    "duration_ms": duration_ms,
                });
                match err.kind {
                    OpsErrorKind::Internal => self.logger.error("command failed", Some(&meta)),
                    OpsErrorKind::Connection | OpsErrorKind::Timeout => {
                        self.logger.warn("command failed", Some(&meta))
                    }
                    _ => self.logger.info("command rejected", Some(&meta)),
                }
                err.user_message()
            }
        }
    }

    /// `execute` followed by delivery of the reply to the originating chat.
    pub async fn dispatch(&self, command: InboundCommand) {
        let chat_id = command.chat_id;
        let reply = self.execute(command).await;
        if reply.is_empty() {
            return;
        }
        if let Err(err) = send_chunked(self.transport.as_ref(), chat_id, &reply).await {
            self.logger.warn(
                "failed to deliver reply",
                Some(&serde_json::json!({"chat_id": chat_id, "error": err.message})),
            );
        }
    }

    async fn run(&self, command: InboundCommand) -> Result<String, OpsError> {
        let route = match self.routes.get(&command.name) {
            Some(route) => route.clone(),
            None => {
                self.auth.require_known(command.principal)?;
                return Err(unknown_command_error(&command.name, &self.commands()));
            }
        };
        if let Gate::Capability(permission) = route.gate {
            self.auth.require(command.principal, permission)?;
        }
        self.logger.debug(
            "command accepted",
            Some(&serde_json::json!({
                "command": command.name,
                "chat_id": command.principal,
                "args": command.args.len(),
            })),
        );
        let ctx = CommandContext::new(command, self.transport.clone(), self.logger.clone());
        route.handler.handle(&ctx).await
    }
}
