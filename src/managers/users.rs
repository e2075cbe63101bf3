use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::errors::OpsError;
use crate::services::authorization::AuthorizationService;
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::utils::command_errors::unknown_command_error;
use async_trait::async_trait;
use std::sync::Arc;

pub const USERS_COMMANDS: &[&str] = &[
    "start",
    "whoami",
    "init",
    "add_user",
    "remove_user",
    "update_permissions",
    "list_users",
];

pub const START_MESSAGE: &str = "Send an SSH link to a GitHub repository \
(git@github.com:owner/repository.git) to deploy it, or use one of the commands: \
/containers, /backup, /tail, /monitor_logs. Send /whoami to see your permissions.";

pub struct UsersManager {
    logger: Logger,
    validation: Validation,
    auth: Arc<AuthorizationService>,
}

impl UsersManager {
    pub fn new(logger: Logger, validation: Validation, auth: Arc<AuthorizationService>) -> Self {
        Self {
            logger: logger.child("users"),
            validation,
            auth,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        match ctx.name() {
            "start" => Ok(START_MESSAGE.to_string()),
            "whoami" => self.whoami(ctx),
            "init" => self.init(ctx),
            "add_user" => self.add_user(ctx),
            "remove_user" => self.remove_user(ctx),
            "update_permissions" => self.update_permissions(ctx),
            "list_users" => self.list_users(ctx),
            other => Err(unknown_command_error(other, USERS_COMMANDS)),
        }
    }

    fn whoami(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        let id = ctx.principal();
        if !self.auth.is_authorized(id)? {
            return Ok(format!("Your chat_id: {}. You are not authorized.", id));
        }
        let permissions = self.auth.permissions_of(id)?;
        Ok(format!("Your chat_id: {}, Permissions: {}", id, permissions))
    }

    fn init(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        let id = ctx.principal();
        let secret = ctx.args().first().map(String::as_str);
        self.auth.bootstrap(id, secret)?;
        Ok(format!("User {} is now an administrator.", id))
    }

    fn add_user(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/add_user <chat_id>")?;
        let target = self.validation.ensure_chat_id(&ctx.args()[0])?;
        self.auth.add_principal(ctx.principal(), target)?;
        Ok(format!("User {} added without permissions.", target))
    }

    fn remove_user(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation
            .ensure_arg_count(ctx.args(), 1, 1, "/remove_user <chat_id>")?;
        let target = self.validation.ensure_chat_id(&ctx.args()[0])?;
        self.auth.remove_principal(ctx.principal(), target)?;
        Ok(format!("User {} removed.", target))
    }

    fn update_permissions(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.validation.ensure_arg_count(
            ctx.args(),
            2,
            usize::MAX,
            "/update_permissions <chat_id> <permissions>",
        )?;
        let target = self.validation.ensure_chat_id(&ctx.args()[0])?;
        // "a,b c" and "a b,c" both name the same tokens.
        let joined = ctx.args()[1..].join(",");
        let tokens: Vec<&str> = joined.split(',').collect();
        let updated = self
            .auth
            .update_permissions(ctx.principal(), target, &tokens)?;
        Ok(format!("Permissions for {} updated: {}", target, updated))
    }

    fn list_users(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        let users = self.auth.list_principals(ctx.principal())?;
        self.logger.debug(
            "listing users",
            Some(&serde_json::json!({"count": users.len()})),
        );
        if users.is_empty() {
            return Ok("No users.".to_string());
        }
        let mut out = String::from("Users:");
        for (id, permissions) in users {
            out.push_str(&format!("\n- Chat ID: {}, Permissions: {}", id, permissions));
        }
        Ok(out)
    }
}

#[async_trait]
impl CommandHandler for UsersManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
