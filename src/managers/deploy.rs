use crate::bot::command::CommandContext;
use crate::bot::router::CommandHandler;
use crate::errors::OpsError;
use crate::managers::remote::{RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::utils::shell::{join_remote_path, quote};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

static REPO_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^git@github\.com:[\w-]+/[\w-]+\.git$").expect("repository link regex")
});
static EXPOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"EXPOSE\s+(\d+)").expect("expose regex"));

pub fn is_repository_link(text: &str) -> bool {
    REPO_LINK_RE.is_match(text)
}

/// `git@github.com:owner/site.git` -> `site`.
pub fn repository_name(link: &str) -> Option<&str> {
    link.rsplit('/').next()?.strip_suffix(".git")
}

/// First `EXPOSE <port>` in a Dockerfile, or `default`.
pub fn exposed_port(dockerfile: &str, default: u16) -> u16 {
    EXPOSE_RE
        .captures(dockerfile)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(default)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildKind {
    Compose,
    Dockerfile,
}

pub struct DeployManager {
    logger: Logger,
    connector: Arc<dyn RemoteConnector>,
    target_dir: String,
    default_port: u16,
    timeout: Duration,
}

impl DeployManager {
    pub fn new(
        logger: Logger,
        connector: Arc<dyn RemoteConnector>,
        target_dir: String,
        default_port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            logger: logger.child("deploy"),
            connector,
            target_dir,
            default_port,
            timeout,
        }
    }

    pub async fn handle_command(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        let link = match ctx.args() {
            [link] if is_repository_link(link) => link.clone(),
            _ => {
                return Err(OpsError::invalid_params(
                    "Please send a valid SSH link to a GitHub repository \
                     (for example: git@github.com:username/repository.git).",
                ))
            }
        };
        let name = repository_name(&link)
            .ok_or_else(|| OpsError::invalid_params("Could not derive the repository name."))?
            .to_string();
        let repo_path = join_remote_path(&self.target_dir, &name);

        ctx.progress(&format!("Starting deployment of {}...", name))
            .await;
        let mut session = self.connector.open().await?;
        let outcome = self
            .deploy(ctx, session.as_ref(), &link, &name, &repo_path)
            .await;
        session.close().await;
        match &outcome {
            Ok(_) => self.logger.info(
                "deployment finished",
                Some(&serde_json::json!({"repository": name})),
            ),
            Err(err) => self.logger.warn(
                "deployment failed",
                Some(&serde_json::json!({"repository": name, "error": err.message})),
            ),
        }
        outcome
    }

    async fn deploy(
        &self,
        ctx: &CommandContext,
        session: &dyn RemoteSession,
        link: &str,
        name: &str,
        repo_path: &str,
    ) -> Result<String, OpsError> {
        let prepared = session
            .execute(&format!("mkdir -p {}", quote(&self.target_dir)))
            .await?;
        if !prepared.success() {
            return Err(prepared.failure(&format!("Failed to create {}", self.target_dir)));
        }

        self.sync_repository(ctx, session, link, name, repo_path)
            .await?;

        let compose_path = join_remote_path(repo_path, "docker-compose.yml");
        let has_compose = file_exists(session, &compose_path).await?;
        let dockerfile_path = join_remote_path(repo_path, "Dockerfile");
        let has_dockerfile = file_exists(session, &dockerfile_path).await?;
        let kind = match (has_compose, has_dockerfile) {
            (true, _) => BuildKind::Compose,
            (false, true) => BuildKind::Dockerfile,
            (false, false) => {
                return Err(OpsError::not_found(
                    "The repository has no Dockerfile or docker-compose.yml.",
                ))
            }
        };

        let mut port = self.default_port;
        if has_dockerfile {
            let dockerfile = session
                .execute(&format!("cat {}", quote(&dockerfile_path)))
                .await?;
            if dockerfile.success() {
                port = exposed_port(&dockerfile.stdout, self.default_port);
            }
        }

        ctx.progress("Building and starting the container...").await;
        let command = build_command(kind, repo_path, name, port);
        let output = session.execute_with_timeout(&command, self.timeout).await?;
        if !output.success() {
            return Err(output.failure("Deployment failed"));
        }
        Ok(format!("Repository {} deployed on port {}!", name, port))
    }

    /// `git pull` when the checkout exists, `git clone` otherwise.
    async fn sync_repository(
        &self,
        ctx: &CommandContext,
        session: &dyn RemoteSession,
        link: &str,
        name: &str,
        repo_path: &str,
    ) -> Result<(), OpsError> {
        let exists = session
            .execute(&format!("test -d {} && echo exists", quote(repo_path)))
            .await?
            .printed("exists");
        let (command, action) = if exists {
            ctx.progress("Repository already exists, running git pull...")
                .await;
            (format!("cd {} && git pull", quote(repo_path)), "git pull failed")
        } else {
            ctx.progress("Cloning the repository...").await;
            (
                format!(
                    "cd {} && git clone {} {}",
                    quote(&self.target_dir),
                    quote(link),
                    quote(name)
                ),
                "Cloning the repository failed",
            )
        };
        let output = session.execute_with_timeout(&command, self.timeout).await?;
        if !output.success() {
            return Err(output.failure(action));
        }
        Ok(())
    }
}

pub fn build_command(kind: BuildKind, repo_path: &str, name: &str, port: u16) -> String {
    match kind {
        BuildKind::Compose => format!("cd {} && docker-compose up --build -d", quote(repo_path)),
        BuildKind::Dockerfile => {
            let image = quote(&name.to_lowercase());
            format!(
                "cd {} && docker build -t {image} . && docker run -d -p {port}:{port} {image}",
                quote(repo_path),
                image = image,
                port = port
            )
        }
    }
}

async fn file_exists(session: &dyn RemoteSession, path: &str) -> Result<bool, OpsError> {
    Ok(session
        .execute(&format!("test -f {} && echo exists", quote(path)))
        .await?
        .printed("exists"))
}

#[async_trait]
impl CommandHandler for DeployManager {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, OpsError> {
        self.handle_command(ctx).await
    }
}
