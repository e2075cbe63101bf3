use crate::bot::command::DEPLOY_COMMAND;
use crate::bot::router::{CommandHandler, CommandRouter, Gate};
use crate::bot::server::BotServer;
use crate::bot::telegram::TelegramClient;
use crate::bot::transport::ChatTransport;
use crate::config::BotConfig;
use crate::errors::OpsError;
use crate::managers::backups::{BackupsManager, BACKUP_COMMANDS};
use crate::managers::containers::{ContainersManager, CONTAINER_COMMANDS};
use crate::managers::deploy::DeployManager;
use crate::managers::files::{FilesManager, FILE_COMMANDS};
use crate::managers::logs::{LogsManager, LOG_COMMANDS};
use crate::managers::remote::RemoteConnector;
use crate::managers::ssh::SshConnector;
use crate::managers::users::{UsersManager, USERS_COMMANDS};
use crate::services::authorization::AuthorizationService;
use crate::services::logger::Logger;
use crate::services::monitor::MonitorService;
use crate::services::permissions::Permission;
use crate::services::validation::Validation;
use crate::stores::{PermissionStore, SqlitePermissionStore};
use std::sync::Arc;

/// Command name, gate. Every handler family's command list must be covered.
const ROUTES: &[(&str, Gate)] = &[
    ("start", Gate::Open),
    ("whoami", Gate::Open),
    ("init", Gate::Open),
    ("add_user", Gate::Capability(Permission::Admin)),
    ("remove_user", Gate::Capability(Permission::Admin)),
    ("update_permissions", Gate::Capability(Permission::Admin)),
    ("list_users", Gate::Capability(Permission::Admin)),
    ("containers", Gate::Capability(Permission::ContainersList)),
    ("start_container", Gate::Capability(Permission::ContainersStart)),
    ("stop", Gate::Capability(Permission::ContainersStop)),
    ("remove", Gate::Capability(Permission::ContainersRemove)),
    ("logs", Gate::Capability(Permission::ContainersList)),
    ("stats", Gate::Capability(Permission::ContainersList)),
    ("backup", Gate::Capability(Permission::BackupsCreate)),
    ("restore", Gate::Capability(Permission::BackupsRestore)),
    ("list_backups", Gate::Capability(Permission::BackupsDownload)),
    ("download", Gate::Capability(Permission::BackupsDownload)),
    ("log_logs", Gate::Capability(Permission::LogsView)),
    ("tail", Gate::Capability(Permission::LogsView)),
    ("monitor_logs", Gate::Capability(Permission::LogsMonitor)),
    ("stop_monitoring", Gate::Capability(Permission::LogsMonitor)),
    ("upload", Gate::Capability(Permission::FilesUpload)),
    ("download_file", Gate::Capability(Permission::FilesDownload)),
    (DEPLOY_COMMAND, Gate::Capability(Permission::Deploy)),
];

pub struct App {
    pub logger: Logger,
    pub config: BotConfig,
    pub auth: Arc<AuthorizationService>,
    pub monitor: Arc<MonitorService>,
    pub router: Arc<CommandRouter>,
}

impl App {
    fn validate_command_wiring(router: &CommandRouter) -> Result<(), OpsError> {
        let families: [&[&str]; 5] = [
            USERS_COMMANDS,
            CONTAINER_COMMANDS,
            BACKUP_COMMANDS,
            LOG_COMMANDS,
            FILE_COMMANDS,
        ];
        let registered = router.commands();
        let mut missing: Vec<&str> = families
            .iter()
            .flat_map(|family| family.iter().copied())
            .chain(std::iter::once(DEPLOY_COMMAND))
            .filter(|name| !registered.contains(name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        Err(OpsError::internal(format!(
            "Command wiring is incomplete: {}",
            missing.join(", ")
        )))
    }

    /// Wires handlers around the given store, connector and transport.
    pub fn assemble(
        logger: Logger,
        config: BotConfig,
        store: Arc<dyn PermissionStore>,
        connector: Arc<dyn RemoteConnector>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, OpsError> {
        let validation = Validation::new();
        let auth = Arc::new(AuthorizationService::new(
            logger.clone(),
            store,
            config.admin_password.clone(),
        ));
        let monitor = Arc::new(MonitorService::new(
            logger.clone(),
            connector.clone(),
            transport.clone(),
        ));

        let users: Arc<dyn CommandHandler> = Arc::new(UsersManager::new(
            logger.clone(),
            validation.clone(),
            auth.clone(),
        ));
        let containers: Arc<dyn CommandHandler> = Arc::new(ContainersManager::new(
            logger.clone(),
            validation.clone(),
            connector.clone(),
        ));
        let backups: Arc<dyn CommandHandler> = Arc::new(BackupsManager::new(
            logger.clone(),
            validation.clone(),
            connector.clone(),
            config.backup_dir.clone(),
            config.max_transfer_bytes,
        ));
        let logs: Arc<dyn CommandHandler> = Arc::new(LogsManager::new(
            logger.clone(),
            validation.clone(),
            connector.clone(),
            monitor.clone(),
        ));
        let files: Arc<dyn CommandHandler> = Arc::new(FilesManager::new(
            logger.clone(),
            validation,
            connector.clone(),
            config.max_transfer_bytes,
        ));
        let deploy: Arc<dyn CommandHandler> = Arc::new(DeployManager::new(
            logger.clone(),
            connector,
            config.target_dir.clone(),
            config.default_port,
            config.deploy_timeout,
        ));

        let mut router = CommandRouter::new(logger.clone(), auth.clone(), transport);
        for (name, gate) in ROUTES {
            let handler = if USERS_COMMANDS.contains(name) {
                users.clone()
            } else if CONTAINER_COMMANDS.contains(name) {
                containers.clone()
            } else if BACKUP_COMMANDS.contains(name) {
                backups.clone()
            } else if LOG_COMMANDS.contains(name) {
                logs.clone()
            } else if FILE_COMMANDS.contains(name) {
                files.clone()
            } else {
                deploy.clone()
            };
            router.register(name, *gate, handler);
        }
        Self::validate_command_wiring(&router)?;

        Ok(Self {
            logger,
            config,
            auth,
            monitor,
            router: Arc::new(router),
        })
    }

    pub fn initialize(config: BotConfig) -> Result<(Self, Arc<TelegramClient>), OpsError> {
        let logger = Logger::new("opsbot");
        let store: Arc<dyn PermissionStore> =
            Arc::new(SqlitePermissionStore::open(logger.clone(), &config.db_path)?);
        let connector: Arc<dyn RemoteConnector> =
            Arc::new(SshConnector::new(logger.clone(), config.ssh.clone()));
        let client = Arc::new(TelegramClient::new(
            logger.clone(),
            &config.telegram_api_base,
            &config.telegram_token,
        )?);
        if config.admin_password.is_none() {
            logger.warn("ADMIN_PASSWORD is not set; /init is disabled", None);
        }
        let app = Self::assemble(logger, config, store, connector, client.clone())?;
        Ok((app, client))
    }
}

pub async fn run(config: BotConfig) -> Result<(), OpsError> {
    let (app, client) = App::initialize(config)?;
    app.logger.info(
        "starting",
        Some(&serde_json::json!({
            "host": app.config.ssh.host,
            "db_path": app.config.db_path.display().to_string(),
            "commands": app.router.commands().len(),
        })),
    );
    let server = BotServer::new(
        app.logger.clone(),
        client,
        app.router.clone(),
        app.monitor.clone(),
    );
    server.run().await
}
