use crate::constants::{defaults, limits, network};
use crate::errors::OpsError;
use crate::managers::ssh::SshSettings;
use crate::utils::paths::{env_value, expand_home_path, normalize_env_value};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings resolved from the environment.
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub telegram_token: String,
    pub telegram_api_base: String,
    pub ssh: SshSettings,
    pub target_dir: String,
    pub backup_dir: String,
    pub admin_password: Option<String>,
    pub default_port: u16,
    pub db_path: PathBuf,
    pub deploy_timeout: Duration,
    pub max_transfer_bytes: u64,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, OpsError> {
        Self::from_lookup(env_value)
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OpsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| normalize_env_value(lookup(key));

        let telegram_token = require(&get, "TELEGRAM_TOKEN")?;
        let ssh = resolve_ssh_settings(&get)?;
        let default_port = match get("DEFAULT_PORT") {
            Some(raw) => parse_port("DEFAULT_PORT", &raw)?,
            None => defaults::DEPLOY_PORT,
        };

        Ok(Self {
            telegram_token,
            telegram_api_base: get("TELEGRAM_API_BASE")
                .unwrap_or_else(|| network::TELEGRAM_API_BASE.to_string()),
            ssh,
            target_dir: remote_dir(get("TARGET_DIR"), defaults::TARGET_DIR, "TARGET_DIR")?,
            backup_dir: remote_dir(get("BACKUP_DIR"), defaults::BACKUP_DIR, "BACKUP_DIR")?,
            admin_password: get("ADMIN_PASSWORD"),
            default_port,
            db_path: get("OPSBOT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(defaults::DB_PATH)),
            deploy_timeout: Duration::from_millis(network::TIMEOUT_DEPLOY_MS),
            max_transfer_bytes: limits::MAX_TRANSFER_BYTES,
        })
    }

    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db_path = path;
        self
    }
}

/// Store location for commands that need nothing else from the environment.
pub fn resolve_db_path() -> PathBuf {
    env_value("OPSBOT_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(defaults::DB_PATH))
}

fn resolve_ssh_settings<G>(get: &G) -> Result<SshSettings, OpsError>
where
    G: Fn(&str) -> Option<String>,
{
    let host = require(get, "VPS_HOST")?;
    let username = require(get, "VPS_USERNAME")?;
    let port = match get("VPS_PORT") {
        Some(raw) => parse_port("VPS_PORT", &raw)?,
        None => network::SSH_DEFAULT_PORT,
    };
    let password = get("VPS_PASSWORD");
    let key_path = get("VPS_KEY_PATH").map(|raw| expand_home_path(&raw));
    if password.is_none() && key_path.is_none() {
        return Err(OpsError::invalid_params("No SSH credentials configured")
            .with_hint("Set VPS_KEY_PATH and/or VPS_PASSWORD."));
    }
    let ready_timeout_ms = match get("OPSBOT_SSH_TIMEOUT_MS") {
        Some(raw) => raw.parse::<u64>().ok().filter(|v| *v > 0).ok_or_else(|| {
            OpsError::invalid_params("OPSBOT_SSH_TIMEOUT_MS must be a positive integer")
        })?,
        None => network::TIMEOUT_SSH_READY_MS,
    };
    Ok(SshSettings {
        host,
        port,
        username,
        password,
        key_path,
        key_passphrase: get("VPS_KEY_PASSPHRASE"),
        host_key_fingerprint: get("VPS_HOST_KEY_SHA256").map(|raw| {
            if raw.starts_with("SHA256:") {
                raw
            } else {
                format!("SHA256:{}", raw)
            }
        }),
        ready_timeout_ms,
        keepalive_interval_ms: network::KEEPALIVE_INTERVAL_MS,
        max_capture_bytes: limits::MAX_CAPTURE_BYTES,
    })
}

fn require<G>(get: &G, key: &str) -> Result<String, OpsError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).ok_or_else(|| OpsError::invalid_params(format!("{} is not set", key)))
}

fn parse_port(key: &str, raw: &str) -> Result<u16, OpsError> {
    raw.parse::<u16>()
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| OpsError::invalid_params(format!("{} must be a port number", key)))
}

fn remote_dir(value: Option<String>, default: &str, key: &str) -> Result<String, OpsError> {
    let dir = value.unwrap_or_else(|| default.to_string());
    if !dir.starts_with('/') {
        return Err(OpsError::invalid_params(format!(
            "{} must be an absolute path",
            key
        )));
    }
    let trimmed = dir.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}
