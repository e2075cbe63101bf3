use crate::constants::network as network_constants;
use crate::errors::OpsError;
use crate::managers::remote::{CommandOutput, RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::utils::fs_atomic::{ensure_dir_for_file, temp_sibling_path};
use async_trait::async_trait;
use base64::Engine;
use ssh2::{OpenFlags, OpenType, Session};
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Connection parameters for the managed host.
///
/// Credential policy: when a key file is configured it is tried first; if the
/// server rejects it and a password is configured, password authentication is
/// attempted next. Either one alone is also accepted.
#[derive(Clone, Debug)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub host_key_fingerprint: Option<String>,
    pub ready_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub max_capture_bytes: usize,
}

#[derive(Clone)]
pub struct SshConnector {
    logger: Logger,
    settings: Arc<SshSettings>,
}

impl SshConnector {
    pub fn new(logger: Logger, settings: SshSettings) -> Self {
        Self {
            logger: logger.child("ssh"),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, OpsError> {
        let settings = self.settings.clone();
        let started = Instant::now();
        let session = tokio::task::spawn_blocking(move || connect_session(&settings))
            .await
            .map_err(|_| OpsError::internal("SSH connect task failed"))?
            .map_err(|err| {
                self.logger.warn(
                    "ssh connect failed",
                    Some(&serde_json::json!({
                        "host": self.settings.host,
                        "error": err.message,
                    })),
                );
                err
            })?;
        self.logger.debug(
            "ssh session opened",
            Some(&serde_json::json!({
                "host": self.settings.host,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );
        Ok(Box::new(SshSession {
            logger: self.logger.clone(),
            session,
            max_capture_bytes: self.settings.max_capture_bytes,
            released: false,
        }))
    }
}

pub struct SshSession {
    logger: Logger,
    session: Session,
    max_capture_bytes: usize,
    released: bool,
}

impl SshSession {
    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<CommandOutput, OpsError> {
        let session = self.session.clone();
        let command = command.to_string();
        let max_capture = self.max_capture_bytes;
        self.logger.debug(
            "exec",
            Some(&serde_json::json!({"timeout_ms": timeout.map(|t| t.as_millis() as u64)})),
        );
        tokio::task::spawn_blocking(move || exec_blocking(&session, &command, timeout, max_capture))
            .await
            .map_err(|_| OpsError::internal("SSH exec task failed"))?
    }

    async fn with_sftp<F, T>(&self, handler: F) -> Result<T, OpsError>
    where
        F: FnOnce(&ssh2::Sftp) -> Result<T, OpsError> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let sftp = session.sftp().map_err(map_ssh_error)?;
            handler(&sftp)
        })
        .await
        .map_err(|_| OpsError::internal("SSH SFTP task failed"))?
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, OpsError> {
        self.run(command, None).await
    }

    async fn execute_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, OpsError> {
        self.run(command, Some(timeout)).await
    }

    async fn upload(&self, bytes: Vec<u8>, remote_path: &str) -> Result<(), OpsError> {
        let remote = remote_path.to_string();
        self.with_sftp(move |sftp| {
            let mut remote_file = sftp
                .open_mode(
                    Path::new(&remote),
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                    0o644,
                    OpenType::File,
                )
                .map_err(map_ssh_error)?;
            remote_file
                .write_all(&bytes)
                .map_err(|err| OpsError::connection(format!("SFTP upload failed: {}", err)))?;
            Ok(())
        })
        .await
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, OpsError> {
        let remote = remote_path.to_string();
        self.with_sftp(move |sftp| {
            let mut remote_file = sftp.open(Path::new(&remote)).map_err(map_ssh_error)?;
            let mut buf = Vec::new();
            remote_file
                .read_to_end(&mut buf)
                .map_err(|err| OpsError::connection(format!("SFTP download failed: {}", err)))?;
            Ok(buf)
        })
        .await
    }

    async fn download_to(&self, remote_path: &str, local_path: &Path) -> Result<u64, OpsError> {
        let remote = remote_path.to_string();
        let local = local_path.to_path_buf();
        self.with_sftp(move |sftp| {
            ensure_dir_for_file(&local).map_err(|err| {
                OpsError::internal(format!("Failed to create local directory: {}", err))
            })?;
            let tmp = temp_sibling_path(&local);
            let copied = (|| {
                let mut remote_file = sftp.open(Path::new(&remote)).map_err(map_ssh_error)?;
                let mut tmp_file = fs::File::create(&tmp).map_err(|err| {
                    OpsError::internal(format!("Failed to create temp file: {}", err))
                })?;
                std::io::copy(&mut remote_file, &mut tmp_file)
                    .map_err(|err| OpsError::connection(format!("SFTP download failed: {}", err)))
            })();
            match copied {
                Ok(bytes) => {
                    fs::rename(&tmp, &local).map_err(|err| {
                        OpsError::internal(format!("Failed to finalize download: {}", err))
                    })?;
                    Ok(bytes)
                }
                Err(err) => {
                    let _ = fs::remove_file(&tmp);
                    Err(err)
                }
            }
        })
        .await
    }

    async fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            let _ = session.disconnect(None, "session closed", None);
        })
        .await;
        self.logger.debug("ssh session closed", None);
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.session.disconnect(None, "session dropped", None);
        }
    }
}

fn connect_session(settings: &SshSettings) -> Result<Session, OpsError> {
    ensure_credentials(settings)?;
    let addr = (settings.host.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|err| {
            OpsError::connection(format!("Failed to resolve {}: {}", settings.host, err))
        })?
        .next()
        .ok_or_else(|| OpsError::connection(format!("No address for {}", settings.host)))?;
    let tcp = TcpStream::connect_timeout(&addr, Duration::from_millis(settings.ready_timeout_ms))
        .map_err(|err| OpsError::connection(format!("Failed to connect SSH: {}", err)))?;
    tcp.set_read_timeout(Some(Duration::from_millis(settings.ready_timeout_ms)))
        .ok();
    tcp.set_write_timeout(Some(Duration::from_millis(settings.ready_timeout_ms)))
        .ok();

    let mut session =
        Session::new().map_err(|_| OpsError::internal("Failed to create SSH session"))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(map_ssh_error)?;

    if let Some(expected) = settings.host_key_fingerprint.as_ref() {
        let observed = fingerprint_host_key_sha256(&session);
        if observed.as_ref() != Some(expected) {
            return Err(OpsError::connection(format!(
                "SSH host key mismatch (expected {}, got {})",
                expected,
                observed.unwrap_or_else(|| "unknown".to_string())
            )));
        }
    }

    authenticate(&session, settings)?;
    let interval = std::cmp::max(1, (settings.keepalive_interval_ms / 1000) as u32);
    session.set_keepalive(true, interval);
    Ok(session)
}

fn ensure_credentials(settings: &SshSettings) -> Result<(), OpsError> {
    if settings.key_path.is_none() && settings.password.is_none() {
        return Err(OpsError::invalid_params("No SSH credentials configured")
            .with_hint("Set VPS_KEY_PATH and/or VPS_PASSWORD."));
    }
    Ok(())
}

fn authenticate(session: &Session, settings: &SshSettings) -> Result<(), OpsError> {
    let mut failures = Vec::new();
    if let Some(key_path) = settings.key_path.as_ref() {
        match session.userauth_pubkey_file(
            &settings.username,
            None,
            key_path,
            settings.key_passphrase.as_deref(),
        ) {
            Ok(()) if session.authenticated() => return Ok(()),
            Ok(()) => failures.push("key rejected".to_string()),
            Err(err) => failures.push(format!("key: {}", err.message())),
        }
    }
    if let Some(password) = settings.password.as_ref() {
        match session.userauth_password(&settings.username, password) {
            Ok(()) if session.authenticated() => return Ok(()),
            Ok(()) => failures.push("password rejected".to_string()),
            Err(err) => failures.push(format!("password: {}", err.message())),
        }
    }
    Err(OpsError::connection(format!(
        "SSH authentication failed ({})",
        failures.join("; ")
    )))
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

struct Capture {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Outcome of one non-blocking read attempt.
enum ReadStep {
    Data,
    Idle,
    Closed,
}

fn read_step(stream: &mut impl Read, capture: &mut Capture, label: &str) -> Result<ReadStep, OpsError> {
    let mut buf = [0u8; 8192];
    match stream.read(&mut buf) {
        Ok(0) => Ok(ReadStep::Closed),
        Ok(n) => {
            capture.push(&buf[..n]);
            Ok(ReadStep::Data)
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(ReadStep::Idle),
        Err(err) => Err(OpsError::connection(format!("SSH {} read failed: {}", label, err))),
    }
}

fn pump_channel(
    channel: &mut ssh2::Channel,
    timeout: Option<Duration>,
    stdout: &mut Capture,
    stderr: &mut Capture,
) -> Result<bool, OpsError> {
    let mut stderr_stream = channel.stderr();
    let started = Instant::now();
    loop {
        let out = read_step(channel, stdout, "stdout")?;
        let err = read_step(&mut stderr_stream, stderr, "stderr")?;
        let progressed = matches!(out, ReadStep::Data) || matches!(err, ReadStep::Data);

        if channel.eof() {
            // Drain whatever is still buffered on either stream.
            loop {
                let out = read_step(channel, stdout, "stdout")?;
                let err = read_step(&mut stderr_stream, stderr, "stderr")?;
                if !matches!(out, ReadStep::Data) && !matches!(err, ReadStep::Data) {
                    break;
                }
            }
            return Ok(false);
        }
        if let Some(limit) = timeout {
            if started.elapsed() > limit {
                return Ok(true);
            }
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

fn exec_blocking(
    session: &Session,
    command: &str,
    timeout: Option<Duration>,
    max_capture: usize,
) -> Result<CommandOutput, OpsError> {
    let mut channel = session.channel_session().map_err(map_ssh_error)?;
    channel.exec(command).map_err(map_ssh_error)?;

    let mut stdout = Capture::new(max_capture);
    let mut stderr = Capture::new(max_capture);
    session.set_blocking(false);
    let pumped = pump_channel(&mut channel, timeout, &mut stdout, &mut stderr);
    session.set_blocking(true);
    let timed_out = pumped?;

    if timed_out {
        let _ = channel.close();
        let grace = Duration::from_millis(network_constants::TIMEOUT_SSH_CLOSE_GRACE_MS);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && !channel.eof() {
            std::thread::sleep(Duration::from_millis(20));
        }
        let limit = timeout.map(|t| t.as_secs()).unwrap_or_default();
        return Err(OpsError::timeout(format!(
            "Remote command did not finish within {} s",
            limit
        )));
    }

    let _ = channel.wait_close();
    let exit_status = channel.exit_status().map_err(map_ssh_error)?;
    let truncated = stdout.truncated || stderr.truncated;
    Ok(CommandOutput {
        stdout: stdout.into_string(),
        stderr: stderr.into_string(),
        exit_status,
        truncated,
    })
}

fn map_ssh_error(err: ssh2::Error) -> OpsError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => OpsError::timeout("SSH operation timed out"),
        _ => OpsError::connection(format!("SSH error: {}", io_err)),
    }
}
