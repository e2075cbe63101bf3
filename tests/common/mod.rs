#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use opsbot::app::App;
use opsbot::bot::command::{InboundCommand, InboundDocument};
use opsbot::bot::transport::{ChatId, ChatTransport};
use opsbot::config::BotConfig;
use opsbot::errors::OpsError;
use opsbot::managers::remote::{CommandOutput, RemoteConnector, RemoteSession};
use opsbot::services::logger::Logger;
use opsbot::services::permissions::{Permission, PermissionSet};
use opsbot::stores::{MemoryPermissionStore, PermissionStore};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const ADMIN_SECRET: &str = "s3cret";

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput::new(stdout, "", 0)
}

pub fn failed(stderr: &str, status: i32) -> CommandOutput {
    CommandOutput::new("", stderr, status)
}

#[derive(Default)]
struct RemoteState {
    scripts: Vec<(String, VecDeque<CommandOutput>)>,
    delays: Vec<(String, VecDeque<Duration>)>,
    executed: Vec<String>,
    uploads: Vec<(String, Vec<u8>)>,
    files: HashMap<String, Vec<u8>>,
    opened: usize,
    closed: usize,
    fail_connect: bool,
}

/// Scripted stand-in for the managed host. Responses are matched by
/// substring in registration order; the last response of a script repeats.
/// Unscripted commands succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<StdMutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: &str, outputs: Vec<CommandOutput>) {
        let mut state = self.state.lock().expect("remote state");
        state
            .scripts
            .push((pattern.to_string(), outputs.into_iter().collect()));
    }

    pub fn respond_ok(&self, pattern: &str, stdout: &str) {
        self.respond(pattern, vec![ok(stdout)]);
    }

    pub fn put_file(&self, path: &str, bytes: &[u8]) {
        let mut state = self.state.lock().expect("remote state");
        state.files.insert(path.to_string(), bytes.to_vec());
    }

    /// Holds back the next matching results. Each delay applies once.
    pub fn delay(&self, pattern: &str, delays: Vec<Duration>) {
        let mut state = self.state.lock().expect("remote state");
        state
            .delays
            .push((pattern.to_string(), delays.into_iter().collect()));
    }

    fn delay_for(&self, command: &str) -> Option<Duration> {
        let mut state = self.state.lock().expect("remote state");
        state
            .delays
            .iter_mut()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .and_then(|(_, delays)| delays.pop_front())
    }

    pub fn refuse_connections(&self) {
        self.state.lock().expect("remote state").fail_connect = true;
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().expect("remote state").executed.clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.executed().iter().any(|cmd| cmd.contains(fragment))
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().expect("remote state").uploads.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().expect("remote state").opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().expect("remote state").closed
    }

    fn run(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock().expect("remote state");
        state.executed.push(command.to_string());
        for (pattern, outputs) in state.scripts.iter_mut() {
            if !command.contains(pattern.as_str()) {
                continue;
            }
            return if outputs.len() > 1 {
                outputs.pop_front().unwrap_or_else(|| ok(""))
            } else {
                outputs.front().cloned().unwrap_or_else(|| ok(""))
            };
        }
        ok("")
    }
}

#[async_trait]
impl RemoteConnector for FakeRemote {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, OpsError> {
        let mut state = self.state.lock().expect("remote state");
        if state.fail_connect {
            return Err(OpsError::connection("connection refused"));
        }
        state.opened += 1;
        Ok(Box::new(FakeSession {
            remote: self.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    remote: FakeRemote,
    closed: bool,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, OpsError> {
        let output = self.remote.run(command);
        if let Some(delay) = self.remote.delay_for(command) {
            tokio::time::sleep(delay).await;
        }
        Ok(output)
    }

    async fn execute_with_timeout(
        &self,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, OpsError> {
        Ok(self.remote.run(command))
    }

    async fn upload(&self, bytes: Vec<u8>, remote_path: &str) -> Result<(), OpsError> {
        let mut state = self.remote.state.lock().expect("remote state");
        state.uploads.push((remote_path.to_string(), bytes.clone()));
        state.files.insert(remote_path.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, OpsError> {
        let state = self.remote.state.lock().expect("remote state");
        state
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| OpsError::not_found(format!("{} not found", remote_path)))
    }

    async fn download_to(&self, remote_path: &str, local_path: &Path) -> Result<u64, OpsError> {
        let bytes = self.download(remote_path).await?;
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.remote.state.lock().expect("remote state").closed += 1;
        }
    }
}

/// Chat transport that records everything sent through it.
#[derive(Default)]
pub struct RecordingTransport {
    texts: StdMutex<Vec<(ChatId, String)>>,
    documents: StdMutex<Vec<(ChatId, String, Vec<u8>)>>,
    incoming: StdMutex<HashMap<String, Vec<u8>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts
            .lock()
            .expect("texts")
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.texts
            .lock()
            .expect("texts")
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn documents(&self) -> Vec<(ChatId, String, Vec<u8>)> {
        self.documents.lock().expect("documents").clone()
    }

    pub fn put_incoming(&self, file_id: &str, bytes: &[u8]) {
        self.incoming
            .lock()
            .expect("incoming")
            .insert(file_id.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), OpsError> {
        self.texts
            .lock()
            .expect("texts")
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), OpsError> {
        self.documents
            .lock()
            .expect("documents")
            .push((chat_id, file_name.to_string(), bytes));
        Ok(())
    }

    async fn fetch_document(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, OpsError> {
        let bytes = self
            .incoming
            .lock()
            .expect("incoming")
            .get(file_id)
            .cloned()
            .ok_or_else(|| OpsError::not_found(format!("file {} not found", file_id)))?;
        if bytes.len() as u64 > max_bytes {
            return Err(OpsError::too_large(format!(
                "File is too large (>{} MB) for the chat transport.",
                max_bytes / (1024 * 1024)
            )));
        }
        Ok(bytes)
    }
}

pub fn test_config() -> BotConfig {
    let pairs: HashMap<&str, &str> = [
        ("TELEGRAM_TOKEN", "123:test"),
        ("VPS_HOST", "vps.test"),
        ("VPS_USERNAME", "deploy"),
        ("VPS_PASSWORD", "hunter2"),
        ("ADMIN_PASSWORD", ADMIN_SECRET),
    ]
    .into_iter()
    .collect();
    BotConfig::from_lookup(|key: &str| pairs.get(key).map(|value| value.to_string()))
        .expect("test config")
}

pub struct Harness {
    pub app: App,
    pub remote: FakeRemote,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<dyn PermissionStore>,
}

pub fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryPermissionStore::new()))
}

pub fn harness_with_store(store: Arc<dyn PermissionStore>) -> Harness {
    harness_with_config(test_config(), store)
}

pub fn harness_with_config(config: BotConfig, store: Arc<dyn PermissionStore>) -> Harness {
    let remote = FakeRemote::new();
    let transport = Arc::new(RecordingTransport::new());
    let app = App::assemble(
        Logger::new("test"),
        config,
        store.clone(),
        Arc::new(remote.clone()),
        transport.clone(),
    )
    .expect("assemble app");
    Harness {
        app,
        remote,
        transport,
        store,
    }
}

impl Harness {
    pub fn grant(&self, id: i64, permissions: &[Permission]) {
        let set: PermissionSet = permissions.iter().copied().collect();
        self.store.put(id, &set).expect("grant");
    }

    /// Sends message text the way the poll loop would and returns the reply.
    pub async fn send(&self, principal: i64, text: &str) -> String {
        let command =
            InboundCommand::parse(text, principal, principal, None).expect("parsable command");
        self.app.router.execute(command).await
    }

    pub async fn send_with_document(
        &self,
        principal: i64,
        caption: &str,
        document: InboundDocument,
    ) -> String {
        let command = InboundCommand::parse(caption, principal, principal, Some(document))
            .expect("parsable command");
        self.app.router.execute(command).await
    }

    pub fn assert_sessions_released(&self) {
        assert_eq!(self.remote.opened(), self.remote.closed());
    }
}
