use crate::bot::transport::{send_or_log, ChatId, ChatTransport};
use crate::constants::monitor::TAIL_LINES;
use crate::errors::OpsError;
use crate::managers::remote::{probe_readable, RemoteConnector, RemoteSession};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::stores::PrincipalId;
use crate::utils::shell::quote;
use crate::utils::text::last_lines;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Public view of a running job.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorJobInfo {
    pub job_id: Uuid,
    pub path: String,
    pub interval_secs: f64,
}

struct MonitorJob {
    job_id: Uuid,
    principal: PrincipalId,
    chat_id: ChatId,
    path: String,
    interval_secs: f64,
    cancelled: AtomicBool,
    ticks: AtomicU64,
    last_seen: Mutex<LastSeen>,
}

/// Output of the newest tick applied so far. Ticks finishing out of order
/// carry an older `tick` number and are discarded.
#[derive(Default)]
struct LastSeen {
    tick: u64,
    output: String,
}

impl MonitorJob {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }
}

struct MonitorHandle {
    job: Arc<MonitorJob>,
    scheduler: JoinHandle<()>,
}

impl MonitorHandle {
    fn shutdown(self) -> JoinHandle<()> {
        self.job.cancel();
        self.scheduler.abort();
        self.scheduler
    }
}

/// Per-principal repeating tail watcher. At most one job per principal; each
/// job owns its own cancellation flag and scheduler task.
#[derive(Clone)]
pub struct MonitorService {
    logger: Logger,
    validation: Validation,
    connector: Arc<dyn RemoteConnector>,
    transport: Arc<dyn ChatTransport>,
    jobs: Arc<DashMap<PrincipalId, MonitorHandle>>,
}

impl MonitorService {
    pub fn new(
        logger: Logger,
        connector: Arc<dyn RemoteConnector>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            logger: logger.child("monitor"),
            validation: Validation::new(),
            connector,
            transport,
            jobs: Arc::new(DashMap::new()),
        }
    }

    pub fn is_active(&self, principal: PrincipalId) -> bool {
        self.jobs.contains_key(&principal)
    }

    pub fn active_job(&self, principal: PrincipalId) -> Option<MonitorJobInfo> {
        self.jobs.get(&principal).map(|handle| MonitorJobInfo {
            job_id: handle.job.job_id,
            path: handle.job.path.clone(),
            interval_secs: handle.job.interval_secs,
        })
    }

    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    /// Registers a job after probing that `path` is a readable file. The first
    /// tick fires one interval after registration.
    pub async fn start(
        &self,
        principal: PrincipalId,
        chat_id: ChatId,
        path: &str,
        interval_secs: f64,
    ) -> Result<MonitorJobInfo, OpsError> {
        if self.is_active(principal) {
            return Err(already_active());
        }
        let interval_secs = self.validation.ensure_interval_secs(interval_secs)?;
        let period = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| OpsError::invalid_params("Interval is out of range."))?;

        let mut session = self.connector.open().await?;
        let probed = probe_readable(session.as_ref(), path).await;
        session.close().await;
        probed?;

        let job = Arc::new(MonitorJob {
            job_id: Uuid::new_v4(),
            principal,
            chat_id,
            path: path.to_string(),
            interval_secs,
            cancelled: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            last_seen: Mutex::new(LastSeen::default()),
        });

        match self.jobs.entry(principal) {
            Entry::Occupied(_) => return Err(already_active()),
            Entry::Vacant(slot) => {
                let scheduler = tokio::spawn(self.clone().schedule(job.clone(), period));
                slot.insert(MonitorHandle {
                    job: job.clone(),
                    scheduler,
                });
            }
        }

        self.logger.info(
            "monitor started",
            Some(&serde_json::json!({
                "chat_id": principal,
                "job_id": job.job_id.to_string(),
                "path": path,
                "interval_secs": interval_secs,
            })),
        );
        Ok(MonitorJobInfo {
            job_id: job.job_id,
            path: job.path.clone(),
            interval_secs,
        })
    }

    /// Cancels future ticks. Ticks already running finish but do not notify.
    pub fn stop(&self, principal: PrincipalId) -> Result<(), OpsError> {
        let (_, handle) = self
            .jobs
            .remove(&principal)
            .ok_or_else(|| OpsError::not_found("No active log monitoring."))?;
        let job_id = handle.job.job_id;
        handle.shutdown();
        self.logger.info(
            "monitor stopped",
            Some(&serde_json::json!({"chat_id": principal, "job_id": job_id.to_string()})),
        );
        Ok(())
    }

    pub async fn stop_all(&self) {
        let principals: Vec<PrincipalId> = self.jobs.iter().map(|entry| *entry.key()).collect();
        let mut schedulers = Vec::new();
        for principal in principals {
            if let Some((_, handle)) = self.jobs.remove(&principal) {
                schedulers.push(handle.shutdown());
            }
        }
        let stopped = schedulers.len();
        futures::future::join_all(schedulers).await;
        if stopped > 0 {
            self.logger.info(
                "all monitors stopped",
                Some(&serde_json::json!({"count": stopped})),
            );
        }
    }

    async fn schedule(self, job: Arc<MonitorJob>, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if job.is_cancelled() {
                break;
            }
            let service = self.clone();
            let job = job.clone();
            let tick = job.next_tick();
            tokio::spawn(async move { service.run_tick(job, tick).await });
        }
    }

    async fn run_tick(&self, job: Arc<MonitorJob>, tick_no: u64) {
        match tick(self.connector.as_ref(), &job.path).await {
            Ok(stdout) => {
                let notification = {
                    let mut last = job.last_seen.lock().await;
                    if tick_no < last.tick {
                        self.logger.debug(
                            "stale tick discarded",
                            Some(&serde_json::json!({
                                "job_id": job.job_id.to_string(),
                                "tick": tick_no,
                                "applied": last.tick,
                            })),
                        );
                        None
                    } else {
                        last.tick = tick_no;
                        if stdout.trim().is_empty() || last.output == stdout {
                            None
                        } else {
                            let message = format!(
                                "New lines in {}:\n{}",
                                job.path,
                                last_lines(&stdout, TAIL_LINES).join("\n")
                            );
                            last.output = stdout;
                            Some(message)
                        }
                    }
                };
                if let Some(message) = notification {
                    if !job.is_cancelled() {
                        send_or_log(self.transport.as_ref(), &self.logger, job.chat_id, &message)
                            .await;
                    }
                }
            }
            Err(err) => self.terminate(&job, err).await,
        }
    }

    async fn terminate(&self, job: &Arc<MonitorJob>, err: OpsError) {
        let already_cancelled = job.is_cancelled();
        job.cancel();
        if let Some((_, handle)) = self
            .jobs
            .remove_if(&job.principal, |_, handle| handle.job.job_id == job.job_id)
        {
            handle.shutdown();
        }
        self.logger.warn(
            "monitor terminated by tick failure",
            Some(&serde_json::json!({
                "chat_id": job.principal,
                "job_id": job.job_id.to_string(),
                "error": err.message,
            })),
        );
        if !already_cancelled {
            let message = format!(
                "{}\nMonitoring of {} stopped.",
                err.user_message(),
                job.path
            );
            send_or_log(self.transport.as_ref(), &self.logger, job.chat_id, &message).await;
        }
    }
}

fn already_active() -> OpsError {
    OpsError::conflict("You already have an active log monitor.")
        .with_hint("Stop it with /stop_monitoring.")
}

/// One polling step on a fresh session: re-probe, then read the tail.
async fn tick(connector: &dyn RemoteConnector, path: &str) -> Result<String, OpsError> {
    let mut session = connector.open().await?;
    let outcome = tail_once(session.as_ref(), path).await;
    session.close().await;
    outcome
}

async fn tail_once(session: &dyn RemoteSession, path: &str) -> Result<String, OpsError> {
    probe_readable(session, path).await?;
    let output = session
        .execute(&format!("tail -n {} {}", TAIL_LINES, quote(path)))
        .await?;
    if !output.success() {
        return Err(OpsError::remote(format!(
            "Log monitoring failed: {}",
            output.stderr_trimmed()
        )));
    }
    Ok(output.stdout)
}
