use crate::bot::protocol::Update;
use crate::bot::router::CommandRouter;
use crate::bot::telegram::TelegramClient;
use crate::constants::network as network_constants;
use crate::errors::OpsError;
use crate::services::logger::Logger;
use crate::services::monitor::MonitorService;
use std::sync::Arc;
use std::time::Duration;

/// Long-polling loop: one task per inbound update, Ctrl-C stops polling and
/// cancels every monitor job.
pub struct BotServer {
    logger: Logger,
    client: Arc<TelegramClient>,
    router: Arc<CommandRouter>,
    monitor: Arc<MonitorService>,
}

impl BotServer {
    pub fn new(
        logger: Logger,
        client: Arc<TelegramClient>,
        router: Arc<CommandRouter>,
        monitor: Arc<MonitorService>,
    ) -> Self {
        Self {
            logger: logger.child("server"),
            client,
            router,
            monitor,
        }
    }

    pub async fn run(&self) -> Result<(), OpsError> {
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;
        self.logger.info("polling started", None);

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    if let Err(err) = signal {
                        self.logger.error(
                            "failed to listen for shutdown signal",
                            Some(&serde_json::json!({"error": err.to_string()})),
                        );
                    }
                    break;
                }
                polled = self.client.get_updates(offset, network_constants::TELEGRAM_POLL_TIMEOUT_SECS) => {
                    match polled {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(update.update_id + 1);
                                self.dispatch(update);
                            }
                        }
                        Err(err) => {
                            self.logger.warn(
                                "polling failed",
                                Some(&serde_json::json!({"error": err.message})),
                            );
                            let pause = Duration::from_millis(network_constants::TELEGRAM_POLL_ERROR_PAUSE_MS);
                            tokio::select! {
                                _ = &mut shutdown => break,
                                _ = tokio::time::sleep(pause) => {}
                            }
                        }
                    }
                }
            }
        }

        self.logger.info("shutting down", None);
        self.monitor.stop_all().await;
        Ok(())
    }

    fn dispatch(&self, update: Update) {
        let update_id = update.update_id;
        let Some(command) = update.into_command() else {
            self.logger.debug(
                "ignoring update",
                Some(&serde_json::json!({"update_id": update_id})),
            );
            return;
        };
        let router = self.router.clone();
        tokio::spawn(async move {
            router.dispatch(command).await;
        });
    }
}
