use crate::constants::limits::MESSAGE_CHUNK_CHARS;
use crate::errors::OpsError;
use crate::services::logger::Logger;
use crate::utils::text::split_message;
use async_trait::async_trait;

pub type ChatId = i64;

/// Outbound side of the messaging interface plus retrieval of inbound
/// attachments.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), OpsError>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), OpsError>;

    /// Fails with `TooLarge` as soon as the attachment exceeds `max_bytes`.
    async fn fetch_document(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, OpsError>;
}

/// Sends `text` split into chunks of at most `MESSAGE_CHUNK_CHARS`, in order.
pub async fn send_chunked(
    transport: &dyn ChatTransport,
    chat_id: ChatId,
    text: &str,
) -> Result<(), OpsError> {
    for chunk in split_message(text, MESSAGE_CHUNK_CHARS) {
        transport.send_text(chat_id, &chunk).await?;
    }
    Ok(())
}

/// Best-effort delivery for progress and notification messages: a failed
/// send is logged and otherwise ignored.
pub async fn send_or_log(transport: &dyn ChatTransport, logger: &Logger, chat_id: ChatId, text: &str) {
    if let Err(err) = send_chunked(transport, chat_id, text).await {
        logger.warn(
            "failed to deliver message",
            Some(&serde_json::json!({"chat_id": chat_id, "error": err.message})),
        );
    }
}
