use crate::bot::protocol::{
    ApiResponse, File, GetFileRequest, GetUpdatesRequest, SendMessageRequest, Update,
};
use crate::bot::transport::{ChatId, ChatTransport};
use crate::errors::OpsError;
use crate::managers::files::ensure_within_limit;
use crate::services::logger::Logger;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);

/// Bot API client. The token only ever appears inside the request URLs, which
/// are stripped from every error before it is logged or shown.
pub struct TelegramClient {
    logger: Logger,
    http: reqwest::Client,
    api_base: Url,
    file_base: Url,
}

impl TelegramClient {
    pub fn new(logger: Logger, api_base: &str, token: &str) -> Result<Self, OpsError> {
        let root = api_base.trim_end_matches('/');
        let api_base = Url::parse(&format!("{}/bot{}/", root, token))
            .map_err(|err| OpsError::invalid_params(format!("Invalid Telegram API base: {}", err)))?;
        let file_base = Url::parse(&format!("{}/file/bot{}/", root, token))
            .map_err(|err| OpsError::invalid_params(format!("Invalid Telegram API base: {}", err)))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("opsbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| OpsError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("telegram"),
            http,
            api_base,
            file_base,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, OpsError> {
        self.api_base
            .join(method)
            .map_err(|err| OpsError::internal(format!("Invalid Bot API method {}: {}", method, err)))
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, OpsError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method)?)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(map_http_error)?;
        decode_response(method, response).await
    }

    /// Long poll; returns an empty batch when the server timeout elapses.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, OpsError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message"],
        };
        self.call(
            "getUpdates",
            &request,
            Duration::from_secs(timeout_secs) + POLL_TIMEOUT_MARGIN,
        )
        .await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), OpsError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessageRequest { chat_id, text },
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), OpsError> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        let response = self
            .http
            .post(self.method_url("sendDocument")?)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(map_http_error)?;
        let _: serde_json::Value = decode_response("sendDocument", response).await?;
        self.logger.debug(
            "document sent",
            Some(&serde_json::json!({"chat_id": chat_id, "file_name": file_name, "bytes": size})),
        );
        Ok(())
    }

    async fn fetch_document(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, OpsError> {
        let file: File = self
            .call("getFile", &GetFileRequest { file_id }, REQUEST_TIMEOUT)
            .await?;
        if let Some(size) = file.file_size {
            ensure_within_limit(size, max_bytes)?;
        }
        let file_path = file.file_path.ok_or_else(|| {
            OpsError::remote("Telegram did not return a download path for the file.")
        })?;
        let url = self
            .file_base
            .join(&file_path)
            .map_err(|err| OpsError::internal(format!("Invalid file path: {}", err)))?;
        let mut response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(map_http_error)?;
        if !response.status().is_success() {
            return Err(OpsError::connection(format!(
                "File download failed with HTTP {}",
                response.status().as_u16()
            )));
        }
        if let Some(length) = response.content_length() {
            ensure_within_limit(length, max_bytes)?;
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_http_error)? {
            bytes.extend_from_slice(&chunk);
            ensure_within_limit(bytes.len() as u64, max_bytes)?;
        }
        Ok(bytes)
    }
}

async fn decode_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, OpsError> {
    let status = response.status();
    let parsed: ApiResponse<T> = response.json().await.map_err(|err| {
        OpsError::connection(format!(
            "Invalid {} response (HTTP {}): {}",
            method,
            status.as_u16(),
            err.without_url()
        ))
    })?;
    if !parsed.ok {
        return Err(OpsError::remote(format!(
            "{} failed: {}",
            method,
            parsed
                .description
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        )));
    }
    parsed
        .result
        .ok_or_else(|| OpsError::remote(format!("{} returned no result", method)))
}

fn map_http_error(err: reqwest::Error) -> OpsError {
    if err.is_timeout() {
        return OpsError::timeout("Telegram request timed out");
    }
    OpsError::connection(format!("Telegram request failed: {}", err.without_url()))
}
