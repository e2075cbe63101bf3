use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpsErrorKind {
    /// Sender is not a known principal.
    Unauthorized,
    /// Known principal without the required capability, or a refused bootstrap.
    Denied,
    InvalidParams,
    NotFound,
    Conflict,
    /// Remote command finished with a failing exit status.
    Remote,
    /// Session could not be established or broke mid-operation.
    Connection,
    Timeout,
    TooLarge,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpsError {
    pub kind: OpsErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl OpsError {
    pub fn new(kind: OpsErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Unauthorized, "UNAUTHORIZED", message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Denied, "DENIED", message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Conflict, "CONFLICT", message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Remote, "REMOTE", message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Connection, "CONNECTION", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::TooLarge, "TOO_LARGE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(OpsErrorKind::Internal, "INTERNAL", message)
    }

    /// Text shown to the chat user; the hint, when present, goes on its own line.
    pub fn user_message(&self) -> String {
        let body = match self.kind {
            OpsErrorKind::Unauthorized | OpsErrorKind::Denied => self.message.clone(),
            OpsErrorKind::Connection => format!("Connection error: {}", self.message),
            _ => format!("Error: {}", self.message),
        };
        match &self.hint {
            Some(hint) => format!("{}\n{}", body, hint),
            None => body,
        }
    }
}

impl fmt::Display for OpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for OpsError {}

impl From<std::io::Error> for OpsError {
    fn from(err: std::io::Error) -> Self {
        OpsError::internal(err.to_string())
    }
}
