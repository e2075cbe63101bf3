use crate::bot::transport::{send_or_log, ChatId, ChatTransport};
use crate::errors::OpsError;
use crate::services::logger::Logger;
use crate::stores::PrincipalId;
use std::sync::Arc;

/// Command name used for plain-text messages (repository links).
pub const DEPLOY_COMMAND: &str = "deploy";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundDocument {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

/// One inbound request: command name without the leading slash, its
/// whitespace-separated arguments, the sender and the chat to answer in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundCommand {
    pub name: String,
    pub args: Vec<String>,
    pub principal: PrincipalId,
    pub chat_id: ChatId,
    pub document: Option<InboundDocument>,
}

impl InboundCommand {
    pub fn new(name: &str, args: &[&str], principal: PrincipalId, chat_id: ChatId) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            principal,
            chat_id,
            document: None,
        }
    }

    pub fn with_document(mut self, document: InboundDocument) -> Self {
        self.document = Some(document);
        self
    }

    /// Parses message text (or a document caption).
    ///
    /// `/cmd@botname a b` yields `cmd` with args `[a, b]`. Plain text without a
    /// leading slash is treated as a deploy request carrying the whole text.
    /// Attachments are only accepted together with a command caption.
    pub fn parse(
        text: &str,
        principal: PrincipalId,
        chat_id: ChatId,
        document: Option<InboundDocument>,
    ) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let (name, args) = match trimmed.strip_prefix('/') {
            Some(rest) => {
                let mut tokens = rest.split_whitespace();
                let head = tokens.next()?;
                let name = head.split('@').next().unwrap_or(head);
                if name.is_empty() {
                    return None;
                }
                (name.to_string(), tokens.map(str::to_string).collect())
            }
            None if document.is_none() => (DEPLOY_COMMAND.to_string(), vec![trimmed.to_string()]),
            None => return None,
        };
        Some(Self {
            name,
            args,
            principal,
            chat_id,
            document,
        })
    }
}

/// Everything a handler needs to serve one command.
#[derive(Clone)]
pub struct CommandContext {
    pub command: InboundCommand,
    pub transport: Arc<dyn ChatTransport>,
    logger: Logger,
}

impl CommandContext {
    pub fn new(command: InboundCommand, transport: Arc<dyn ChatTransport>, logger: Logger) -> Self {
        Self {
            command,
            transport,
            logger,
        }
    }

    pub fn name(&self) -> &str {
        &self.command.name
    }

    pub fn args(&self) -> &[String] {
        &self.command.args
    }

    pub fn principal(&self) -> PrincipalId {
        self.command.principal
    }

    pub fn chat_id(&self) -> ChatId {
        self.command.chat_id
    }

    /// Intermediate status line sent before the final reply.
    pub async fn progress(&self, text: &str) {
        send_or_log(self.transport.as_ref(), &self.logger, self.chat_id(), text).await;
    }

    pub async fn send_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<(), OpsError> {
        self.transport
            .send_document(self.chat_id(), file_name, bytes)
            .await
    }
}
