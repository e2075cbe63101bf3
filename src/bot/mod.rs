pub mod command;
pub mod protocol;
pub mod router;
pub mod server;
pub mod telegram;
pub mod transport;

pub use command::{CommandContext, InboundCommand, InboundDocument};
pub use router::{CommandHandler, CommandRouter, Gate};
pub use transport::{ChatId, ChatTransport};
