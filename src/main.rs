use clap::{Parser, Subcommand};
use opsbot::config::{resolve_db_path, BotConfig};
use opsbot::errors::OpsError;
use opsbot::services::logger::Logger;
use opsbot::services::permissions::{Permission, PermissionSet};
use opsbot::stores::{PermissionStore, SqlitePermissionStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opsbot", version, about = "Chat-driven operations bot for a single host")]
struct Cli {
    /// Permission database (defaults to OPSBOT_DB_PATH or data/bot.db).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the chat API and serve commands (default).
    Run,
    /// Inspect or edit the permission table without starting the bot.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    List,
    /// Create or replace a user's permission set.
    Grant {
        chat_id: i64,
        /// Comma or space separated permission names.
        #[arg(required = true)]
        permissions: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(cli.db_path).await,
        Command::Users { action } => manage_users(cli.db_path, action),
    };
    if let Err(err) = result {
        eprintln!("opsbot: {}", err.user_message());
        std::process::exit(1);
    }
}

async fn run_bot(db_path: Option<PathBuf>) -> Result<(), OpsError> {
    let mut config = BotConfig::from_env()?;
    if let Some(path) = db_path {
        config = config.with_db_path(path);
    }
    opsbot::app::run(config).await
}

fn manage_users(db_path: Option<PathBuf>, action: UsersAction) -> Result<(), OpsError> {
    let path = db_path.unwrap_or_else(resolve_db_path);
    let store = SqlitePermissionStore::open(Logger::new("opsbot"), &path)?;
    match action {
        UsersAction::List => {
            let users = store.list()?;
            if users.is_empty() {
                println!("No users.");
            }
            for (id, permissions) in users {
                println!("{}\t{}", id, permissions);
            }
        }
        UsersAction::Grant {
            chat_id,
            permissions,
        } => {
            let joined = permissions.join(",");
            let set = PermissionSet::parse_tokens(joined.split(',')).map_err(|unknown| {
                OpsError::invalid_params(format!("Unknown permissions: {}", unknown.join(", ")))
                    .with_hint(format!("Valid permissions: {}", Permission::vocabulary()))
            })?;
            store.put(chat_id, &set)?;
            println!("{}\t{}", chat_id, set);
        }
    }
    Ok(())
}
