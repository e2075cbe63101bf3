pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_READY_MS: u64 = 10_000;
    pub const TIMEOUT_SSH_CLOSE_GRACE_MS: u64 = 2_000;
    pub const TIMEOUT_DEPLOY_MS: u64 = 300_000;
    pub const KEEPALIVE_INTERVAL_MS: u64 = 30_000;
    pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
    pub const TELEGRAM_POLL_TIMEOUT_SECS: u64 = 30;
    pub const TELEGRAM_POLL_ERROR_PAUSE_MS: u64 = 5_000;
}

pub mod limits {
    pub const MESSAGE_CHUNK_CHARS: usize = 4_000;
    pub const MAX_TRANSFER_BYTES: u64 = 50 * 1024 * 1024;
    pub const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;
    pub const DEFAULT_TAIL_LINES: u32 = 10;
    pub const CONTAINER_LOG_LINES: u32 = 50;
}

pub mod monitor {
    pub const TAIL_LINES: usize = 10;
    pub const MIN_INTERVAL_SECS: f64 = 1.0;
    pub const MAX_INTERVAL_SECS: f64 = 86_400.0;
    pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;
}

pub mod defaults {
    pub const TARGET_DIR: &str = "/home/users/repos";
    pub const BACKUP_DIR: &str = "/backups";
    pub const DEPLOY_PORT: u16 = 1234;
    pub const DB_PATH: &str = "data/bot.db";
}
