pub mod backups;
pub mod containers;
pub mod deploy;
pub mod files;
pub mod logs;
pub mod remote;
pub mod ssh;
pub mod users;
