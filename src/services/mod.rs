pub mod authorization;
pub mod logger;
pub mod monitor;
pub mod permissions;
pub mod validation;
