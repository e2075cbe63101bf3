pub mod app;
pub mod bot;
pub mod config;
pub mod constants;
pub mod errors;
pub mod managers;
pub mod services;
pub mod stores;
pub mod utils;
