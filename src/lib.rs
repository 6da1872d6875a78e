pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use config::AppConfig;
pub use error::{ConfigError, GatewayError};
pub use server::{app, AppState};
