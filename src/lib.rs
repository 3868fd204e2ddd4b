pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::{ProxyConfig, ServerUrl};
pub use errors::ProxyError;
pub use models::{AppState, AuthMode, ProxyContext, TokenCacheEntry};
