//! SPA Server - A static asset server for single page applications
//!
//! Resolves requests through a fallback chain ending at the index file,
//! caches assets in memory with optional template injection, and attaches
//! rule-based cache headers.

pub mod cache;
pub mod cache_control;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod resolver;
pub mod server;
pub mod tasks;
pub mod template;

pub use cache::FileCache;
pub use config::{ConfigSource, ServerConfig};
pub use server::{create_router, AppState};
pub use tasks::spawn_request_id_generator;
