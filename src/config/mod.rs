//! Configuration Module
//!
//! Layered key/value lookups (defaults, JSON config file, `SPA_*` environment)
//! and the immutable [`ServerConfig`] built from them at startup.

mod settings;
mod source;

pub use settings::{
    default_source, CacheConfig, ServerConfig, TemplateConfig, DEFAULT_MAX_SIZE, ENV_PREFIX,
};
pub use source::{parse_duration, ConfigSource};
