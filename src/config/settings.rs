//! Server Settings
//!
//! Immutable configuration assembled once at startup from a [`ConfigSource`]
//! and shared read-only with every request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use regex::Regex;

use super::ConfigSource;
use crate::cache_control::{check_control, CacheRule, CacheRuleMatcher};
use crate::error::ConfigError;

/// Prefix for environment overrides (`SPA_SERVER_PORT`).
pub const ENV_PREFIX: &str = "SPA";

/// Default size bound for cached and templated files (16 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 16 * 1024 * 1024;

/// Template replacement settings.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub enable: bool,
    /// Files whose canonical path matches are templated
    pub pattern: Option<Regex>,
    pub left: String,
    pub right: String,
    /// Largest file that is cached and templated, in bytes
    pub max_size: u64,
    /// Longest token span including both delimiters
    pub max_token_len: usize,
}

impl TemplateConfig {
    /// Whether the asset at `canonical_path` goes through template replacement.
    pub fn is_eligible(&self, canonical_path: &str) -> bool {
        self.enable
            && self
                .pattern
                .as_ref()
                .is_some_and(|re| re.is_match(canonical_path))
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            enable: true,
            pattern: None,
            left: "<[".to_string(),
            right: "]>".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            max_token_len: 32,
        }
    }
}

/// Global cache header settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enable: bool,
    pub expires: Duration,
    pub control: String,
    pub rules: Vec<CacheRule>,
}

impl CacheConfig {
    pub fn matcher(&self) -> CacheRuleMatcher {
        CacheRuleMatcher::new(self.enable, self.expires, &self.control, self.rules.clone())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            expires: Duration::from_secs(30),
            control: "public".to_string(),
            rules: Vec::new(),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
    /// Directory assets are served from
    pub root: PathBuf,
    /// Path prefix stripped from every request, empty for none
    pub base: String,
    /// Index file name used for the fallback chain
    pub index: String,
    /// Path accepting CSP report POSTs, empty to disable
    pub csp_log: String,
    pub shutdown_timeout: Duration,
    /// Extra headers added to every asset response
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub cache: CacheConfig,
    pub template: TemplateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            port: 8000,
            root: PathBuf::from("."),
            base: String::new(),
            index: "index.html".to_string(),
            csp_log: String::new(),
            shutdown_timeout: Duration::ZERO,
            headers: Vec::new(),
            cache: CacheConfig::default(),
            template: TemplateConfig::default(),
        }
    }
}

/// Creates a source carrying every default the server reads.
pub fn default_source() -> ConfigSource {
    let mut source = ConfigSource::new().with_env_prefix(ENV_PREFIX);
    source.set_default("server.addr", "0.0.0.0");
    source.set_default("server.port", 8000);
    source.set_default("server.root", ".");
    source.set_default("server.index", "index.html");
    source.set_default("template.enable", true);
    source.set_default("template.left", "<[");
    source.set_default("template.right", "]>");
    source.set_default("template.maxreplace", 32);
    source.set_default("template.maxsize", DEFAULT_MAX_SIZE);
    source.set_default("cache.enable", true);
    source.set_default("cache.expires", "30s");
    source.set_default("cache.control", "public");
    source.set_default("logging.level", "warn");
    source
}

impl ServerConfig {
    /// Builds the settings, compiling every regexp and validating header values.
    ///
    /// Filesystem checks are separate, see [`ServerConfig::check_paths`].
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let port = source.get_int("server.port");
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
            key: "server.port".to_string(),
            reason: format!("{} is not a valid port", port),
        })?;

        let mut headers = Vec::new();
        for (name, value) in source.get_string_map("headers") {
            let parsed = HeaderName::from_bytes(name.as_bytes())
                .ok()
                .zip(HeaderValue::from_str(&value).ok())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: format!("headers.{}", name),
                    reason: "not a valid HTTP header".to_string(),
                })?;
            headers.push(parsed);
        }

        Ok(Self {
            addr: source.get_string("server.addr"),
            port,
            root: PathBuf::from(source.get_string("server.root")),
            base: source.get_string("server.base"),
            index: source.get_string("server.index"),
            csp_log: source.get_string("server.csplog"),
            shutdown_timeout: source.get_duration("server.shutdown_timeout"),
            headers,
            cache: cache_config(source)?,
            template: template_config(source)?,
        })
    }

    /// `addr:port` for binding the listener.
    pub fn address(&self) -> String {
        if self.addr.contains(':') {
            format!("[{}]:{}", self.addr, self.port)
        } else {
            format!("{}:{}", self.addr, self.port)
        }
    }

    /// Makes sure the root is a readable directory and the index a readable file.
    pub fn check_paths(&self) -> Result<(), ConfigError> {
        check_dir(&self.root).map_err(ConfigError::Root)?;
        check_file(&self.root.join(&self.index)).map_err(ConfigError::Index)
    }
}

fn cache_config(source: &ConfigSource) -> Result<CacheConfig, ConfigError> {
    let control = source.get_string("cache.control");
    check_control(&control)?;

    let mut rules = Vec::new();
    source.for_each("cache.rules", |sub| {
        rules.push(CacheRule::from_config(sub)?);
        Ok(())
    })?;

    Ok(CacheConfig {
        enable: source.get_bool("cache.enable"),
        expires: source.get_duration("cache.expires"),
        control,
        rules,
    })
}

fn template_config(source: &ConfigSource) -> Result<TemplateConfig, ConfigError> {
    let pattern = match source.get_string("template.match") {
        s if s.is_empty() => None,
        s => Some(Regex::new(&s).map_err(|e| ConfigError::InvalidRegex {
            key: "template.match".to_string(),
            source: e,
        })?),
    };

    let left = source.get_string("template.left");
    let right = source.get_string("template.right");
    for (key, delim) in [("template.left", &left), ("template.right", &right)] {
        if delim.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "delimiter must not be empty".to_string(),
            });
        }
    }

    let max_size = source.get_int("template.maxsize");
    let max_token_len = source.get_int("template.maxreplace");
    if max_size < 0 || max_token_len < 0 {
        return Err(ConfigError::InvalidValue {
            key: "template".to_string(),
            reason: "maxsize and maxreplace must not be negative".to_string(),
        });
    }

    Ok(TemplateConfig {
        enable: source.get_bool("template.enable"),
        pattern,
        left,
        right,
        max_size: max_size as u64,
        max_token_len: max_token_len as usize,
    })
}

fn check_dir(path: &Path) -> Result<(), String> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    let meta = std::fs::metadata(path)
        .map_err(|_| format!("directory '{}' not found", path.display()))?;
    if !meta.is_dir() {
        return Err(format!("'{}' is not a directory", path.display()));
    }
    std::fs::read_dir(path).map_err(|_| format!("'{}' is not readable", path.display()))?;
    Ok(())
}

fn check_file(path: &Path) -> Result<(), String> {
    let meta =
        std::fs::metadata(path).map_err(|_| format!("file '{}' not found", path.display()))?;
    if meta.is_dir() {
        return Err(format!("'{}' is a directory", path.display()));
    }
    std::fs::File::open(path).map_err(|_| format!("'{}' is not readable", path.display()))?;
    Ok(())
}
