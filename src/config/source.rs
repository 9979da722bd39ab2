//! Layered key/value configuration source
//!
//! Values are looked up by dotted path (`server.port`) with precedence
//! environment > config file > registered defaults.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Layered configuration document.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Prefix for environment overrides, `None` disables env lookups
    env_prefix: Option<String>,
    /// Values read from a config file or set explicitly
    data: Value,
    /// Registered fallback values
    defaults: Value,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource {
    /// Creates an empty source without environment overrides.
    pub fn new() -> Self {
        Self {
            env_prefix: None,
            data: Value::Object(Map::new()),
            defaults: Value::Object(Map::new()),
        }
    }

    /// Enables environment overrides, e.g. prefix `SPA` maps `server.port`
    /// to `SPA_SERVER_PORT`.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Reads a JSON config file, replacing previously loaded file data.
    pub fn read_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let buf = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.read_str(&buf)
    }

    /// Parses a JSON document, replacing previously loaded file data.
    pub fn read_str(&mut self, buf: &str) -> Result<(), ConfigError> {
        self.data = serde_json::from_str(buf)?;
        Ok(())
    }

    /// Name of the env variable that overrides `key`.
    pub fn env_key(&self, key: &str) -> Option<String> {
        self.env_prefix
            .as_ref()
            .map(|p| format!("{}_{}", p, key.to_uppercase().replace('.', "_")))
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        set_tree(&mut self.data, key, value.into());
    }

    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) {
        set_tree(&mut self.defaults, key, value.into());
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        // an env var set to "" still overrides
        if let Some(name) = self.env_key(key) {
            if let Ok(val) = env::var(&name) {
                return Some(Value::String(val));
            }
        }
        get_tree(&self.data, key)
            .or_else(|| get_tree(&self.defaults, key))
            .cloned()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.lookup(key).map(|v| to_string(&v)).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.lookup(key) {
            Some(Value::Bool(b)) => b,
            Some(v) => parse_bool(&to_string(&v)).unwrap_or(false),
            None => false,
        }
    }

    pub fn get_int(&self, key: &str) -> i64 {
        match self.lookup(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(v) => to_string(&v).trim().parse().unwrap_or(0),
            None => 0,
        }
    }

    /// Integers count seconds, strings use Go-style units (`1h30m`).
    pub fn get_duration(&self, key: &str) -> Duration {
        match self.lookup(key) {
            Some(Value::Number(n)) => n
                .as_f64()
                .and_then(|f| Duration::try_from_secs_f64(f).ok())
                .unwrap_or_default(),
            Some(v) => parse_duration(&to_string(&v)).unwrap_or_default(),
            None => Duration::ZERO,
        }
    }

    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        match self.lookup(key) {
            Some(Value::Array(items)) => items.iter().map(to_string).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(v) => vec![to_string(&v)],
        }
    }

    /// Object entries with non-empty string values.
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(Value::Object(obj)) = self.lookup(key) {
            for (k, v) in obj.iter() {
                let s = to_string(v);
                if !s.is_empty() {
                    map.insert(k.clone(), s);
                }
            }
        }
        map
    }

    /// Calls `f` once per element of the list at `key`, each element wrapped
    /// in its own source. A missing list yields no calls.
    pub fn for_each<F>(&self, key: &str, mut f: F) -> Result<(), ConfigError>
    where
        F: FnMut(&ConfigSource) -> Result<(), ConfigError>,
    {
        let items = match get_tree(&self.data, key).or_else(|| get_tree(&self.defaults, key)) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => return Ok(()),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("expected a list, found {}", other),
                })
            }
        };
        for item in items {
            let sub = ConfigSource {
                env_prefix: None,
                data: item,
                defaults: Value::Object(Map::new()),
            };
            f(&sub)?;
        }
        Ok(())
    }
}

fn set_tree(root: &mut Value, key: &str, value: Value) {
    let mut walker = root;
    let mut segments = key.split('.').peekable();
    while let Some(seg) = segments.next() {
        if !walker.is_object() {
            *walker = Value::Object(Map::new());
        }
        let Value::Object(map) = walker else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        walker = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn get_tree<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |node, seg| node.get(seg))
}

fn to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parses `30`, `30s`, `1h30m`, `1.5m`, `250ms`. Whitespace is ignored.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = 0f64;
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }
    Some(Duration::from_nanos(total.round() as u64))
}
