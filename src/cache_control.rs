//! Cache-Control Rules
//!
//! Maps a served file's base name to the `Cache-Control`/`Expires` policy
//! configured for it.

use std::time::{Duration, SystemTime};

use axum::http::{
    header::{CACHE_CONTROL, EXPIRES, PRAGMA},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

use crate::config::ConfigSource;
use crate::error::ConfigError;

/// `Cache-Control` value sent for `nocache` rules.
pub const NO_CACHE_CONTROL: &str = "max-age=0, no-cache, no-store, must-revalidate";

// == Cache Rule ==
/// A single cache policy entry.
#[derive(Debug, Clone, Default)]
pub struct CacheRule {
    /// Exact base filename this rule applies to
    pub filename: Option<String>,
    /// Pattern matched against the base filename
    pub regexp: Option<Regex>,
    /// Emit no cache headers at all
    pub ignore: bool,
    /// Emit already-expired no-cache headers
    pub no_cache: bool,
    /// Offset added to the request start time for `Expires`
    pub expires: Duration,
    /// Verbatim `Cache-Control` value
    pub control: String,
}

impl CacheRule {
    /// Reads one entry of the `cache.rules` list.
    ///
    /// Keys: `filename`, `regexp`, `ignore`, `nocache`, `expires`, `control`.
    pub fn from_config(source: &ConfigSource) -> Result<Self, ConfigError> {
        let filename = Some(source.get_string("filename")).filter(|s| !s.is_empty());
        let regexp = match source.get_string("regexp") {
            s if s.is_empty() => None,
            s => Some(Regex::new(&s).map_err(|e| ConfigError::InvalidRegex {
                key: "cache.rules.regexp".to_string(),
                source: e,
            })?),
        };
        let control = source.get_string("control");
        check_control(&control)?;

        Ok(Self {
            filename,
            regexp,
            ignore: source.get_bool("ignore"),
            no_cache: source.get_bool("nocache"),
            expires: source.get_duration("expires"),
            control,
        })
    }
}

/// Rejects control strings that cannot be sent as a header value.
pub fn check_control(control: &str) -> Result<(), ConfigError> {
    HeaderValue::from_str(control)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidValue {
            key: "cache.control".to_string(),
            reason: format!("'{}' is not a valid header value", control),
        })
}

// == Cache Policy ==
/// Headers chosen for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy<'a> {
    /// No cache headers
    Ignore,
    /// Already expired, never store
    NoCache { expires: DateTime<Utc> },
    /// Configured control string with expiry
    Control {
        control: &'a str,
        expires: DateTime<Utc>,
    },
}

impl CachePolicy<'_> {
    /// Writes the policy headers into `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        match self {
            CachePolicy::Ignore => {}
            CachePolicy::NoCache { expires } => {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL));
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                insert_date(headers, *expires);
            }
            CachePolicy::Control { control, expires } => {
                if let Ok(value) = HeaderValue::from_str(control) {
                    headers.insert(CACHE_CONTROL, value);
                }
                insert_date(headers, *expires);
            }
        }
    }
}

fn insert_date(headers: &mut HeaderMap, when: DateTime<Utc>) {
    let formatted = httpdate::fmt_http_date(SystemTime::from(when));
    if let Ok(value) = HeaderValue::from_str(&formatted) {
        headers.insert(EXPIRES, value);
    }
}

/// Last instant an HTTP date can express, 9999-12-31T23:59:59Z.
fn latest_http_date() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// == Cache Rule Matcher ==
/// Ordered rule list plus the default rule synthesized from global settings.
#[derive(Debug, Clone)]
pub struct CacheRuleMatcher {
    enabled: bool,
    default_rule: CacheRule,
    rules: Vec<CacheRule>,
}

impl CacheRuleMatcher {
    /// When `enabled` is false every file gets the ignore policy.
    pub fn new(enabled: bool, expires: Duration, control: &str, rules: Vec<CacheRule>) -> Self {
        Self {
            enabled,
            default_rule: CacheRule {
                ignore: !enabled,
                expires,
                control: control.to_string(),
                ..CacheRule::default()
            },
            rules,
        }
    }

    /// Exact filename rules win over regexp rules, both in list order.
    pub fn find(&self, name: &str) -> &CacheRule {
        if !self.enabled {
            return &self.default_rule;
        }
        self.rules
            .iter()
            .find(|r| r.filename.as_deref() == Some(name))
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|r| r.regexp.as_ref().is_some_and(|re| re.is_match(name)))
            })
            .unwrap_or(&self.default_rule)
    }

    /// Resolves the header policy for `name` relative to the request start.
    pub fn policy(&self, name: &str, start: DateTime<Utc>) -> CachePolicy<'_> {
        let rule = self.find(name);
        if rule.ignore {
            CachePolicy::Ignore
        } else if rule.no_cache {
            CachePolicy::NoCache { expires: start }
        } else {
            let latest = latest_http_date();
            let expires = TimeDelta::from_std(rule.expires)
                .ok()
                .and_then(|offset| start.checked_add_signed(offset))
                .map_or(latest, |expires| expires.min(latest));
            CachePolicy::Control {
                control: &rule.control,
                expires,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(filename: Option<&str>, regexp: Option<&str>, control: &str) -> CacheRule {
        CacheRule {
            filename: filename.map(String::from),
            regexp: regexp.map(|r| Regex::new(r).unwrap()),
            control: control.to_string(),
            expires: Duration::from_secs(60),
            ..CacheRule::default()
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_default_rule_applies() {
        let matcher = CacheRuleMatcher::new(true, Duration::from_secs(30), "public", vec![]);
        let policy = matcher.policy("app.js", start());
        assert_eq!(
            policy,
            CachePolicy::Control {
                control: "public",
                expires: start() + TimeDelta::seconds(30),
            }
        );
    }

    #[test]
    fn test_exact_filename_beats_earlier_regexp() {
        let matcher = CacheRuleMatcher::new(
            true,
            Duration::from_secs(30),
            "public",
            vec![
                rule(None, Some(r"\.css$"), "regexp"),
                rule(Some("style.css"), None, "exact"),
            ],
        );
        assert_eq!(matcher.find("style.css").control, "exact");
        assert_eq!(matcher.find("other.css").control, "regexp");
    }

    #[test]
    fn test_first_regexp_in_order_wins() {
        let matcher = CacheRuleMatcher::new(
            true,
            Duration::ZERO,
            "public",
            vec![
                rule(None, Some(r"^app"), "first"),
                rule(None, Some(r"\.js$"), "second"),
            ],
        );
        assert_eq!(matcher.find("app.js").control, "first");
        assert_eq!(matcher.find("vendor.js").control, "second");
    }

    #[test]
    fn test_no_cache_is_already_expired() {
        let mut no_cache = rule(Some("index.html"), None, "ignored");
        no_cache.no_cache = true;
        no_cache.expires = Duration::from_secs(86400);
        let matcher = CacheRuleMatcher::new(true, Duration::ZERO, "public", vec![no_cache]);

        let mut headers = HeaderMap::new();
        let policy = matcher.policy("index.html", start());
        assert_eq!(policy, CachePolicy::NoCache { expires: start() });
        policy.apply(&mut headers);

        assert_eq!(headers[CACHE_CONTROL], NO_CACHE_CONTROL);
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "Mon, 01 Jan 2024 12:00:00 GMT");
    }

    #[test]
    fn test_ignore_rule_emits_nothing() {
        let mut ignore = rule(Some("sw.js"), None, "public");
        ignore.ignore = true;
        let matcher = CacheRuleMatcher::new(true, Duration::ZERO, "public", vec![ignore]);

        let mut headers = HeaderMap::new();
        matcher.policy("sw.js", start()).apply(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_disabled_ignores_all_rules() {
        let matcher = CacheRuleMatcher::new(
            false,
            Duration::from_secs(30),
            "public",
            vec![rule(Some("style.css"), None, "no-cache")],
        );
        assert_eq!(matcher.policy("style.css", start()), CachePolicy::Ignore);
    }

    #[test]
    fn test_control_headers_written() {
        let matcher = CacheRuleMatcher::new(
            true,
            Duration::ZERO,
            "public",
            vec![rule(Some("style.css"), None, "no-cache")],
        );
        let mut headers = HeaderMap::new();
        matcher.policy("style.css", start()).apply(&mut headers);
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[EXPIRES], "Mon, 01 Jan 2024 12:01:00 GMT");
        assert!(headers.get(PRAGMA).is_none());
    }

    #[test]
    fn test_rule_from_config() {
        let mut source = ConfigSource::new();
        source
            .read_str(r#"{"regexp": "\\.woff2?$", "expires": "7h", "control": "public, immutable"}"#)
            .unwrap();
        let parsed = CacheRule::from_config(&source).unwrap();
        assert!(parsed.filename.is_none());
        assert!(parsed.regexp.unwrap().is_match("font.woff2"));
        assert_eq!(parsed.expires, Duration::from_secs(7 * 3600));
        assert_eq!(parsed.control, "public, immutable");
    }

    #[test]
    fn test_rule_from_config_bad_regexp() {
        let mut source = ConfigSource::new();
        source.read_str(r#"{"regexp": "(unclosed"}"#).unwrap();
        assert!(matches!(
            CacheRule::from_config(&source),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_far_future_expiry_is_clamped() {
        let mut source = ConfigSource::new();
        source
            .read_str(r#"{"filename": "app.js", "expires": 300000000000}"#)
            .unwrap();
        let parsed = CacheRule::from_config(&source).unwrap();
        let matcher = CacheRuleMatcher::new(true, Duration::MAX, "public", vec![parsed]);

        let mut headers = HeaderMap::new();
        matcher.policy("app.js", Utc::now()).apply(&mut headers);
        assert_eq!(headers[EXPIRES], "Fri, 31 Dec 9999 23:59:59 GMT");

        // default rule with an expiry beyond what TimeDelta holds
        let mut headers = HeaderMap::new();
        matcher.policy("other.js", Utc::now()).apply(&mut headers);
        assert_eq!(headers[EXPIRES], "Fri, 31 Dec 9999 23:59:59 GMT");
    }
}
