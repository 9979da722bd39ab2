//! Access log record
//!
//! One JSON line per request, written through `tracing` at info level.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, REFERER, USER_AGENT},
        request::Parts,
        HeaderMap,
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::REQUEST_ID_HEADER;

/// Access log entry, field names follow the nginx JSON log convention.
#[derive(Debug, Clone, Serialize)]
pub struct AccessLog {
    pub time: DateTime<Utc>,
    pub remote_addr: String,
    pub host: String,
    pub request: String,
    pub request_method: String,
    pub referrer: String,
    pub user_agent: String,
    pub status: u16,
    pub body_bytes_sent: u64,
    pub content_type: String,
    pub request_id: String,
    /// Seconds with microsecond precision
    pub request_time: f64,
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

impl AccessLog {
    /// Captures the request side of the entry.
    pub fn start(parts: &Parts, start: DateTime<Utc>) -> Self {
        let headers = &parts.headers;
        let mut remote_addr = header_str(headers, "x-real-ip");
        if remote_addr.is_empty() {
            remote_addr = header_str(headers, "x-forwarded-for");
        }
        if remote_addr.is_empty() {
            remote_addr = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_default();
        }

        Self {
            time: start,
            remote_addr,
            host: header_str(headers, HOST.as_str()),
            request: format!("{} {} {:?}", parts.method, parts.uri.path(), parts.version),
            request_method: parts.method.to_string(),
            referrer: header_str(headers, REFERER.as_str()),
            user_agent: header_str(headers, USER_AGENT.as_str()),
            status: 0,
            body_bytes_sent: 0,
            content_type: String::new(),
            request_id: String::new(),
            request_time: 0.0,
        }
    }

    /// Fills in the response side of the entry.
    pub fn finish(&mut self, status: u16, headers: &HeaderMap) {
        self.status = status;
        self.body_bytes_sent = header_str(headers, CONTENT_LENGTH.as_str())
            .parse()
            .unwrap_or(0);
        self.content_type = header_str(headers, CONTENT_TYPE.as_str());
        self.request_id = header_str(headers, REQUEST_ID_HEADER);
        let elapsed = Utc::now().signed_duration_since(self.time);
        self.request_time = elapsed.num_microseconds().unwrap_or(0).max(0) as f64 / 1e6;
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
