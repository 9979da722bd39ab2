//! Response transport
//!
//! Conditional GET and byte-range handling, for buffered assets and for
//! open files too large to buffer.

use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    http::{
        header::{
            ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, IF_MODIFIED_SINCE,
            IF_RANGE, LAST_MODIFIED, RANGE,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::Response,
};
use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

/// Byte range selected by a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range, send everything
    Full,
    /// Inclusive `[start, end]`
    Partial(u64, u64),
    /// Range starts past the end of the content
    Unsatisfiable,
}

/// Parses a single `bytes=` range against a body of `len` bytes.
///
/// Multi-range and malformed headers fall back to the full body.
pub fn parse_range(header: &str, len: u64) -> ByteRange {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        // "-500": last 500 bytes
        (true, false) => match end.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if len == 0 => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial(len.saturating_sub(suffix), len - 1),
            Err(_) => ByteRange::Full,
        },
        // "100-" or "100-199"
        (false, _) => {
            let Ok(first) = start.parse::<u64>() else {
                return ByteRange::Full;
            };
            if first >= len {
                return ByteRange::Unsatisfiable;
            }
            let last = if end.is_empty() {
                len - 1
            } else {
                match end.parse::<u64>() {
                    Ok(last) if last >= first => last.min(len - 1),
                    _ => return ByteRange::Full,
                }
            };
            ByteRange::Partial(first, last)
        }
        (true, true) => ByteRange::Full,
    }
}

/// Whole seconds, the resolution of HTTP dates.
fn truncate_secs(time: SystemTime) -> SystemTime {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn header_date(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
}

/// Content type derived from the file extension.
pub fn content_type(name: &str) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

/// Result of conditional and range negotiation.
enum Negotiated {
    /// Final bodiless response (304, 416)
    Done(Response),
    /// Headers set; the body is the inclusive range, or everything for `None`
    Send {
        response: Response,
        range: Option<(u64, u64)>,
    },
}

/// Applies `If-Modified-Since`, `Range` and `If-Range` to content of `len`
/// bytes and fills in the response headers.
fn negotiate(request_headers: &HeaderMap, name: &str, modified: SystemTime, len: u64) -> Negotiated {
    let modified = truncate_secs(modified);
    let has_modtime = modified > UNIX_EPOCH;

    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type(name)) {
        headers.insert(CONTENT_TYPE, value);
    }
    if has_modtime {
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            headers.insert(LAST_MODIFIED, value);
        }
    }

    if has_modtime {
        if let Some(since) = header_date(request_headers, IF_MODIFIED_SINCE) {
            if modified <= since {
                headers.remove(CONTENT_TYPE);
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                return Negotiated::Done(response);
            }
        }
    }

    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let mut range = request_headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range(v, len))
        .unwrap_or(ByteRange::Full);
    if let Some(if_range) = request_headers.get(IF_RANGE) {
        let current = if_range
            .to_str()
            .ok()
            .and_then(|v| httpdate::parse_http_date(v).ok())
            .is_some_and(|date| has_modtime && date == modified);
        if !current {
            range = ByteRange::Full;
        }
    }

    let range = match range {
        ByteRange::Full => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            None
        }
        ByteRange::Partial(first, last) => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", first, last, len)) {
                headers.insert(CONTENT_RANGE, value);
            }
            headers.insert(CONTENT_LENGTH, HeaderValue::from(last - first + 1));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            Some((first, last))
        }
        ByteRange::Unsatisfiable => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                headers.insert(CONTENT_RANGE, value);
            }
            headers.remove(CONTENT_TYPE);
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            return Negotiated::Done(response);
        }
    };
    Negotiated::Send { response, range }
}

// == Serve Content ==
/// Builds the response for a buffered asset.
///
/// Handles `If-Modified-Since` (304), `Range`/`If-Range` (206/416) and
/// `HEAD` (headers only). `body` is an independent view of the asset.
pub fn serve_content(
    method: &Method,
    request_headers: &HeaderMap,
    name: &str,
    modified: SystemTime,
    body: Bytes,
) -> Response {
    match negotiate(request_headers, name, modified, body.len() as u64) {
        Negotiated::Done(response) => response,
        Negotiated::Send {
            mut response,
            range,
        } => {
            if method != Method::HEAD {
                let payload = match range {
                    Some((first, last)) => body.slice(first as usize..=last as usize),
                    None => body,
                };
                *response.body_mut() = Body::from(payload);
            }
            response
        }
    }
}

// == Serve File ==
/// Streams an already opened file without buffering it.
///
/// Length and modification time come from `metadata`, the stat taken when
/// the file was opened, and at most that many bytes are sent.
pub async fn serve_file(
    method: &Method,
    request_headers: &HeaderMap,
    name: &str,
    mut file: File,
    metadata: &Metadata,
) -> io::Result<Response> {
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
    let len = metadata.len();
    match negotiate(request_headers, name, modified, len) {
        Negotiated::Done(response) => Ok(response),
        Negotiated::Send {
            mut response,
            range,
        } => {
            if method != Method::HEAD {
                let (first, count) = match range {
                    Some((first, last)) => (first, last - first + 1),
                    None => (0, len),
                };
                if first > 0 {
                    file.seek(SeekFrom::Start(first)).await?;
                }
                *response.body_mut() = Body::from_stream(ReaderStream::new(file.take(count)));
            }
            Ok(response)
        }
    }
}
