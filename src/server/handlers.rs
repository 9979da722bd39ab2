//! Request handlers
//!
//! The asset handler coordinates one request: resolve through the fallback
//! chain, promote fresh files into the cache, attach cache and identity
//! headers, and hand the content to the transport.

use std::fs::Metadata;
use std::io::SeekFrom;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::ACCEPT_LANGUAGE, request::Parts, HeaderMap, HeaderName, HeaderValue, Method,
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::{debug, info, warn};

use super::transport;
use crate::cache::{base_name, CachedAsset, FileCache};
use crate::cache_control::CacheRuleMatcher;
use crate::config::ServerConfig;
use crate::error::{Result, ServeError};
use crate::models::AccessLog;
use crate::resolver::{normalize_request_path, AssetResolver, Content};
use crate::tasks::{spawn_request_id_generator, RequestIds, REQUEST_ID_QUEUE};
use crate::template::{env_lookup, TemplateEngine};

/// Response (and inbound) header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Prefix for identifiers minted by this server.
pub const REQUEST_ID_PREFIX: &str = "SV-";

/// Largest CSP report body that is read and logged.
pub const CSP_BODY_LIMIT: usize = 64 * 1024;

/// Template key lookup, the process environment by default.
pub type VarLookup = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Application state shared across all requests.
///
/// Everything but the cache and the identifier queue is read-only after
/// startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub cache: Arc<FileCache>,
    pub resolver: AssetResolver,
    pub rules: Arc<CacheRuleMatcher>,
    pub engine: Arc<TemplateEngine>,
    pub vars: VarLookup,
    pub request_ids: RequestIds,
}

impl AppState {
    /// Creates the state with an existing identifier queue.
    pub fn new(config: ServerConfig, request_ids: RequestIds) -> Self {
        let cache = Arc::new(FileCache::new());
        let resolver = AssetResolver::new(&config.root, &config.index, Arc::clone(&cache));
        Self {
            rules: Arc::new(config.cache.matcher()),
            engine: Arc::new(TemplateEngine::from_config(&config.template)),
            vars: Arc::new(env_lookup),
            config: Arc::new(config),
            cache,
            resolver,
            request_ids,
        }
    }

    /// Creates the state and spawns the identifier generator.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: ServerConfig) -> Self {
        Self::new(config, spawn_request_id_generator(REQUEST_ID_QUEUE))
    }

    /// Replaces the template key lookup.
    pub fn with_vars(mut self, vars: VarLookup) -> Self {
        self.vars = vars;
        self
    }

    // == Populate ==
    /// Reads a fresh file into memory, templates it when eligible and
    /// publishes it. A file that grew past the size bound since its stat is
    /// handed back rewound, with fresh metadata.
    pub async fn populate(
        &self,
        name: &str,
        mut file: File,
        metadata: &Metadata,
    ) -> Result<Populated> {
        let max_size = self.config.template.max_size;
        let mut buf = Vec::with_capacity(metadata.len() as usize);
        (&mut file)
            .take(max_size.saturating_add(1))
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ServeError::from_io(name, e))?;
        if buf.len() as u64 > max_size {
            return rewind(name, file).await;
        }

        if self.config.template.is_eligible(name) {
            debug!("Replacing templates in file {}", name);
            let vars = &self.vars;
            buf = self.engine.render(&buf, |key| vars(key));
        }
        Ok(Populated::Cached(self.cache.store(name, buf, metadata).await))
    }

    /// Inbound identifier if present, otherwise a freshly generated one.
    async fn request_id(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        if let Some(value) = headers.get(REQUEST_ID_HEADER).filter(|v| !v.is_empty()) {
            return Some(value.clone());
        }
        let id = self.request_ids.next().await?;
        HeaderValue::from_str(&format!("{}{}", REQUEST_ID_PREFIX, id)).ok()
    }
}

/// Outcome of [`AppState::populate`].
#[derive(Debug)]
pub enum Populated {
    Cached(Arc<CachedAsset>),
    /// Too large to buffer, stream instead
    TooLarge { file: File, metadata: Metadata },
}

async fn rewind(name: &str, mut file: File) -> Result<Populated> {
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|e| ServeError::from_io(name, e))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ServeError::from_io(name, e))?;
    Ok(Populated::TooLarge { file, metadata })
}

/// Fallback handler serving every asset request.
pub async fn asset_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Utc::now();
    let (parts, body) = request.into_parts();
    let mut access = AccessLog::start(&parts, start);

    let response = match route(&state, parts, body, start).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    access.finish(response.status().as_u16(), response.headers());
    info!(target: "spa_server::access", "{}", access.to_json());
    response
}

async fn route(
    state: &AppState,
    parts: Parts,
    body: Body,
    start: DateTime<Utc>,
) -> Result<Response> {
    let csp_log = &state.config.csp_log;
    let method = parts.method.clone();
    match method {
        Method::POST if !csp_log.is_empty() && parts.uri.path() == csp_log.as_str() => {
            Ok(csp_report(body).await)
        }
        Method::GET | Method::HEAD => serve_asset(state, parts, start).await,
        _ => Err(ServeError::MethodNotAllowed(method.to_string())),
    }
}

/// Logs a CSP violation report body.
async fn csp_report(body: Body) -> Response {
    match axum::body::to_bytes(body, CSP_BODY_LIMIT).await {
        Ok(report) => info!(target: "spa_server::csp", "{}", String::from_utf8_lossy(&report)),
        Err(e) => warn!("Reading CSP report failed: {}", e),
    }
    StatusCode::OK.into_response()
}

// == Serve Asset ==
async fn serve_asset(state: &AppState, parts: Parts, start: DateTime<Utc>) -> Result<Response> {
    let raw = parts.uri.path();
    let base = state.config.base.as_str();
    let stripped = match raw.strip_prefix(base) {
        Some(rest) => rest,
        None => return Err(ServeError::NotFound(raw.to_string())),
    };
    let path =
        normalize_request_path(stripped).ok_or_else(|| ServeError::NotFound(raw.to_string()))?;

    let accept_language = parts
        .headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    let resolution = state
        .resolver
        .resolve(&path, accept_language)
        .await
        .map_err(|e| e.for_request(raw))?;
    let name = resolution.name;

    let mut response = send_content(state, &parts, &name, resolution.content)
        .await
        .map_err(|e| e.for_request(raw))?;

    let request_id = state.request_id(&parts.headers).await;
    write_headers(state, response.headers_mut(), &name, start, request_id);
    Ok(response)
}

/// Sends resolved content. Fresh files within the size bound are cached
/// first; larger ones are streamed from the handle opened by the resolver.
async fn send_content(
    state: &AppState,
    parts: &Parts,
    name: &str,
    content: Content,
) -> Result<Response> {
    let (file, metadata) = match content {
        Content::Cached(asset) => return Ok(send_cached(parts, &asset)),
        Content::Fresh { file, metadata } => (file, metadata),
    };

    let max_size = state.config.template.max_size;
    let (file, metadata) = if metadata.len() > max_size {
        warn!(
            "Caching file {} failed: {} bytes exceeds limit of {} bytes",
            name,
            metadata.len(),
            max_size
        );
        (file, metadata)
    } else {
        match state.populate(name, file, &metadata).await? {
            Populated::Cached(asset) => return Ok(send_cached(parts, &asset)),
            Populated::TooLarge { file, metadata } => {
                warn!("Caching file {} failed: file grew past {} bytes", name, max_size);
                (file, metadata)
            }
        }
    };

    transport::serve_file(&parts.method, &parts.headers, name, file, &metadata)
        .await
        .map_err(|e| ServeError::from_io(name, e))
}

fn send_cached(parts: &Parts, asset: &CachedAsset) -> Response {
    transport::serve_content(
        &parts.method,
        &parts.headers,
        asset.name(),
        asset.modified(),
        asset.content(),
    )
}

/// Adds cache policy, request identifier and configured custom headers.
fn write_headers(
    state: &AppState,
    headers: &mut HeaderMap,
    name: &str,
    start: DateTime<Utc>,
    request_id: Option<HeaderValue>,
) {
    state.rules.policy(base_name(name), start).apply(headers);

    if let Some(id) = request_id {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), id);
    }

    for (name, value) in &state.config.headers {
        headers.append(name.clone(), value.clone());
    }
}
