//! Server Routes
//!
//! Every path is an asset path, so the router has a single fallback.

use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{asset_handler, AppState};

/// Creates the router serving all requests through [`asset_handler`].
///
/// # Middleware
/// - Tracing: request spans at debug level for `tower_http`
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(asset_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app(root: &std::path::Path) -> Router {
        let config = ServerConfig {
            root: root.to_path_buf(),
            ..ServerConfig::default()
        };
        create_router(AppState::from_config(config))
    }

    #[tokio::test]
    async fn test_any_path_reaches_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "app").unwrap();
        let app = create_test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/some/deep/route")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_test_app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
