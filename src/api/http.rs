//! HTTP API Server
//!
//! S3-style object API: `PUT`, `GET` and `DELETE` on `/{bucket}/{key...}`.
//! Every other method is rejected with 405 whatever the path.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures::TryStreamExt;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::storage::{ObjectRef, ObjectRefError, ObjectStore, PathError};

/// Shared application state
pub struct AppState {
    /// Store rooted at the configured storage directory
    pub store: ObjectStore,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, store: ObjectStore) -> Self {
        let state = Arc::new(AppState { store });
        Self { config, state }
    }

    /// Build the router serving this server's state
    pub fn router(&self) -> Router {
        Self::create_router(Arc::clone(&self.state))
    }

    /// Create the router
    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            // Routing is by method only; the path is parsed by the handlers
            .route("/", any(handle_root))
            .route("/*path", any(handle_path))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    // Uploads are streamed to disk, not buffered
                    .layer(DefaultBodyLimit::disable()),
            )
            .with_state(state)
    }

    /// Start the HTTP server, stopping on Ctrl-C
    pub async fn start(&self) -> Result<()> {
        self.start_with_shutdown(shutdown_signal()).await
    }

    /// Start the HTTP server, stopping once `signal` resolves
    pub async fn start_with_shutdown<F>(&self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        info!(
            "HTTP API listening on {}, storing at {}",
            self.config.bind_address,
            self.state.store.root().display()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        info!("HTTP API stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

// ============ Errors ============

/// Request failures, each mapped to one status code and a short text body
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(#[from] ObjectRefError),

    #[error("Invalid path")]
    InvalidPath,

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidPath => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

// ============ Handlers ============

async fn handle_root(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Body,
) -> std::result::Result<Response, ApiError> {
    dispatch(&state, method, "/", body).await
}

async fn handle_path(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    body: Body,
) -> std::result::Result<Response, ApiError> {
    // The capture drops the leading '/'; put it back so parsing strips exactly one
    let path = format!("/{}", path);
    dispatch(&state, method, &path, body).await
}

async fn dispatch(
    state: &AppState,
    method: Method,
    path: &str,
    body: Body,
) -> std::result::Result<Response, ApiError> {
    match method {
        Method::PUT => put_object(state, path, body).await,
        Method::GET => get_object(state, path).await,
        Method::DELETE => delete_object(state, path).await,
        _ => Err(ApiError::MethodNotAllowed),
    }
}

/// Parse the request path and resolve it under the storage root
fn resolve_target(
    state: &AppState,
    method: &Method,
    path: &str,
) -> std::result::Result<(ObjectRef, PathBuf), ApiError> {
    let object = ObjectRef::parse(path)?;
    debug!(
        "{} request received for bucket={}, key={}",
        method, object.bucket, object.key
    );

    match state.store.resolve(&object) {
        Ok(target) => Ok((object, target)),
        Err(e @ PathError::Traversal { .. }) => {
            warn!("Rejected {} request: {}", method, e);
            Err(ApiError::InvalidPath)
        }
        Err(e @ PathError::Resolution { .. }) => {
            error!("Storage root unusable: {}", e);
            Err(ApiError::Internal)
        }
    }
}

/// PUT /bucket/key → store the request body
async fn put_object(
    state: &AppState,
    path: &str,
    body: Body,
) -> std::result::Result<Response, ApiError> {
    let (object, target) = resolve_target(state, &Method::PUT, path)?;

    let data = body.into_data_stream().map_err(io::Error::other);
    match state.store.put(&target, data).await {
        Ok(written) => {
            debug!("Stored {} ({} bytes)", object, written);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => {
            error!("PutObject {}: {}", object, e);
            Err(ApiError::Internal)
        }
    }
}

/// GET /bucket/key → stream the object back
async fn get_object(state: &AppState, path: &str) -> std::result::Result<Response, ApiError> {
    let (object, target) = resolve_target(state, &Method::GET, path)?;

    let stream = match state.store.get(&target).await {
        Ok(stream) => stream,
        Err(e) if e.is_not_found() => return Err(ApiError::NotFound),
        Err(e) => {
            error!("GetObject {}: {}", object, e);
            return Err(ApiError::Internal);
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", object.file_name());
    let disposition = HeaderValue::from_str(&disposition).map_err(|_| {
        warn!("Rejected GET request: key {:?} is not a valid file name", object.key);
        ApiError::InvalidPath
    })?;

    // Headers are committed before the body; a failure from here on can only be logged
    let name = object.to_string();
    let stream = stream.inspect_err(move |e| error!("Error streaming {}: {}", name, e));

    debug!("Serving {}", object);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// DELETE /bucket/key → remove the object; missing objects are not an error
async fn delete_object(state: &AppState, path: &str) -> std::result::Result<Response, ApiError> {
    let (object, target) = resolve_target(state, &Method::DELETE, path)?;

    match state.store.delete(&target).await {
        Ok(true) => debug!("Deleted {}", object),
        Ok(false) => debug!("Delete of missing object {}", object),
        Err(e) => {
            error!("DeleteObject {}: {}", object, e);
            return Err(ApiError::Internal);
        }
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Request};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    async fn test_server() -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("storage")).await.unwrap();
        let server = HttpServer::new(ApiConfig::default(), store);
        (dir, server.router())
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Body,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, app) = test_server().await;

        for payload in [Vec::new(), vec![0x42u8]] {
            let (status, _, body) = send(&app, "PUT", "/bucket/obj", Body::from(payload.clone())).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
            assert!(body.is_empty());

            let (status, headers, body) = send(&app, "GET", "/bucket/obj", Body::empty()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
            assert_eq!(body.as_ref(), payload.as_slice());
        }
    }

    #[tokio::test]
    async fn test_put_then_get_large_streamed_payload() {
        let (_dir, app) = test_server().await;

        let payload: Vec<u8> = (0..6 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
        let chunks: Vec<std::result::Result<Bytes, io::Error>> = payload
            .chunks(64 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let (status, _, _) = send(
            &app,
            "PUT",
            "/big/blob.bin",
            Body::from_stream(futures::stream::iter(chunks)),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, body) = send(&app, "GET", "/big/blob.bin", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), payload.len());
        assert!(body.as_ref() == payload.as_slice());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, app) = test_server().await;

        send(&app, "PUT", "/b/k", Body::from("first version")).await;
        let (status, _, _) = send(&app, "PUT", "/b/k", Body::from("v2")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, _, body) = send(&app, "GET", "/b/k", Body::empty()).await;
        assert_eq!(body.as_ref(), b"v2");
    }

    #[tokio::test]
    async fn test_content_disposition_uses_key_basename() {
        let (_dir, app) = test_server().await;

        send(&app, "PUT", "/docs/reports/2024/q1.pdf", Body::from("pdf")).await;
        let (_, headers, _) = send(&app, "GET", "/docs/reports/2024/q1.pdf", Body::empty()).await;
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"q1.pdf\""
        );
    }

    #[tokio::test]
    async fn test_nested_key_creates_directories() {
        let (dir, app) = test_server().await;

        let (status, _, _) = send(&app, "PUT", "/bucket/a/b/c.txt", Body::from("nested")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(dir.path().join("storage/bucket/a/b").is_dir());
        assert_eq!(
            std::fs::read(dir.path().join("storage/bucket/a/b/c.txt")).unwrap(),
            b"nested"
        );

        let (status, _, body) = send(&app, "GET", "/bucket/a/b/c.txt", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), b"nested");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let (_dir, app) = test_server().await;

        let (status, _, body) = send(&app, "GET", "/bucket/nope", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.as_ref(), b"Not Found");
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let (dir, app) = test_server().await;

        send(&app, "PUT", "/bucket/dir/obj", Body::from("bytes")).await;
        let (status, _, body) = send(&app, "DELETE", "/bucket/dir/obj", Body::empty()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, _, _) = send(&app, "GET", "/bucket/dir/obj", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Empty directories stay behind
        assert!(dir.path().join("storage/bucket/dir").is_dir());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, app) = test_server().await;

        let (status, _, _) = send(&app, "DELETE", "/bucket/never-created", Body::empty()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, "DELETE", "/other/a/b/c", Body::empty()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_missing_bucket_or_key() {
        let (_dir, app) = test_server().await;

        for method in ["PUT", "GET", "DELETE"] {
            let (status, _, body) = send(&app, method, "/", Body::empty()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} /", method);
            assert_eq!(body.as_ref(), b"Bad Request: missing bucket");

            for uri in ["/bucket", "/bucket/"] {
                let (status, _, body) = send(&app, method, uri, Body::empty()).await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
                assert_eq!(body.as_ref(), b"Bad Request: missing key");
            }
        }
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (_dir, app) = test_server().await;

        for (method, uri) in [("POST", "/bucket/key"), ("PATCH", "/bucket/key"), ("HEAD", "/bucket/key"), ("POST", "/")] {
            let (status, _, _) = send(&app, method, uri, Body::empty()).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (dir, app) = test_server().await;

        for uri in ["/b/../../escape.txt", "/b/%2e%2e/%2e%2e/escape.txt", "/../outside"] {
            let (status, _, body) = send(&app, "PUT", uri, Body::from("evil")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "PUT {}", uri);
            assert_eq!(body.as_ref(), b"Invalid path");

            let (status, _, _) = send(&app, "GET", uri, Body::empty()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "GET {}", uri);

            let (status, _, _) = send(&app, "DELETE", uri, Body::empty()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "DELETE {}", uri);
        }

        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_put_onto_directory_is_internal_error() {
        let (_dir, app) = test_server().await;

        send(&app, "PUT", "/bucket/folder/inner", Body::from("x")).await;
        let (status, _, body) = send(&app, "PUT", "/bucket/folder", Body::from("y")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.as_ref(), b"Internal Server Error");

        // A directory is not an object
        let (status, _, _) = send(&app, "GET", "/bucket/folder", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_double_leading_slash_is_missing_bucket() {
        let (dir, app) = test_server().await;

        for method in ["PUT", "GET", "DELETE"] {
            let (status, _, body) = send(&app, method, "//bucket/key", Body::from("x")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} //bucket/key", method);
            assert_eq!(body.as_ref(), b"Bad Request: missing bucket");
        }

        assert!(!dir.path().join("storage/bucket/key").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_is_internal_error() {
        let (dir, app) = test_server().await;

        send(&app, "PUT", "/bucket/folder/inner", Body::from("x")).await;
        let (status, _, body) = send(&app, "DELETE", "/bucket/folder", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.as_ref(), b"Internal Server Error");
        assert!(dir.path().join("storage/bucket/folder/inner").is_file());
    }

    #[tokio::test]
    async fn test_get_missing_object_with_control_character() {
        let (_dir, app) = test_server().await;

        let (status, _, _) = send(&app, "GET", "/bucket/bad%01name", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_existing_object_with_control_character() {
        let (_dir, app) = test_server().await;

        let (status, _, _) = send(&app, "PUT", "/bucket/bad%01name", Body::from("x")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, body) = send(&app, "GET", "/bucket/bad%01name", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.as_ref(), b"Invalid path");
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::from(ObjectRefError::MissingKey).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::InvalidPath.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
