//! HTTP surface served alongside the cluster/websocket transports:
//! Prometheus `/metrics`, plus the large-file upload/download endpoints
//! `POST /file/u` and `GET /file/s/:id` spec.md §6's media contract
//! describes.
//!
//! Grounded in the teacher's metrics-only `axum` router, generalized the
//! way `original_source/server/hdl_files.go` splits upload/download into
//! two handlers sharing one auth check, narrowed here to local-disk
//! storage (the storage backend itself is a Non-goal).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use tracing::{error, info, warn};
use wire_proto::Uid;

use crate::db::Database;
use crate::session::auth::{AuthHandler, TokenAuth};

const UPLOAD_DIR: &str = "uploads";

#[derive(Clone)]
struct HttpState {
    db: Database,
    token_auth: Arc<TokenAuth>,
    max_file_upload_size: u64,
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Runs the HTTP server exposing `/metrics` plus the file transfer routes.
/// Long-running; intended to be spawned in the background.
pub async fn run_http_server(port: u16, db: Database, token_auth: Arc<TokenAuth>, max_file_upload_size: u64) {
    let state = HttpState { db, token_auth, max_file_upload_size };
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/file/u", post(upload_handler))
        .route("/file/s/:id", get(download_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server stopped");
    }
}

/// Extracts the bearer credential the way `authHttpRequest` does: header
/// first, then query, then form, then cookie — the first one present wins,
/// regardless of whether it later fails to authenticate.
fn extract_token(headers: &HeaderMap, query: &str, form_token: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let trimmed = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("Basic ")).unwrap_or(value);
        return Some(trimmed.to_string());
    }
    for pair in query.split('&') {
        if let Some(v) = pair.strip_prefix("auth=").or_else(|| pair.strip_prefix("secret=")) {
            return Some(v.to_string());
        }
    }
    if let Some(tok) = form_token {
        return Some(tok.to_string());
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookie.split(';') {
            let pair = pair.trim();
            if let Some(v) = pair.strip_prefix("auth-token=") {
                return Some(v.to_string());
            }
        }
    }
    None
}

async fn authenticate(token_auth: &TokenAuth, headers: &HeaderMap, query: &str, form_token: Option<&str>) -> Result<Uid, StatusCode> {
    let token = extract_token(headers, query, form_token).ok_or(StatusCode::UNAUTHORIZED)?;
    token_auth.authenticate(token.as_bytes()).await.map_err(|_| StatusCode::UNAUTHORIZED)
}

fn encode_fid(id: i64) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(id.to_be_bytes())
}

fn decode_fid(s: &str) -> Option<i64> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s).ok()?;
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(arr))
}

async fn upload_handler(State(state): State<HttpState>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let uid = match authenticate(&state.token_auth, &headers, "", None).await {
        Ok(uid) => uid,
        Err(code) => return code.into_response(),
    };

    let mut field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return (StatusCode::BAD_REQUEST, "missing file field").into_response(),
        Err(e) => {
            warn!(error = %e, "multipart read failed");
            return (StatusCode::BAD_REQUEST, "malformed multipart body").into_response();
        }
    };

    let declared_mime = field.content_type().map(str::to_string);
    let data = match field.bytes().await {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "failed to read upload body");
            return (StatusCode::BAD_REQUEST, "failed to read upload body").into_response();
        }
    };

    if data.len() as u64 > state.max_file_upload_size {
        return (StatusCode::PAYLOAD_TOO_LARGE, "file too large").into_response();
    }

    if let Err(e) = tokio::fs::create_dir_all(UPLOAD_DIR).await {
        error!(error = %e, "failed to create upload directory");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mime_type = declared_mime.unwrap_or_else(|| "application/octet-stream".to_string());
    let location = format!("{}/{}", UPLOAD_DIR, uuid::Uuid::new_v4());
    if let Err(e) = tokio::fs::write(&location, &data).await {
        error!(error = %e, "failed to write uploaded file");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let record = match state.db.files().create(uid, &mime_type, data.len() as u64, &location).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "failed to record uploaded file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let url = format!("/file/s/{}", encode_fid(record.id));
    axum::Json(serde_json::json!({ "ctrl": { "code": 200, "text": "ok", "params": { "url": url } } })).into_response()
}

async fn download_handler(State(state): State<HttpState>, AxumPath(id): AxumPath<String>, headers: HeaderMap) -> Response {
    if authenticate(&state.token_auth, &headers, "", None).await.is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(fid) = decode_fid(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let record = match state.db.files().get(fid).await {
        Ok(Some(record)) => record,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, "failed to look up file record");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if record.location.starts_with("http://") || record.location.starts_with("https://") {
        return Redirect::temporary(&record.location).into_response();
    }

    match tokio::fs::read(PathBuf::from(&record.location)).await {
        Ok(bytes) => {
            let mut response = bytes.into_response();
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, record.mime_type.parse().unwrap_or_else(|_| "application/octet-stream".parse().unwrap()));
            response.headers_mut().insert(axum::http::header::CONTENT_DISPOSITION, "attachment".parse().unwrap());
            response
        }
        Err(e) => {
            warn!(error = %e, location = %record.location, "stored file missing from disk");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
