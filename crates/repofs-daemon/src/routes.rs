// routes.rs — HTTP binding for MirrorService.
//
// GET/PUT/DELETE on /{org}/{repo} and /{org}/{repo}/{*path}. The service is
// synchronous (git subprocesses, file I/O, a blocking tenant lock), so every
// call runs on the blocking pool.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::task::JoinError;
use tokio_stream::Stream;
use tower_http::trace::TraceLayer;

use repofs_mirror::{ErrorKind, MirrorError, MirrorService};
use repofs_workspace::{Content, FileHandle};

const CHUNK_SIZE: usize = 64 * 1024;
const NOT_FOUND_BODY: &str = "404 page not found\n";

type AppState = Arc<MirrorService>;

/// Route parameters. `path` is absent on the tenant root routes.
#[derive(Debug, Deserialize)]
struct Target {
    org: String,
    repo: String,
    #[serde(default)]
    path: String,
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/{org}/{repo}", get(read).put(write).delete(delete))
        .route("/{org}/{repo}/", get(read).put(write).delete(delete))
        .route("/{org}/{repo}/{*path}", get(read).put(write).delete(delete))
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Failure of a request, rendered as a plain-text response.
#[derive(Debug)]
enum ApiError {
    Mirror(MirrorError),
    Task(JoinError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PathViolation => StatusCode::BAD_REQUEST,
        ErrorKind::Diverged => StatusCode::CONFLICT,
        ErrorKind::SyncFailure | ErrorKind::IoFailure | ErrorKind::PropagationFailure => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Mirror(err) => {
                let status = status_for(err.kind());
                if status == StatusCode::NOT_FOUND {
                    return not_found_response();
                }
                if status.is_server_error() {
                    tracing::warn!("{:?}: {}", err.kind(), err);
                } else {
                    tracing::debug!("{:?}: {}", err.kind(), err);
                }
                (status, err.to_string()).into_response()
            }
            ApiError::Task(err) => {
                tracing::error!("request task failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("request task failed: {}", err),
                )
                    .into_response()
            }
        }
    }
}

/// Run a service call on the blocking pool.
async fn blocking<T, F>(service: AppState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&MirrorService) -> Result<T, MirrorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(ApiError::Task)?
        .map_err(ApiError::Mirror)
}

async fn read(
    State(service): State<AppState>,
    Path(target): Path<Target>,
) -> Result<Response, ApiError> {
    let content = blocking(service, move |s| {
        s.read(&target.org, &target.repo, &target.path)
    })
    .await?;

    Ok(match content {
        Content::File(handle) => file_response(handle),
        Content::Listing(entries) => Json(entries).into_response(),
    })
}

async fn write(
    State(service): State<AppState>,
    Path(target): Path<Target>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    blocking(service, move |s| {
        s.write(&target.org, &target.repo, &target.path, &body[..])
    })
    .await?;
    Ok(StatusCode::OK)
}

async fn delete(
    State(service): State<AppState>,
    Path(target): Path<Target>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    blocking(service, move |s| {
        s.delete(&target.org, &target.repo, &target.path, &body)
    })
    .await?;
    Ok(StatusCode::OK)
}

async fn not_found() -> Response {
    not_found_response()
}

fn not_found_response() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

fn file_response(handle: FileHandle) -> Response {
    let len = handle.len();
    let file = tokio::fs::File::from_std(handle.into_file());
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(chunks(file)),
    )
        .into_response()
}

/// Read `file` in fixed-size chunks. The file closes when the stream is
/// dropped, whether it ran to the end or the client went away.
fn chunks(mut file: tokio::fs::File) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    async_stream::try_stream! {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield buf[..n].to_vec();
        }
    }
}
