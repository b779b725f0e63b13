use axum::{
    Router,
    routing::{get, post},
    response::{IntoResponse, Response},
    http::{StatusCode, header},
    extract::{Path, Query, State, Multipart},
    body::Body,
    Json,
};
use crate::arrow_io::write_stream;
use crate::models::{
    CreateSessionResponse, LogTypesResponse, RecordsPage, RecordsQuery, TableMeta, TableQuery,
};
use crate::storage::{SessionStorage, StorageError, ingest_table};
use logparser::{LogEngine, ParseError, RawSource};
use std::sync::Arc;
use tracing::{info, debug, warn, error, instrument};

const ARROW_STREAM_CONTENT_TYPE: &str = "application/vnd.apache.arrow.stream";

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<SessionStorage>,
    pub engine: Arc<LogEngine>,
}

type ApiError = (StatusCode, String);

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/log-types", get(list_log_types))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", axum::routing::delete(delete_session))
        .route("/sessions/:id/meta", get(get_meta))
        .route("/sessions/:id/table.arrow", get(get_table_arrow))
        .route("/sessions/:id/records", get(get_records))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn list_log_types(State(state): State<AppState>) -> Json<LogTypesResponse> {
    let registry = state.engine.registry();
    Json(LogTypesResponse {
        default_log_type: registry.default_log_type().to_string(),
        log_types: registry.iter().cloned().collect(),
    })
}

fn storage_error(e: StorageError) -> ApiError {
    let status = match e {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Storage failure: {}", e);
    }
    (status, e.to_string())
}

#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Parse(ParseError::UnknownLogType(name)) => {
                (StatusCode::BAD_REQUEST, format!("Unknown log type: {}", name))
            }
            IngestError::Parse(e) => {
                error!("Engine configuration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            IngestError::Storage(e) => storage_error(e),
        }
    }
}

/// Parse and store on the calling (blocking) thread.
fn parse_and_store(
    engine: &LogEngine,
    storage: &SessionStorage,
    filename: &str,
    data: Vec<u8>,
    declared: Option<&str>,
) -> Result<CreateSessionResponse, IngestError> {
    let outcome = engine.parse(&RawSource::buffer(filename, data), declared)?;
    info!(
        "Parsed '{}' as {} ({:?}): {} records from {} lines",
        filename,
        outcome.log_type,
        outcome.detection,
        outcome.table.len(),
        outcome.raw_line_count
    );

    let session_id = storage.create_session()?;
    let meta = match ingest_table(storage, &session_id, filename, &outcome) {
        Ok(meta) => meta,
        Err(e) => {
            discard_partial_session(storage, &session_id);
            return Err(e.into());
        }
    };

    Ok(CreateSessionResponse {
        session_id,
        log_type: meta.log_type,
        detection: meta.detection,
        row_count: meta.row_count,
        raw_line_count: meta.raw_line_count,
        warnings: meta.warnings,
    })
}

/// Best effort: a failed removal is logged and the ingest error still wins.
fn discard_partial_session(storage: &SessionStorage, session_id: &str) {
    if let Err(e) = storage.delete_session(session_id) {
        warn!("Failed to remove partial session {}: {}", session_id, e);
    }
}

#[instrument(skip(state, multipart))]
async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    info!("Received file upload request");

    let mut file_data: Option<Vec<u8>> = None;
    let mut filename = String::new();
    let mut declared: Option<String> = None;

    while let Some(field) = multipart.next_field().await
        .map_err(|e| {
            error!("Multipart error: {}", e);
            (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
        })?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().unwrap_or("upload").to_string();
                info!("Receiving file: {}", filename);

                let data = field.bytes().await
                    .map_err(|e| {
                        error!("Failed to read file data: {}", e);
                        (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
                    })?;
                info!("File data received: {} bytes", data.len());
                file_data = Some(data.to_vec());
            }
            Some("log_type") => {
                let text = field.text().await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid log_type field: {}", e)))?;
                let text = text.trim();
                if !text.is_empty() {
                    debug!("Declared log type: {}", text);
                    declared = Some(text.to_string());
                }
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let Some(data) = file_data else {
        error!("No file provided in request");
        return Err((StatusCode::BAD_REQUEST, "No file provided".to_string()));
    };

    let engine = state.engine.clone();
    let storage = state.storage.clone();
    let response = tokio::task::spawn_blocking(move || {
        parse_and_store(&engine, &storage, &filename, data, declared.as_deref())
    })
    .await
    .map_err(|e| {
        error!("Ingest task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Ingest task failed: {}", e))
    })?
    .map_err(ApiError::from)?;

    info!("Created session: {}", response.session_id);
    Ok(Json(response))
}

async fn get_meta(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TableMeta>, ApiError> {
    let meta = state.storage.read_meta(&session_id).map_err(storage_error)?;
    Ok(Json(meta))
}

#[instrument(skip(state))]
async fn get_table_arrow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Response, ApiError> {
    info!("Fetching table for session: {}", session_id);

    let storage = state.storage.clone();
    let buffer = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, StorageError> {
        let batches = storage.read_batches(&session_id)?;
        debug!("Read {} batches for session {}", batches.len(), session_id);

        // an empty session still answers with a valid (empty) stream
        let schema = match batches.first() {
            Some(batch) => batch.schema(),
            None => Arc::new(arrow::datatypes::Schema::empty()),
        };
        Ok(write_stream(Vec::new(), &schema, batches, query.limit)?)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read task failed: {}", e)))?
    .map_err(storage_error)?;

    Ok((
        [(header::CONTENT_TYPE, ARROW_STREAM_CONTENT_TYPE)],
        Body::from(buffer),
    )
        .into_response())
}

async fn get_records(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsPage>, ApiError> {
    let (records, total) = state
        .storage
        .read_records(&session_id, query.offset, query.limit)
        .map_err(storage_error)?;

    Ok(Json(RecordsPage {
        offset: query.offset,
        total,
        records,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete_session(&session_id).map_err(storage_error)?;
    info!("Deleted session: {}", session_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            storage: Arc::new(SessionStorage::new(dir.path()).unwrap()),
            engine: Arc::new(LogEngine::builtin()),
        };
        (dir, state)
    }

    #[test]
    fn test_parse_and_store_declared_type() {
        let (_dir, state) = state();
        let data = b"Oct 11 22:14:15 mymachine sshd[4721]: Accepted password for alice\n".to_vec();
        let response =
            parse_and_store(&state.engine, &state.storage, "auth.log", data, Some("syslog")).unwrap();

        assert_eq!(response.log_type, "syslog");
        assert_eq!(response.row_count, 1);
        assert!(state.storage.read_meta(&response.session_id).is_ok());
    }

    #[test]
    fn test_unknown_log_type_is_bad_request() {
        let (_dir, state) = state();
        let err = parse_and_store(&state.engine, &state.storage, "a.log", Vec::new(), Some("nope"))
            .unwrap_err();
        let (status, _) = ApiError::from(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_discard_partial_session() {
        let (_dir, state) = state();
        let session_id = state.storage.create_session().unwrap();

        discard_partial_session(&state.storage, &session_id);
        assert!(matches!(
            state.storage.read_meta(&session_id),
            Err(StorageError::NotFound(_))
        ));

        // already gone: logged, not raised
        discard_partial_session(&state.storage, &session_id);
    }

    #[test]
    fn test_storage_error_status() {
        assert_eq!(
            storage_error(StorageError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            storage_error(StorageError::InvalidSessionId("x".into())).0,
            StatusCode::BAD_REQUEST
        );
    }
}
