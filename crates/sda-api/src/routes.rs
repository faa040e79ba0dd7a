//! Admin API routes and handlers (§4.4).
//!
//! Where the API and a worker would both write state, only the worker
//! writes it: every mutating handler here publishes a message and leaves
//! the state transition to whichever worker consumes it.

use std::time::Duration;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sda_core::{traits::HealthCheck, types::{AccessionCheck, FileEventType}};

use crate::{
    error::ApiError,
    middleware::{require_admin, require_token, AuthedUser},
    AppState,
};

/// Build the full router: `/ready` is open, `/files` requires only a valid
/// token, everything else requires the caller to be an admin (§4.4).
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/file/ingest", post(file_ingest))
        .route("/file/accession", post(file_accession))
        .route("/dataset/create", post(dataset_create))
        .route("/dataset/release/*dataset", post(dataset_release))
        .route("/users", get(list_users))
        .route("/users/:username/files", get(user_files))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let user_routes = Router::new()
        .route("/files", get(my_files))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/ready", get(ready))
        .merge(admin_routes)
        .merge(user_routes)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct UserFileView {
    file_id: String,
    inbox_path: String,
    status: FileEventType,
}

/// `GET /files` — the caller's own files, not yet mapped into a dataset.
async fn my_files(
    State(state): State<AppState>,
    Extension(AuthedUser(claims)): Extension<AuthedUser>,
) -> Result<Json<Vec<UserFileView>>, ApiError> {
    let files = state.store.get_user_files(&claims.sub).await?;
    Ok(Json(
        files
            .into_iter()
            .map(|f| UserFileView {
                file_id: f.file_id.to_string(),
                inbox_path: f.inbox_path,
                status: f.status,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    filepath: String,
    user: String,
}

/// `POST /file/ingest` — publish an `ingest` message; the ingest worker
/// appends the event (§4.4).
async fn file_ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .find_file_id_by_path(&body.user, &body.filepath)
        .await
        .map_err(|_| ApiError::BadRequest(format!("unknown user/filepath: {}/{}", body.user, body.filepath)))?;

    // Resolved only to keep admin-triggered ingestion on the same
    // conversation as any prior event for this file (§4.1 get_corr_id);
    // the message itself carries no correlation id — the ingest worker
    // mints or resolves it on receipt, per §4.3 step 3.
    let _corr_id = state.store.get_corr_id(&body.user, &body.filepath).await?;

    let message = json!({
        "type": "ingest",
        "user": body.user,
        "filepath": body.filepath,
    });
    state.broker.publish("ingestion-trigger", "ingest", &message).await.map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct AccessionRequest {
    accession_id: String,
    filepath: String,
    user: String,
}

/// `POST /file/accession` — verify the file admits an accession and the
/// requested id is unused, then publish an `accession` message (§4.4).
async fn file_accession(
    State(state): State<AppState>,
    Json(body): Json<AccessionRequest>,
) -> Result<StatusCode, ApiError> {
    let file_id = state
        .store
        .find_file_id_by_path(&body.user, &body.filepath)
        .await
        .map_err(|_| ApiError::BadRequest(format!("unknown user/filepath: {}/{}", body.user, body.filepath)))?;

    let info = state.store.get_file_info(file_id).await?;
    if !matches!(info.status, FileEventType::Verified) {
        return Err(ApiError::BadRequest(format!(
            "file is not in a state that admits an accession: {}",
            info.status
        )));
    }

    match state.store.check_accession_id_exists(&body.accession_id, file_id).await? {
        AccessionCheck::Duplicate => {
            return Err(ApiError::BadRequest(format!("accession {} already in use", body.accession_id)))
        }
        AccessionCheck::Unused | AccessionCheck::Same => {}
    }

    let message = json!({
        "type": "accession",
        "accession_id": body.accession_id,
        "user": body.user,
        "filepath": body.filepath,
    });
    state.broker.publish("ingestion-accession", "accession", &message).await.map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct DatasetCreateRequest {
    accession_ids: Vec<String>,
    dataset_id: String,
}

/// `POST /dataset/create` — publish a `mapping` message; the mapper worker
/// writes the `(file_id, dataset_id)` rows (§4.4).
async fn dataset_create(
    State(state): State<AppState>,
    Json(body): Json<DatasetCreateRequest>,
) -> Result<StatusCode, ApiError> {
    if body.accession_ids.is_empty() {
        return Err(ApiError::BadRequest("accession_ids must not be empty".into()));
    }

    let message = json!({
        "type": "mapping",
        "dataset_id": body.dataset_id,
        "accession_ids": body.accession_ids,
    });
    state.broker.publish("dataset-mapping", "mapping", &message).await.map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

/// `POST /dataset/release/*dataset` — publish a `release` message for the
/// dataset named in the path (§4.4).
async fn dataset_release(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> Result<StatusCode, ApiError> {
    if dataset.trim_matches('/').is_empty() {
        return Err(ApiError::BadRequest("missing dataset name".into()));
    }

    let message = json!({
        "type": "release",
        "dataset_id": dataset.trim_matches('/'),
    });
    state.broker.publish("dataset-release", "release", &message).await.map_err(ApiError::from)?;
    Ok(StatusCode::OK)
}

/// `GET /users` — users with at least one file not yet in a dataset.
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_active_users().await?))
}

/// `GET /users/:username/files` — `username` arrives with `@` re-encoded as
/// `_` on the path (§4.4); the only punctuation submitter usernames carry
/// is the single `@` in an email address, so the substitution is
/// unambiguous to reverse.
async fn user_files(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<UserFileView>>, ApiError> {
    let username = username.replace('_', "@");
    let files = state.store.get_user_files(&username).await?;
    Ok(Json(
        files
            .into_iter()
            .map(|f| UserFileView {
                file_id: f.file_id.to_string(),
                inbox_path: f.inbox_path,
                status: f.status,
            })
            .collect(),
    ))
}

/// `GET /ready` — probe broker and database within a short timeout
/// (§4.5): 200 iff all respond, else 503.
async fn ready(State(state): State<AppState>) -> StatusCode {
    let timeout = Duration::from_secs(state.config.readiness_timeout_secs.max(1));
    let probe_db = tokio::time::timeout(timeout, state.store.ping());
    let probe_broker = tokio::time::timeout(timeout, state.broker.ping());

    match tokio::join!(probe_db, probe_broker) {
        (Ok(Ok(())), Ok(Ok(()))) => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
