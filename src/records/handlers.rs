use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{AnalyzeRequest, AnalyzeResponse, EntryDetails};
use super::repo_types::Entry;
use super::services::{analyze_entry, upload_entry};
use crate::{error::AppError, state::AppState};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record).delete(delete_record))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/records/:id/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_records(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, AppError> {
    Ok(Json(state.store.list_entries().await?))
}

#[instrument(skip(state))]
pub async fn get_record(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EntryDetails>, AppError> {
    let Path(id) = id?;
    let (entry, note, nutrition) = state.store.entry_details(id).await?;
    Ok(Json(EntryDetails {
        id: entry.id,
        filename: entry.filename,
        url: entry.url,
        timestamp: entry.timestamp,
        analysis: entry.analysis,
        note,
        nutrition,
    }))
}

/// POST /upload (multipart, field `image`)
#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<Entry>), AppError> {
    let mut image = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() == Some("image") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.to_string()))?;
            image = Some((data, content_type));
        }
    }
    let Some((data, content_type)) = image.filter(|(d, _)| !d.is_empty()) else {
        warn!("upload without image");
        return Err(AppError::Validation("image is required".into()));
    };

    let entry = upload_entry(&state, data, &content_type).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/records/{}", entry.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(entry)))
}

/// POST /records/:id/analyze, optional JSON body `{"note": "..."}`
#[instrument(skip(state, body))]
pub async fn analyze(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Path(id) = id?;
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice::<AnalyzeRequest>(&body)
            .map_err(|e| AppError::Validation(format!("invalid analyze body: {e}")))?
    };
    let resp = analyze_entry(&state, id, req.note).await?;
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn delete_record(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    state.store.delete_entry(id).await?;
    info!(%id, "record deleted via api");
    Ok(StatusCode::NO_CONTENT)
}
