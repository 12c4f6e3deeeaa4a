use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, instrument};
use uuid::Uuid;

use super::dto::AnalyzeResponse;
use super::repo_types::Entry;
use crate::{
    analysis::build_instruction,
    error::StoreError,
    state::AppState,
    storage::new_object_key,
};

/// Store the image, then create its entry stamped in the diary's offset.
///
/// If the entry cannot be persisted the freshly stored image is removed again.
#[instrument(skip(st, body), fields(bytes = body.len()))]
pub async fn upload_entry(
    st: &AppState,
    body: Bytes,
    content_type: &str,
) -> Result<Entry, StoreError> {
    let images = st.store.images();
    let key = new_object_key(content_type);
    images.put_object(&key, body, content_type).await?;

    let url = images.object_url(&key);
    let timestamp = OffsetDateTime::now_utc().to_offset(st.config.utc_offset);
    match st.store.create_entry(key.clone(), url, timestamp).await {
        Ok(entry) => Ok(entry),
        Err(e) => {
            if let Err(cleanup) = images.delete_object(&key).await {
                error!(error = %cleanup, %key, "orphaned image after failed create");
            }
            Err(e)
        }
    }
}

/// Ask the analysis service about an entry's photo and record the answer.
///
/// A service failure leaves every table untouched.
#[instrument(skip(st, note))]
pub async fn analyze_entry(
    st: &AppState,
    id: Uuid,
    note: Option<String>,
) -> Result<AnalyzeResponse, StoreError> {
    let entry = st.store.get_entry(id).await?;
    let instruction = build_instruction(note.as_deref());

    let analysis = st
        .analyzer
        .analyze(&entry.url, &instruction)
        .await
        .map_err(|e| {
            error!(error = %e, %id, "analysis service failed");
            StoreError::Collaborator(format!("{e:#}"))
        })?;

    let nutrition = st
        .store
        .record_analysis(id, &analysis, note.as_deref().unwrap_or_default())
        .await?;

    Ok(AnalyzeResponse {
        id,
        analysis,
        nutrition,
    })
}
