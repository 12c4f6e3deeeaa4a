use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::NutritionSnapshot;

#[derive(Debug, Serialize)]
pub struct EntryDetails {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub analysis: String,
    pub note: Option<String>,
    pub nutrition: Option<NutritionSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub id: Uuid,
    pub analysis: String,
    pub nutrition: Option<NutritionSnapshot>,
}
