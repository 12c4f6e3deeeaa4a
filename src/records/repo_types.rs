use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::nutrition::NutritionFacts;

/// One uploaded meal photo and its analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,                      // generated at creation, never reused
    pub filename: String,              // image store object key
    pub url: String,                   // where the image is served from
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,     // creation time, carries the diary offset
    #[serde(default)]
    pub analysis: String,              // empty until analyzed
}

/// Nutrition scraped from an entry's analysis, stamped with the entry's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub facts: NutritionFacts,
}

pub type EntryTable = Vec<Entry>;
pub type SupplementTable = BTreeMap<Uuid, String>;
pub type NutritionTable = BTreeMap<Uuid, NutritionSnapshot>;
/// Entry id -> image key, held while a delete is in progress.
pub type DeletionTable = BTreeMap<Uuid, String>;
