mod extractor;

use serde::{Deserialize, Serialize};

pub use extractor::RegexExtractor;

/// The four tracked quantities. A field is 0 when it was not found in the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: u32,
    pub carbs: u32,
    pub protein: u32,
    pub fat: u32,
}

/// Turns free-form analysis text into nutrition facts.
pub trait NutritionExtractor: Send + Sync {
    /// `None` only for empty input; otherwise every field is resolved, defaulting to 0.
    fn extract(&self, analysis: &str) -> Option<NutritionFacts>;
}
