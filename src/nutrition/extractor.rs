use lazy_static::lazy_static;
use regex::Regex;

use super::{NutritionExtractor, NutritionFacts};

lazy_static! {
    static ref CALORIES_RE: Regex =
        Regex::new(r"(?:熱量|热量|卡路里).*?(\d+).*?(?:大卡|千卡|kcal)").unwrap();
    static ref CARBS_RE: Regex = Regex::new(r"(?:碳水化合物|碳水).*?(\d+).*?克").unwrap();
    static ref PROTEIN_RE: Regex = Regex::new(r"(?:蛋白質|蛋白质).*?(\d+).*?克").unwrap();
    static ref FAT_RE: Regex = Regex::new(r"脂肪.*?(\d+).*?克").unwrap();
}

/// Pattern scrape over generated text: for each nutrient, the first
/// `<name> ... <integer> ... <unit>` on a single line wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

fn first_amount(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

impl NutritionExtractor for RegexExtractor {
    fn extract(&self, analysis: &str) -> Option<NutritionFacts> {
        if analysis.is_empty() {
            return None;
        }
        Some(NutritionFacts {
            calories: first_amount(&CALORIES_RE, analysis),
            carbs: first_amount(&CARBS_RE, analysis),
            protein: first_amount(&PROTEIN_RE, analysis),
            fat: first_amount(&FAT_RE, analysis),
        })
    }
}
