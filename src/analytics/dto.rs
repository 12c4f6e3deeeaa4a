use serde::{Deserialize, Serialize, Serializer};
use time::{macros::format_description, Date};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Totals for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    #[serde(serialize_with = "iso_date")]
    pub date: Date,
    pub calories: u64,
    pub carbs: u64,
    pub protein: u64,
    pub fat: u64,
    pub entries: u32,
}

impl DailyTotals {
    pub fn empty(date: Date) -> Self {
        Self {
            date,
            calories: 0,
            carbs: 0,
            protein: 0,
            fat: 0,
            entries: 0,
        }
    }
}

fn iso_date<S: Serializer>(d: &Date, s: S) -> Result<S::Ok, S::Error> {
    let text = d
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(serde::ser::Error::custom)?;
    s.serialize_str(&text)
}

/// Parallel arrays, one slot per day, ready for charting.
#[derive(Debug, Default, Serialize)]
pub struct NutritionSeries {
    pub dates: Vec<String>, // MM/DD
    pub calories: Vec<u64>,
    pub carbs: Vec<u64>,
    pub protein: Vec<u64>,
    pub fat: Vec<u64>,
    pub entries: Vec<u32>,
}

impl From<Vec<DailyTotals>> for NutritionSeries {
    fn from(days: Vec<DailyTotals>) -> Self {
        let label = format_description!("[month]/[day]");
        let mut s = NutritionSeries::default();
        for d in days {
            s.dates
                .push(d.date.format(label).unwrap_or_else(|_| d.date.to_string()));
            s.calories.push(d.calories);
            s.carbs.push(d.carbs);
            s.protein.push(d.protein);
            s.fat.push(d.fat);
            s.entries.push(d.entries);
        }
        s
    }
}
