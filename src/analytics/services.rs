use std::collections::BTreeMap;

use time::{Date, OffsetDateTime};

use super::dto::{DailyTotals, DateRange};
use crate::records::repo_types::NutritionSnapshot;

impl DateRange {
    /// Both bounds inclusive, compared against the snapshot's own calendar date.
    /// Without `to`, anything stamped after `now` is left out.
    fn contains(&self, ts: OffsetDateTime, now: OffsetDateTime) -> bool {
        let day = ts.date();
        if self.from.is_some_and(|from| day < from) {
            return false;
        }
        match self.to {
            Some(to) => day <= to,
            None => ts <= now,
        }
    }
}

/// Sum snapshots per calendar day, oldest day first. Days without data are absent.
pub fn aggregate<'a>(
    snapshots: impl IntoIterator<Item = &'a NutritionSnapshot>,
    range: &DateRange,
    now: OffsetDateTime,
) -> Vec<DailyTotals> {
    let mut buckets: BTreeMap<Date, DailyTotals> = BTreeMap::new();
    for snap in snapshots {
        if !range.contains(snap.timestamp, now) {
            continue;
        }
        let date = snap.timestamp.date();
        let day = buckets.entry(date).or_insert_with(|| DailyTotals::empty(date));
        day.calories += u64::from(snap.facts.calories);
        day.carbs += u64::from(snap.facts.carbs);
        day.protein += u64::from(snap.facts.protein);
        day.fat += u64::from(snap.facts.fat);
        day.entries += 1;
    }
    buckets.into_values().collect()
}
