use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{PipelineError, Result};
use crate::models::{CladeProportion, CladeWeekCount, LocationDateCount};

/// Sunday on or before `date`. Weeks are anchored with plain day arithmetic so
/// no calendar or locale week numbering is involved.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Weekly clade counts built from per-day counts, summed across locations.
#[derive(Debug, Clone)]
pub struct WindowedCounter {
    most_recent_date: NaiveDate,
    weekly: BTreeMap<(NaiveDate, String), i64>,
}

impl WindowedCounter {
    pub fn from_counts(counts: &[LocationDateCount]) -> Result<Self> {
        let mut daily: BTreeMap<(String, NaiveDate), i64> = BTreeMap::new();
        for count in counts {
            *daily
                .entry((count.clade.clone(), count.date))
                .or_insert(0) += count.count;
        }

        let most_recent_date = daily
            .keys()
            .map(|(_, date)| *date)
            .max()
            .ok_or_else(|| {
                PipelineError::DataIntegrity(
                    "no sequences to count; cannot determine the most recent collection date"
                        .to_string(),
                )
            })?;

        let mut weekly: BTreeMap<(NaiveDate, String), i64> = BTreeMap::new();
        for ((clade, date), count) in daily {
            *weekly.entry((week_start(date), clade)).or_insert(0) += count;
        }

        Ok(Self {
            most_recent_date,
            weekly,
        })
    }

    pub fn most_recent_date(&self) -> NaiveDate {
        self.most_recent_date
    }

    /// Weekly counts for weeks starting on or after `window_start`, ordered by
    /// week then clade.
    pub fn week_counts(&self, window_start: NaiveDate) -> Vec<CladeWeekCount> {
        self.weekly
            .range((window_start, String::new())..)
            .map(|((week_start, clade), count)| CladeWeekCount {
                clade: clade.clone(),
                week_start: *week_start,
                count: *count,
            })
            .collect()
    }

    /// Proportion of each clade within its week, for weeks starting on or after
    /// `window_start`.
    pub fn proportions(&self, window_start: NaiveDate) -> Result<Vec<CladeProportion>> {
        let counts = self.week_counts(window_start);

        let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for row in &counts {
            *totals.entry(row.week_start).or_insert(0) += row.count;
        }
        if let Some((week, _)) = totals.iter().find(|(_, total)| **total == 0) {
            return Err(PipelineError::DataIntegrity(format!(
                "week starting {week} has a total sequence count of zero"
            )));
        }

        Ok(counts
            .into_iter()
            .map(|row| {
                let total_count = totals[&row.week_start];
                CladeProportion {
                    proportion: row.count as f64 / total_count as f64,
                    clade: row.clade,
                    week_start: row.week_start,
                    count: row.count,
                    total_count,
                }
            })
            .collect())
    }
}
