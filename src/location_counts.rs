use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::grid::date_range;
use crate::models::{LocationDateCount, LocationDateTotal};
use crate::round::offset_date;

/// Days before the round close that location/date totals cover.
pub const LOOKBACK_DAYS: i64 = 31;

/// Total sequences per location and collection date, regardless of clade, for
/// every location on every day of the lookback window ending on `end_date`.
pub fn location_date_totals(
    counts: &[LocationDateCount],
    locations: &[String],
    end_date: NaiveDate,
) -> Result<Vec<LocationDateTotal>> {
    let begin_date = offset_date(end_date, -LOOKBACK_DAYS)?;
    let dates = date_range(begin_date, end_date)?;

    let mut totals: HashMap<(&str, NaiveDate), i64> = HashMap::new();
    for count in counts {
        *totals
            .entry((count.location.as_str(), count.date))
            .or_insert(0) += count.count;
    }

    let mut rows = Vec::with_capacity(locations.len() * dates.len());
    for location in locations {
        for date in &dates {
            rows.push(LocationDateTotal {
                location: location.clone(),
                target_date: *date,
                count: totals
                    .get(&(location.as_str(), *date))
                    .copied()
                    .unwrap_or(0),
            });
        }
    }
    Ok(rows)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    location: &'a str,
    target_date: NaiveDate,
    count: i64,
}

pub fn write_location_date_totals(
    dir: &Path,
    round_id: &str,
    rows: &[LocationDateTotal],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{round_id}.csv"));
    let mut writer = csv::Writer::from_path(&path)?;
    for row in rows {
        writer.serialize(CsvRow {
            location: &row.location,
            target_date: row.target_date,
            count: row.count,
        })?;
    }
    writer.flush()?;
    info!(rows = rows.len(), path = %path.display(), "location/date counts saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn count(location: &str, date: NaiveDate, clade: &str, count: i64) -> LocationDateCount {
        LocationDateCount {
            location: location.to_string(),
            date,
            clade: clade.to_string(),
            count,
        }
    }

    #[test]
    fn totals_cover_every_location_and_day() {
        let locations = vec!["MA".to_string(), "TX".to_string()];
        let counts = vec![
            count("MA", day(11, 6), "24A", 2),
            count("MA", day(11, 6), "24B", 3),
            count("TX", day(10, 1), "24A", 9),
        ];
        let rows = location_date_totals(&counts, &locations, day(11, 6)).unwrap();

        assert_eq!(rows.len(), 2 * 32);
        let ma = rows
            .iter()
            .find(|row| row.location == "MA" && row.target_date == day(11, 6))
            .unwrap();
        assert_eq!(ma.count, 5);
        // 2024-10-01 is before the 31-day lookback
        assert_eq!(rows.iter().map(|row| row.count).sum::<i64>(), 5);
    }

    #[test]
    fn lookback_before_the_calendar_is_rejected() {
        let err = location_date_totals(&[], &["MA".to_string()], NaiveDate::MIN).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::Configuration(_)));
    }

    #[test]
    fn writes_csv_named_for_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![LocationDateTotal {
            location: "MA".to_string(),
            target_date: day(11, 6),
            count: 5,
        }];
        let path = write_location_date_totals(dir.path(), "2024-11-06", &rows).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert_eq!(body, "location,target_date,count\nMA,2024-11-06,5\n");
    }
}
