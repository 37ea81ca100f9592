use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{DenseGridRow, LocationDateCount, OTHER_CLADE};

/// Every date from `begin` to `end`, both inclusive.
pub fn date_range(begin: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if begin > end {
        return Err(PipelineError::Configuration(format!(
            "collection date range is inverted: {begin} is after {end}"
        )));
    }
    let days = (end - begin).num_days();
    Ok((0..=days).map(|offset| begin + Duration::days(offset)).collect())
}

/// Build the complete location x date x clade grid and attribute sparse counts
/// onto it. Clades outside `clades` are relabeled to `other` before grouping so
/// that several untracked clades on the same location/date add up.
pub fn build_grid(
    sparse_counts: &[LocationDateCount],
    clades: &[String],
    locations: &[String],
    date_begin: NaiveDate,
    date_end: NaiveDate,
) -> Result<Vec<DenseGridRow>> {
    let dates = date_range(date_begin, date_end)?;
    let tracked: HashSet<&str> = clades.iter().map(String::as_str).collect();
    let known_locations: HashSet<&str> = locations.iter().map(String::as_str).collect();

    let mut observed: HashMap<(&str, NaiveDate, &str), i64> = HashMap::new();
    let mut outside_grid = 0i64;
    for count in sparse_counts {
        let clade = if tracked.contains(count.clade.as_str()) {
            count.clade.as_str()
        } else {
            OTHER_CLADE
        };
        if count.date < date_begin
            || count.date > date_end
            || !known_locations.contains(count.location.as_str())
            || !tracked.contains(clade)
        {
            outside_grid += count.count;
            continue;
        }
        *observed
            .entry((count.location.as_str(), count.date, clade))
            .or_insert(0) += count.count;
    }
    if outside_grid > 0 {
        debug!(sequences = outside_grid, "sparse counts fall outside the grid");
    }

    let mut grid = Vec::with_capacity(dates.len() * locations.len() * clades.len());
    for location in locations {
        for date in &dates {
            for clade in clades {
                let observation = observed
                    .get(&(location.as_str(), *date, clade.as_str()))
                    .copied()
                    .unwrap_or(0);
                grid.push(DenseGridRow {
                    location: location.clone(),
                    target_date: *date,
                    clade: clade.clone(),
                    observation,
                });
            }
        }
    }

    Ok(grid)
}
