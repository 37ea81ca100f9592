use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::counter::{week_start, WindowedCounter};
use crate::error::{PipelineError, Result};
use crate::models::CladeProportion;

/// Clades need at least this many sequences inside the window to be eligible.
pub const MIN_WINDOW_SEQUENCES: i64 = 2;

#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub threshold: f64,
    pub threshold_weeks: u32,
    pub max_clades: usize,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            threshold_weeks: 3,
            max_clades: 9,
        }
    }
}

impl SelectionParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(PipelineError::Configuration(format!(
                "threshold must be in [0, 1), got {}",
                self.threshold
            )));
        }
        if self.threshold_weeks == 0 {
            return Err(PipelineError::Configuration(
                "threshold_weeks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CladeSelection {
    /// Selected clades in alphabetical order, without the `other` sentinel.
    pub clades: Vec<String>,
    pub window_start: NaiveDate,
    /// Weekly proportions the selection was made from.
    pub window: Vec<CladeProportion>,
}

impl CladeSelection {
    pub fn window_total(&self) -> i64 {
        self.window.iter().map(|row| row.count).sum()
    }

    pub fn window_counts_by_clade(&self) -> BTreeMap<String, i64> {
        window_counts(&self.window)
    }
}

/// First day of the selection window: `threshold_weeks` whole weeks before the
/// week holding the most recent collection date. That partial week is kept in
/// the data but does not count as one of the threshold weeks.
pub fn window_start(most_recent_date: NaiveDate, threshold_weeks: u32) -> Result<NaiveDate> {
    week_start(most_recent_date)
        .checked_sub_signed(Duration::weeks(i64::from(threshold_weeks)))
        .ok_or_else(|| {
            PipelineError::Configuration(format!(
                "threshold_weeks {threshold_weeks} reaches before the earliest representable date"
            ))
        })
}

fn window_counts(window: &[CladeProportion]) -> BTreeMap<String, i64> {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for row in window {
        *totals.entry(row.clade.clone()).or_insert(0) += row.count;
    }
    totals
}

pub fn select_clades(counter: &WindowedCounter, params: SelectionParams) -> Result<CladeSelection> {
    params.validate()?;

    let window_start = window_start(counter.most_recent_date(), params.threshold_weeks)?;
    let window = counter.proportions(window_start)?;
    let totals = window_counts(&window);

    let frequent: BTreeSet<&str> = totals
        .iter()
        .filter(|(_, total)| **total >= MIN_WINDOW_SEQUENCES)
        .map(|(clade, _)| clade.as_str())
        .collect();

    let high_prevalence: BTreeSet<&str> = window
        .iter()
        .filter(|row| frequent.contains(row.clade.as_str()) && row.proportion > params.threshold)
        .map(|row| row.clade.as_str())
        .collect();

    debug!(
        %window_start,
        weeks = window.iter().map(|row| row.week_start).collect::<BTreeSet<_>>().len(),
        eligible = frequent.len(),
        above_threshold = high_prevalence.len(),
        "evaluated clade window"
    );

    let mut clades: Vec<String> = if high_prevalence.len() > params.max_clades {
        // Ranked over every clade in the window, largest count first, ties by label.
        let mut ranked: Vec<(&String, &i64)> = totals.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(params.max_clades)
            .map(|(clade, _)| clade.clone())
            .collect()
    } else {
        high_prevalence.into_iter().map(str::to_string).collect()
    };
    clades.sort();

    info!(?clades, %window_start, "selected clades");
    Ok(CladeSelection {
        clades,
        window_start,
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationDateCount;
    use uuid::Uuid;

    fn day(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn counts(rows: &[(NaiveDate, &str, i64)]) -> WindowedCounter {
        let counts: Vec<LocationDateCount> = rows
            .iter()
            .map(|(date, clade, count)| LocationDateCount {
                location: "MA".to_string(),
                date: *date,
                clade: clade.to_string(),
                count: *count,
            })
            .collect();
        WindowedCounter::from_counts(&counts).unwrap()
    }

    /// Fifteen sequences spread over three states and three collection dates.
    fn sequence_sample() -> WindowedCounter {
        let states = ["MA", "PA", "TX"];
        let dates = [day(2, 1), day(2, 12), day(2, 19)];
        let clades = std::iter::once("23A")
            .chain(std::iter::repeat("24E").take(4))
            .chain(std::iter::repeat("24F").take(5))
            .chain(std::iter::repeat("25A").take(5));

        let assignments: Vec<crate::models::SequenceAssignment> = clades
            .enumerate()
            .map(|(i, clade)| crate::models::SequenceAssignment {
                sequence_id: Some(Uuid::new_v4().to_string()),
                location: states[i % states.len()].to_string(),
                collection_date: dates[i % dates.len()],
                clade: clade.to_string(),
                host: Some("Homo sapiens".to_string()),
                country: Some("USA".to_string()),
                count: 1,
            })
            .collect();
        WindowedCounter::from_counts(&crate::assignments::summarize(&assignments)).unwrap()
    }

    fn params(threshold: f64, threshold_weeks: u32, max_clades: usize) -> SelectionParams {
        SelectionParams {
            threshold,
            threshold_weeks,
            max_clades,
        }
    }

    #[test]
    fn window_excludes_partial_current_week_from_week_count() {
        // 2025-02-19 is a Wednesday in the week starting Sunday 2025-02-16
        assert_eq!(window_start(day(2, 19), 3).unwrap(), day(1, 26));
        assert_eq!(window_start(day(2, 16), 1).unwrap(), day(2, 9));
    }

    #[test]
    fn window_before_the_calendar_is_a_configuration_error() {
        let err = select_clades(&sequence_sample(), params(0.01, u32::MAX, 9)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn default_criteria() {
        let selection = select_clades(&sequence_sample(), SelectionParams::default()).unwrap();
        assert_eq!(selection.clades, vec!["24E", "24F", "25A"]);
    }

    #[test]
    fn smaller_max_clades_keeps_largest_counts() {
        let selection = select_clades(&sequence_sample(), params(0.01, 3, 2)).unwrap();
        assert_eq!(selection.clades, vec!["24F", "25A"]);
    }

    #[test]
    fn fewer_threshold_weeks() {
        let selection = select_clades(&sequence_sample(), params(0.01, 2, 9)).unwrap();
        assert_eq!(selection.clades, vec!["24E", "24F", "25A"]);
        assert_eq!(selection.window_start, day(2, 2));
        assert_eq!(selection.window_total(), 10);
    }

    #[test]
    fn larger_threshold() {
        let selection = select_clades(&sequence_sample(), params(0.3, 3, 9)).unwrap();
        assert_eq!(selection.clades, vec!["24E", "24F", "25A"]);
    }

    #[test]
    fn single_observation_clades_are_dropped() {
        // Three complete weeks before the week of 2025-02-16.
        let counter = counts(&[
            (day(1, 26), "AA", 2),
            (day(1, 26), "BB", 5),
            (day(1, 26), "CC", 1),
            (day(2, 2), "BB", 5),
            (day(2, 9), "AA", 3),
            (day(2, 9), "BB", 5),
            (day(2, 17), "BB", 1),
        ]);
        let selection = select_clades(&counter, params(0.01, 3, 9)).unwrap();
        assert_eq!(selection.clades, vec!["AA", "BB"]);
    }

    #[test]
    fn ties_prefer_alphabetically_earlier_clade() {
        let counter = counts(&[
            (day(2, 10), "ZZ", 3),
            (day(2, 10), "MM", 3),
            (day(2, 10), "AA", 3),
            (day(2, 10), "BB", 5),
        ]);
        let selection = select_clades(&counter, params(0.01, 3, 2)).unwrap();
        assert_eq!(selection.clades, vec!["AA", "BB"]);
    }

    #[test]
    fn no_clade_above_threshold_is_an_empty_selection() {
        let counter = counts(&[(day(2, 10), "AA", 1), (day(2, 10), "BB", 1)]);
        let selection = select_clades(&counter, SelectionParams::default()).unwrap();
        assert!(selection.clades.is_empty());
    }

    #[test]
    fn never_returns_more_than_max_or_rare_clades() {
        let labels = ["A", "B", "C", "D", "E", "F", "G", "H"];
        let rows: Vec<(NaiveDate, &str, i64)> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (day(2, 10), *label, i as i64))
            .collect();
        let counter = counts(&rows);
        for max_clades in 0..10 {
            for threshold_weeks in 1..4 {
                let selection =
                    select_clades(&counter, params(0.0, threshold_weeks, max_clades)).unwrap();
                assert!(selection.clades.len() <= max_clades);
                let totals = selection.window_counts_by_clade();
                for clade in &selection.clades {
                    assert!(totals[clade] >= MIN_WINDOW_SEQUENCES);
                }
            }
        }
    }

    #[test]
    fn rejects_invalid_threshold() {
        let err = select_clades(&sequence_sample(), params(1.5, 3, 9)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
