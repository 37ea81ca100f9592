use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::locations;
use crate::models::{LocationDateCount, SequenceAssignment};

pub const HUMAN_HOST: &str = "Homo sapiens";
pub const COUNTRY: &str = "USA";

#[derive(Debug, Deserialize)]
struct AssignmentRow {
    #[serde(default, alias = "strain", alias = "seqName")]
    sequence_id: Option<String>,
    location: String,
    #[serde(alias = "collection_date")]
    date: NaiveDate,
    #[serde(alias = "clade_nextstrain")]
    clade: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    count: Option<i64>,
}

/// Read a clade-assignment table as produced by the classifier. Rows may be one
/// per sequence or already aggregated with a `count` column.
pub fn read_assignments(path: &Path) -> Result<Vec<SequenceAssignment>> {
    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    let mut assignments = Vec::new();
    for result in reader.deserialize::<AssignmentRow>() {
        let row = result?;
        let count = row.count.unwrap_or(1);
        if count < 0 {
            return Err(PipelineError::DataIntegrity(format!(
                "negative count {count} for clade {} on {}",
                row.clade, row.date
            )));
        }
        assignments.push(SequenceAssignment {
            // Classifier names carry a free-text description after the id.
            sequence_id: row
                .sequence_id
                .and_then(|id| id.split_whitespace().next().map(str::to_string)),
            location: row.location,
            collection_date: row.date,
            clade: row.clade,
            host: row.host,
            country: row.country,
            count,
        });
    }

    info!(rows = assignments.len(), path = %path.display(), "read clade assignments");
    Ok(assignments)
}

#[derive(Debug, Clone, Default)]
pub struct SequenceFilter {
    pub collection_min_date: Option<NaiveDate>,
    pub collection_max_date: Option<NaiveDate>,
}

/// Keep human-host US sequences from known locations inside the collection
/// window, normalizing locations to postal codes. Host and country are only
/// checked when the input carries them.
pub fn filter_assignments(
    assignments: Vec<SequenceAssignment>,
    filter: &SequenceFilter,
) -> Result<Vec<SequenceAssignment>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(assignments.len());
    let total = assignments.len();

    for mut assignment in assignments {
        if let Some(id) = &assignment.sequence_id {
            if !seen.insert(id.clone()) {
                return Err(PipelineError::DataIntegrity(format!(
                    "duplicate sequence id {id} in clade assignments"
                )));
            }
        }
        if assignment.host.as_deref().is_some_and(|host| host != HUMAN_HOST) {
            continue;
        }
        if assignment
            .country
            .as_deref()
            .is_some_and(|country| country != COUNTRY)
        {
            continue;
        }
        if filter
            .collection_min_date
            .is_some_and(|min| assignment.collection_date < min)
            || filter
                .collection_max_date
                .is_some_and(|max| assignment.collection_date > max)
        {
            continue;
        }
        let Some(location) = locations::normalize(&assignment.location) else {
            continue;
        };
        assignment.location = location.to_string();
        kept.push(assignment);
    }

    debug!(kept = kept.len(), dropped = total - kept.len(), "filtered clade assignments");
    Ok(kept)
}

/// Collapse assignments to one count per (location, date, clade).
pub fn summarize(assignments: &[SequenceAssignment]) -> Vec<LocationDateCount> {
    let mut grouped: BTreeMap<(String, NaiveDate, String), i64> = BTreeMap::new();
    for assignment in assignments {
        *grouped
            .entry((
                assignment.location.clone(),
                assignment.collection_date,
                assignment.clade.clone(),
            ))
            .or_insert(0) += assignment.count;
    }

    grouped
        .into_iter()
        .map(|((location, date, clade), count)| LocationDateCount {
            location,
            date,
            clade,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn assignment(id: &str, location: &str, day: u32, clade: &str) -> SequenceAssignment {
        SequenceAssignment {
            sequence_id: Some(id.to_string()),
            location: location.to_string(),
            collection_date: NaiveDate::from_ymd_opt(2025, 2, day).unwrap(),
            clade: clade.to_string(),
            host: Some(HUMAN_HOST.to_string()),
            country: Some(COUNTRY.to_string()),
            count: 1,
        }
    }

    #[test]
    fn reads_raw_and_aggregated_rows() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "strain,location,date,clade_nextstrain,host,country,count").unwrap();
        writeln!(file, "s1,Massachusetts,2025-02-01,24E,Homo sapiens,USA,").unwrap();
        writeln!(file, ",TX,2025-02-02,24F,,,7").unwrap();
        file.flush().unwrap();

        let rows = read_assignments(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence_id.as_deref(), Some("s1"));
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[1].sequence_id, None);
        assert_eq!(rows[1].count, 7);
        assert_eq!(rows[1].host, None);
    }

    #[test]
    fn reads_tab_separated_files() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "location\tcollection_date\tclade").unwrap();
        writeln!(file, "PA\t2025-02-12\t25A").unwrap();
        file.flush().unwrap();

        let rows = read_assignments(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].clade, "25A");
    }

    #[test]
    fn sequence_names_are_cut_at_the_first_whitespace() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "seqName\tlocation\tdate\tclade").unwrap();
        writeln!(file, "ABC.1 first upload\tMA\t2025-02-12\t25A").unwrap();
        writeln!(file, "ABC.1 second upload\tMA\t2025-02-13\t25A").unwrap();
        file.flush().unwrap();

        let rows = read_assignments(file.path()).unwrap();
        assert_eq!(rows[0].sequence_id.as_deref(), Some("ABC.1"));
        assert_eq!(rows[1].sequence_id.as_deref(), Some("ABC.1"));

        let err = filter_assignments(rows, &SequenceFilter::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn filter_drops_non_human_foreign_and_unknown_locations() {
        let mut animal = assignment("a", "MA", 1, "24E");
        animal.host = Some("Felis catus".to_string());
        let mut abroad = assignment("b", "MA", 1, "24E");
        abroad.country = Some("Canada".to_string());
        let rows = vec![
            animal,
            abroad,
            assignment("c", "Guam", 1, "24E"),
            assignment("d", "Texas", 1, "24E"),
        ];

        let kept = filter_assignments(rows, &SequenceFilter::default()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].location, "TX");
    }

    #[test]
    fn filter_applies_collection_window() {
        let rows = vec![
            assignment("a", "MA", 1, "24E"),
            assignment("b", "MA", 10, "24E"),
            assignment("c", "MA", 20, "24E"),
        ];
        let filter = SequenceFilter {
            collection_min_date: NaiveDate::from_ymd_opt(2025, 2, 5),
            collection_max_date: NaiveDate::from_ymd_opt(2025, 2, 10),
        };
        let kept = filter_assignments(rows, &filter).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sequence_id.as_deref(), Some("b"));
    }

    #[test]
    fn duplicate_sequence_ids_are_rejected() {
        let rows = vec![assignment("a", "MA", 1, "24E"), assignment("a", "TX", 2, "24F")];
        let err = filter_assignments(rows, &SequenceFilter::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn summarize_sums_per_location_date_clade() {
        let rows = vec![
            assignment("a", "MA", 1, "24E"),
            assignment("b", "MA", 1, "24E"),
            assignment("c", "MA", 1, "24F"),
            assignment("d", "TX", 1, "24E"),
        ];
        let counts = summarize(&rows);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0].location, "MA");
        assert_eq!(counts[0].clade, "24E");
        assert_eq!(counts[0].count, 2);
    }
}
