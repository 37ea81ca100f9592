use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::OTHER_CLADE;
use crate::selector::{CladeSelection, SelectionParams};

pub const SEQUENCE_AS_OF_OFFSET_DAYS: i64 = 90;
pub const COLLECTION_MIN_OFFSET_DAYS: i64 = 31;
pub const COLLECTION_MAX_OFFSET_DAYS: i64 = 10;
pub const TREE_AS_OF_OFFSET_DAYS: i64 = 2;

/// Round id for a nowcast date, also the modeled-clade file stem.
pub fn round_id(nowcast_date: NaiveDate) -> String {
    nowcast_date.format("%Y-%m-%d").to_string()
}

/// Rounds open on Wednesdays; the clade list built on any day belongs to the
/// next Wednesday strictly after it.
pub fn next_wednesday(from: NaiveDate) -> NaiveDate {
    let days_from_monday = i64::from(from.weekday().num_days_from_monday());
    let mut days_until = (2 - days_from_monday).rem_euclid(7);
    if days_until == 0 {
        days_until = 7;
    }
    from + Duration::days(days_until)
}

/// Persisted list of clades for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeledClades {
    pub clades: Vec<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ModeledClades {
    pub fn from_selection(
        selection: &CladeSelection,
        params: SelectionParams,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut clades = selection.clades.clone();
        clades.push(OTHER_CLADE.to_string());

        let by_clade: BTreeMap<String, i64> = selection.window_counts_by_clade();
        let mut sequence_counts = Map::new();
        sequence_counts.insert(
            format!("total_sequences_last_{}_weeks", params.threshold_weeks),
            json!(selection.window_total()),
        );
        sequence_counts.insert("sequences_by_clade".to_string(), json!(by_clade));

        let mut meta = Map::new();
        meta.insert(
            "created_at".to_string(),
            json!(created_at.to_rfc3339_opts(SecondsFormat::Secs, false)),
        );
        meta.insert(
            "selection".to_string(),
            json!({
                "threshold": params.threshold,
                "threshold_weeks": params.threshold_weeks,
                "max_clades": params.max_clades,
                "window_start": selection.window_start.to_string(),
            }),
        );
        meta.insert("sequence_counts".to_string(), Value::Object(sequence_counts));

        Self { clades, meta }
    }

    /// Clade labels for the grid, guaranteed to end with `other`.
    pub fn clade_list(&self) -> Vec<String> {
        let mut clades: Vec<String> = self
            .clades
            .iter()
            .filter(|clade| clade.as_str() != OTHER_CLADE)
            .cloned()
            .collect();
        if clades.len() == self.clades.len() {
            warn!("modeled clade list has no `other` entry; appending it");
        }
        clades.push(OTHER_CLADE.to_string());
        clades
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

pub fn modeled_clades_path(dir: &Path, round_id: &str) -> PathBuf {
    dir.join(format!("{round_id}.json"))
}

/// Load the round's clade list. `Ok(None)` means the round is not configured.
pub fn load_modeled_clades(dir: &Path, round_id: &str) -> Result<Option<ModeledClades>> {
    let path = modeled_clades_path(dir, round_id);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)?;
    let modeled: ModeledClades = serde_json::from_str(&raw)?;
    Ok(Some(modeled))
}

pub fn save_modeled_clades(dir: &Path, round_id: &str, modeled: &ModeledClades) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = modeled_clades_path(dir, round_id);
    let body = serde_json::to_string_pretty(modeled)?;
    std::fs::write(&path, body)?;
    info!(path = %path.display(), "clade list saved");
    Ok(path)
}

/// Round dates as given on the command line; unset values take defaults
/// relative to the nowcast date.
#[derive(Debug, Clone, Default)]
pub struct RoundOptions {
    pub sequence_as_of: Option<NaiveDate>,
    pub tree_as_of: Option<NaiveDate>,
    pub collection_min_date: Option<NaiveDate>,
    pub collection_max_date: Option<NaiveDate>,
}

/// `date` moved by `days`, or a configuration error when that leaves the
/// representable calendar.
pub fn offset_date(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    date.checked_add_signed(Duration::days(days)).ok_or_else(|| {
        PipelineError::Configuration(format!("{date} offset by {days} days is out of range"))
    })
}

impl RoundOptions {
    /// Sequence snapshot date for the round.
    pub fn sequence_as_of(&self, nowcast_date: NaiveDate) -> Result<NaiveDate> {
        match self.sequence_as_of {
            Some(date) => Ok(date),
            None => offset_date(nowcast_date, SEQUENCE_AS_OF_OFFSET_DAYS),
        }
    }
}

/// Snapshots are taken at the end of their UTC day, so one dated today is not
/// complete yet and counts as in the future.
pub fn ensure_snapshot_complete(sequence_as_of: NaiveDate, today: NaiveDate) -> Result<()> {
    if sequence_as_of >= today {
        return Err(PipelineError::Configuration(format!(
            "sequence_as_of {sequence_as_of} is in the future"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub nowcast_date: NaiveDate,
    pub sequence_as_of: NaiveDate,
    pub tree_as_of: DateTime<Utc>,
    pub collection_min_date: NaiveDate,
    pub collection_max_date: NaiveDate,
}

/// Last second of a UTC day.
fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
        .and_utc()
}

impl RoundConfig {
    pub fn resolve(
        nowcast_date: NaiveDate,
        options: &RoundOptions,
        modeled: &ModeledClades,
        today: NaiveDate,
    ) -> Result<Self> {
        let sequence_as_of = options.sequence_as_of(nowcast_date)?;
        ensure_snapshot_complete(sequence_as_of, today)?;

        let collection_min_date = match options.collection_min_date {
            Some(date) => date,
            None => offset_date(nowcast_date, -COLLECTION_MIN_OFFSET_DAYS)?,
        };
        let collection_max_date = match options.collection_max_date {
            Some(date) => date,
            None => offset_date(nowcast_date, COLLECTION_MAX_OFFSET_DAYS)?,
        };
        if collection_min_date > collection_max_date {
            return Err(PipelineError::Configuration(format!(
                "collection_min_date {collection_min_date} is after collection_max_date {collection_max_date}"
            )));
        }

        let tree_as_of = match (options.tree_as_of, modeled.created_at()) {
            (Some(date), _) => end_of_day(date),
            (None, Some(created_at)) => created_at,
            (None, None) => {
                info!(
                    round = %round_id(nowcast_date),
                    "no created_at in modeled clade metadata; tree_as_of defaults to nowcast_date - 2 days"
                );
                end_of_day(offset_date(nowcast_date, -TREE_AS_OF_OFFSET_DAYS)?)
            }
        };

        Ok(Self {
            nowcast_date,
            sequence_as_of,
            tree_as_of,
            collection_min_date,
            collection_max_date,
        })
    }
}
