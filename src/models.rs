use chrono::NaiveDate;

/// Label that collects every clade not tracked individually for a round.
pub const OTHER_CLADE: &str = "other";

#[derive(Debug, Clone)]
pub struct SequenceAssignment {
    pub sequence_id: Option<String>,
    pub location: String,
    pub collection_date: NaiveDate,
    pub clade: String,
    pub host: Option<String>,
    pub country: Option<String>,
    pub count: i64,
}

/// Sequences of one clade collected on one day in one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDateCount {
    pub location: String,
    pub date: NaiveDate,
    pub clade: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CladeWeekCount {
    pub clade: String,
    pub week_start: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct CladeProportion {
    pub clade: String,
    pub week_start: NaiveDate,
    pub count: i64,
    pub total_count: i64,
    pub proportion: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseGridRow {
    pub location: String,
    pub target_date: NaiveDate,
    pub clade: String,
    pub observation: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRow {
    pub nowcast_date: NaiveDate,
    pub location: String,
    pub target_date: NaiveDate,
    pub clade: String,
    pub oracle_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDateTotal {
    pub location: String,
    pub target_date: NaiveDate,
    pub count: i64,
}
