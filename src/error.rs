use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Round parameters that cannot be honored (bad dates, bad thresholds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input data that would make counts or proportions meaningless.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("schema mismatch in {dataset}: {detail}")]
    SchemaMismatch { dataset: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
