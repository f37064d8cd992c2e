use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid record '{id}': {details}")]
    ValidationError { id: String, details: String },

    #[error("Template '{template}' splits sum to {sum:.2}, expected 100.00")]
    InvalidTemplateSplit { template: String, sum: f64 },

    #[error("Invalid allocation ratio {0}: must be between 0.0 and 1.0")]
    InvalidAllocationRatio(f64),

    #[error("Invalid anomaly threshold {0}: must be positive")]
    InvalidAnomalyThreshold(f64),

    #[error("Invalid trend windows: short window {short} must be shorter than long window {long}")]
    InvalidTrendWindows { short: usize, long: usize },

    #[error("Invalid date window: start {start} is after end {end}")]
    InvalidWindow {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
