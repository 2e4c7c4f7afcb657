use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowbookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Transaction from row {0} has no flow type")]
    NotClassified(usize),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FlowbookError>;
