use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Unknown arm: {0} (expected one of praise, neutral, harsh)")]
    UnknownArm(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "llm")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
