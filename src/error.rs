use thiserror::Error;

#[derive(Error, Debug)]
pub enum RevflowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

pub type Result<T> = std::result::Result<T, RevflowError>;
