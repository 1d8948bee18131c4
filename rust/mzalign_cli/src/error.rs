use mzalign::{
    MzAlignError,
    ParameterError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Processing(#[from] MzAlignError),

    #[error("Data reading error: {0}")]
    DataReading(String),
}
