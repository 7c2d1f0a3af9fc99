use thiserror::Error;

use crate::types::AnimalId;

#[derive(Error, Debug)]
pub enum KinshipError {
    #[error("Pedigree not loaded: no animals available")]
    PedigreeNotLoaded,

    #[error("Animal {0} not found in pedigree")]
    AnimalNotFound(AnimalId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Pedigree error: {0}")]
    Pedigree(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KinshipError>;
