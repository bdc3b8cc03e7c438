//! Error type for this library

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown project: {0}")]
    UnknownProject(String),
    #[error("Failed to read project catalogue: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed project catalogue: {0}")]
    JsonError(#[from] serde_json::Error),
}
