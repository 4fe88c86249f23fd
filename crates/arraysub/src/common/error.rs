use std::path::PathBuf;

use thiserror::Error;

use crate::common::error::ArraySubError::GenericError;

#[derive(Debug, Error)]
pub enum ArraySubError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Manifest {0} does not exist")]
    ManifestNotFound(PathBuf),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Scheduler error: {0}")]
    SchedulerError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<anyhow::Error> for ArraySubError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<toml::de::Error> for ArraySubError {
    fn from(error: toml::de::Error) -> Self {
        Self::ConfigError(error.to_string())
    }
}

pub fn error<T>(message: String) -> crate::Result<T> {
    Err(GenericError(message))
}

impl From<String> for ArraySubError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}
