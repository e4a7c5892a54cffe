use std::fmt::{self, Display};

/// Errors produced by model parsers and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidStatus(String),
    InvalidTimestamp(String),
    InvalidEntityList(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidStatus(raw) => {
                write!(f, "invalid task status: {raw}")
            }
            ModelError::InvalidTimestamp(raw) => {
                write!(f, "invalid timestamp: {raw}")
            }
            ModelError::InvalidEntityList(raw) => {
                write!(f, "invalid entity list: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
