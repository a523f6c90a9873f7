//! Error types shared by the binning and segmentation stages
//!

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CnvError {
    /// Invalid run configuration, or configuration data which can't support any result, such as
    /// an empty annotation source or a bin size which produces no bins.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Input data is inconsistent with the requested operation
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// An operation was requested before its prerequisite stage completed
    #[error("State error: {message}")]
    State { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in file '{filename}' at line {line}: {message}")]
    Parse {
        filename: String,
        line: usize,
        message: String,
    },
}

pub type CnvResult<T> = std::result::Result<T, CnvError>;

impl CnvError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn parse(filename: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            filename: filename.into(),
            line,
            message: message.into(),
        }
    }
}
