use thiserror::Error;

use crate::value::DataType;

/// Which bounded collection an add operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Region,
    Variable,
    Function,
    Objective,
    Input,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Region => "region",
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Objective => "objective",
            Self::Input => "input",
        };
        f.write_str(name)
    }
}

/// Main error type for RTune
#[derive(Error, Debug)]
pub enum RtError {
    #[error("Capacity exceeded: cannot add another {kind} (limit {limit})")]
    CapacityExceeded { kind: EntityKind, limit: usize },

    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle { kind: EntityKind, index: usize },

    #[error("Type mismatch for {name}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Barrier failed: {0}")]
    Barrier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for RTune operations
pub type RtResult<T> = Result<T, RtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::RtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::RtError::Config(format!($($arg)*))
    };
}
