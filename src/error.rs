use thiserror::Error;

use crate::constraint::ConstraintViolationKind;

/// Failures reported by the underlying database driver.
///
/// These are never produced by local validation; they only come back from a provider
/// connection. The executor inspects them for a native error code before deciding whether to
/// reclassify them as a [`SqlFluentDbError::ConstraintViolation`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A driver failure carrying only a numeric code and message.
    #[error("provider error {code}: {message}")]
    Native { code: i32, message: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum SqlFluentDbError {
    /// A required argument (parameter name, command text) was absent or empty.
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Argument out of range ({name}): {message}")]
    OutOfRange { name: String, message: String },

    #[error("Invalid operation: {0}")]
    InvalidState(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A provider failure whose native code matched one of the configured constraint codes.
    #[error("{message}")]
    ConstraintViolation {
        kind: ConstraintViolationKind,
        message: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid cast: {0}")]
    Cast(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter binding error: {0}")]
    ParameterError(String),
}

impl SqlFluentDbError {
    pub(crate) fn missing(argument: &str) -> Self {
        SqlFluentDbError::MissingArgument(argument.to_string())
    }

    pub(crate) fn out_of_range(name: &str, message: impl Into<String>) -> Self {
        SqlFluentDbError::OutOfRange {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// The constraint kind if this error is a classified integrity violation.
    #[must_use]
    pub fn constraint_kind(&self) -> Option<ConstraintViolationKind> {
        match self {
            SqlFluentDbError::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SqlFluentDbError::Cancelled)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlFluentDbError {
    fn from(err: rusqlite::Error) -> Self {
        SqlFluentDbError::Provider(ProviderError::Sqlite(err))
    }
}
