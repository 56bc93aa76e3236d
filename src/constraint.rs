//! Reclassification of provider integrity errors into a portable taxonomy.

use std::fmt;
use std::sync::Arc;

use crate::error::{ProviderError, SqlFluentDbError};

/// Referential integrity violation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstraintViolationKind {
    #[default]
    None,
    PrimaryKey,
    ForeignKey,
    DuplicateKey,
}

impl ConstraintViolationKind {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            ConstraintViolationKind::None => "no integrity violation",
            ConstraintViolationKind::PrimaryKey => "primary key violation",
            ConstraintViolationKind::ForeignKey => "foreign key violation",
            ConstraintViolationKind::DuplicateKey => "duplicate key violation",
        }
    }
}

impl fmt::Display for ConstraintViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Native error codes a provider reports for each integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintCodes {
    pub duplicate_key: i32,
    pub foreign_key: i32,
    pub primary_key: i32,
}

impl ConstraintCodes {
    /// Match order is duplicate key, then foreign key, then primary key. A provider that uses
    /// one code for two kinds gets the first.
    #[must_use]
    pub fn classify(&self, code: i32) -> ConstraintViolationKind {
        if code == self.duplicate_key {
            ConstraintViolationKind::DuplicateKey
        } else if code == self.foreign_key {
            ConstraintViolationKind::ForeignKey
        } else if code == self.primary_key {
            ConstraintViolationKind::PrimaryKey
        } else {
            ConstraintViolationKind::None
        }
    }
}

/// Payload delivered to constraint-violation observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ConstraintViolationKind,
    pub message: String,
    /// The provider's native error code.
    pub code: i32,
}

pub type ConstraintObserver = Arc<dyn Fn(&ConstraintViolation) + Send + Sync>;

/// Map a provider failure onto a [`SqlFluentDbError::ConstraintViolation`] when its native
/// code matches `codes`, notifying every observer first. Anything else is returned untouched.
pub(crate) fn classify(
    err: SqlFluentDbError,
    codes: &ConstraintCodes,
    native_code: impl Fn(&ProviderError) -> Option<i32>,
    observers: &[ConstraintObserver],
) -> SqlFluentDbError {
    let SqlFluentDbError::Provider(source) = err else {
        return err;
    };
    let Some(code) = native_code(&source) else {
        return SqlFluentDbError::Provider(source);
    };
    let kind = codes.classify(code);
    if kind == ConstraintViolationKind::None {
        return SqlFluentDbError::Provider(source);
    }

    let violation = ConstraintViolation {
        kind,
        message: format!("{kind}: {source}"),
        code,
    };
    tracing::warn!(code, kind = ?kind, "constraint violation: {source}");
    for observer in observers {
        observer(&violation);
    }
    SqlFluentDbError::ConstraintViolation {
        kind,
        message: violation.message,
        source,
    }
}
