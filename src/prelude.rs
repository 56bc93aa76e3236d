//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::command::{CommandBehavior, CommandKind};
pub use crate::config::{ConfiguredExecutorBuilder, ExecutorBuilder, ExecutorOptions, Settings};
pub use crate::constraint::{ConstraintViolation, ConstraintViolationKind};
pub use crate::error::{ProviderError, SqlFluentDbError};
pub use crate::executor::{ConnectionMode, SqlExecutor};
pub use crate::parameter::{RETURN_PARAMETER, TableValue};
pub use crate::provider::{Capability, Provider};
pub use crate::results::{Record, ResultSchema};
pub use crate::scalar::FromDbValue;
pub use crate::types::{DbValue, Decimal, NumericType};

pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteProvider};
