//! The capability interface concrete database adapters implement.
//!
//! The executor only talks to these two traits. A [`Provider`] is a factory plus the
//! provider-wide facts (constraint codes, native error inspection, optional capabilities); a
//! [`ProviderConnection`] is one physical connection that runs commands.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandBehavior};
use crate::constraint::ConstraintCodes;
use crate::error::{ProviderError, SqlFluentDbError};
use crate::results::{RowCursor, RowSink};
use crate::types::DbValue;

/// Optional features a provider may opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// XML parameters and XML scalar retrieval.
    Xml,
    /// Table-valued parameters.
    TableValued,
}

/// Transaction boundary requested on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

pub trait Provider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Create an unopened connection. Connection string problems surface on open.
    ///
    /// # Errors
    /// Returns an error if the provider cannot allocate a connection object.
    fn connect(&self, connection_string: &str)
    -> Result<Box<dyn ProviderConnection>, SqlFluentDbError>;

    /// Native codes reported for duplicate-key, foreign-key and primary-key violations.
    fn constraint_codes(&self) -> ConstraintCodes;

    /// Extract the numeric error code embedded in a native failure.
    fn native_code(&self, error: &ProviderError) -> Option<i32> {
        match error {
            ProviderError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn supports(&self, _capability: Capability) -> bool {
        false
    }
}

#[async_trait]
pub trait ProviderConnection: Send {
    fn is_open(&self) -> bool;

    /// # Errors
    /// Returns the driver's connection error unchanged.
    fn open(&mut self) -> Result<(), SqlFluentDbError>;

    /// # Errors
    /// Returns the driver's connection error, or `Cancelled`.
    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), SqlFluentDbError>;

    /// # Errors
    /// Returns an error if the driver fails to release the connection.
    fn close(&mut self) -> Result<(), SqlFluentDbError>;

    /// # Errors
    /// Returns an error if the driver fails to release the connection.
    async fn close_async(&mut self) -> Result<(), SqlFluentDbError> {
        self.close()
    }

    /// Pre-compile `command` for repeated execution.
    ///
    /// # Errors
    /// Returns a provider error if the statement does not compile.
    fn prepare(&mut self, command: &Command) -> Result<(), SqlFluentDbError>;

    /// # Errors
    /// Returns a provider error if the statement does not compile, or `Cancelled`.
    async fn prepare_async(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError>;

    /// Run the command and return the affected row count. Output and return parameters on
    /// `command` are updated in place.
    ///
    /// # Errors
    /// Returns a provider error on execution failure.
    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64, SqlFluentDbError>;

    /// # Errors
    /// Returns a provider error on execution failure, or `Cancelled`.
    async fn execute_non_query_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SqlFluentDbError>;

    /// First column of the first row, `DbValue::Null` when there is none.
    ///
    /// # Errors
    /// Returns a provider error on execution failure.
    fn execute_scalar(&mut self, command: &mut Command) -> Result<DbValue, SqlFluentDbError>;

    /// # Errors
    /// Returns a provider error on execution failure, or `Cancelled`.
    async fn execute_scalar_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<DbValue, SqlFluentDbError>;

    /// Stream the result set into `sink`.
    ///
    /// # Errors
    /// Returns a provider error, or whatever error the sink raises.
    fn execute_reader(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        sink: &mut dyn RowSink,
    ) -> Result<(), SqlFluentDbError>;

    /// # Errors
    /// Returns a provider error on execution failure, or `Cancelled`.
    async fn execute_reader_async(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RowCursor>, SqlFluentDbError>;

    /// # Errors
    /// Returns `Unsupported` when the provider has no transaction support, or a provider error.
    fn transaction(&mut self, op: TransactionOp) -> Result<(), SqlFluentDbError> {
        Err(SqlFluentDbError::Unsupported(format!(
            "transaction {op:?} is not supported by this provider"
        )))
    }

    /// # Errors
    /// Returns `Unsupported` when the provider has no transaction support, or a provider error.
    async fn transaction_async(
        &mut self,
        op: TransactionOp,
        _cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        self.transaction(op)
    }
}
