//! The statement executor: one command, one lazily-opened connection, and the fluent API
//! that builds, runs and inspects the command.

use std::fmt;
use std::sync::Arc;

use crate::command::{Command, CommandKind};
use crate::config::ExecutorOptions;
use crate::constraint::{self, ConstraintObserver, ConstraintViolation};
use crate::error::SqlFluentDbError;
use crate::provider::{Capability, Provider, ProviderConnection};

mod dispatch;
mod lifecycle;
mod outputs;
mod parameters;

pub use lifecycle::ConnectionMode;

/// Executes parameterized statements against a single provider connection.
///
/// Build the command fluently, run it in one of three modes (non-query, scalar, streaming
/// read), then read output parameters back:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sql_fluent::prelude::*;
///
/// # fn demo() -> Result<(), SqlFluentDbError> {
/// let mut exec = SqlExecutor::new(Arc::new(SqliteProvider), "Data Source=app.db", ConnectionMode::Normal);
/// let inserted = exec
///     .set_sql("INSERT INTO users (id, name) VALUES (@id, @name)")?
///     .add_in_parameter("@id", 7_i64)?
///     .add_in_string("@name", Some("alice"), 64)?
///     .execute()?;
/// assert_eq!(inserted, 1);
///
/// let count: Option<i64> = exec
///     .set_sql("SELECT COUNT(*) FROM users WHERE id = @id")?
///     .add_in_parameter("@id", 7_i64)?
///     .scalar()?;
/// assert_eq!(count, Some(1));
/// # Ok(()) }
/// ```
///
/// An executor owns its connection exclusively; it is `Send` but not meant to be shared.
/// Callers that need concurrency use one executor per task.
pub struct SqlExecutor {
    provider: Arc<dyn Provider>,
    connection_string: String,
    mode: ConnectionMode,
    options: ExecutorOptions,
    connection: Option<Box<dyn ProviderConnection>>,
    command: Command,
    observers: Vec<ConstraintObserver>,
    disposed: bool,
}

impl SqlExecutor {
    /// Create an executor. Nothing is opened until the first statement runs, so a missing or
    /// malformed connection string only surfaces then.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        connection_string: impl Into<String>,
        mode: ConnectionMode,
    ) -> Self {
        Self::with_options(provider, connection_string, mode, ExecutorOptions::default())
    }

    #[must_use]
    pub fn with_options(
        provider: Arc<dyn Provider>,
        connection_string: impl Into<String>,
        mode: ConnectionMode,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            provider,
            connection_string: connection_string.into(),
            mode,
            options,
            connection: None,
            command: Command::new(),
            observers: Vec::new(),
            disposed: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    #[must_use]
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Whether the owned connection exists and is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_open())
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Subscribe to constraint violations. Observers run synchronously, in registration
    /// order, immediately before the classified error is returned.
    pub fn on_constraint_violation<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(&ConstraintViolation) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Replace the command with ad hoc SQL text. Clears all parameters.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::MissingArgument` if `sql` is empty.
    pub fn set_sql(&mut self, sql: &str) -> Result<&mut Self, SqlFluentDbError> {
        self.set_command(sql, CommandKind::Text)
    }

    /// Replace the command with a stored procedure call. Clears all parameters.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::MissingArgument` if `name` is empty.
    pub fn set_stored_procedure(&mut self, name: &str) -> Result<&mut Self, SqlFluentDbError> {
        self.set_command(name, CommandKind::StoredProcedure)
    }

    /// # Errors
    /// Returns `MissingArgument` for empty text and `Unsupported` for
    /// [`CommandKind::TableDirect`].
    pub fn set_command(
        &mut self,
        text: &str,
        kind: CommandKind,
    ) -> Result<&mut Self, SqlFluentDbError> {
        self.ensure_live()?;
        self.command.set(text, kind)?;
        Ok(self)
    }

    /// Release the command and connection, closing the connection if it is open. Calling it
    /// again is a no-op.
    ///
    /// # Errors
    /// Returns the provider's error if closing the connection fails.
    pub fn dispose(&mut self) -> Result<(), SqlFluentDbError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.command.clear();
        match self.connection.take() {
            Some(mut conn) if conn.is_open() => {
                tracing::debug!(provider = self.provider.name(), "closing connection on dispose");
                conn.close()
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<(), SqlFluentDbError> {
        if self.disposed {
            return Err(SqlFluentDbError::InvalidState(
                "the executor has been disposed".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn require(&self, capability: Capability, what: &str) -> Result<(), SqlFluentDbError> {
        if self.provider.supports(capability) {
            Ok(())
        } else {
            Err(SqlFluentDbError::Unsupported(format!(
                "{what} is not supported by the {} provider",
                self.provider.name()
            )))
        }
    }

    pub(crate) fn classify(&self, err: SqlFluentDbError) -> SqlFluentDbError {
        let provider = &self.provider;
        constraint::classify(
            err,
            &provider.constraint_codes(),
            |e| provider.native_code(e),
            &self.observers,
        )
    }

    /// Borrow the open connection together with the command it runs.
    pub(crate) fn parts(
        &mut self,
    ) -> Result<(&mut dyn ProviderConnection, &mut Command), SqlFluentDbError> {
        let conn = self
            .connection
            .as_deref_mut()
            .ok_or_else(|| SqlFluentDbError::InvalidState("connection is not open".into()))?;
        Ok((conn, &mut self.command))
    }
}

/// Keep the primary outcome; a cleanup failure only surfaces when the work itself succeeded.
pub(crate) fn merge_cleanup<T>(
    result: Result<T, SqlFluentDbError>,
    cleanup: Result<(), SqlFluentDbError>,
) -> Result<T, SqlFluentDbError> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::warn!("closing connection after a failed statement also failed: {close_err}");
            Err(err)
        }
    }
}

impl Drop for SqlExecutor {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!("failed to close connection while dropping executor: {err}");
        }
    }
}

impl fmt::Debug for SqlExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExecutor")
            .field("provider", &self.provider.name())
            .field("mode", &self.mode)
            .field("options", &self.options)
            .field("command", &self.command)
            .field("open", &self.is_open())
            .field("observers", &self.observers.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
