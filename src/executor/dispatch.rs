//! Execution entry points: non-query, scalar and streaming read, each with a synchronous, an
//! async and a cancellable async form, plus `prepare`.
//!
//! Every entry point validates the command before touching the connection and, in
//! [`ConnectionMode::Normal`](super::ConnectionMode::Normal), closes the connection on every
//! exit path.

use tokio_util::sync::CancellationToken;

use super::{SqlExecutor, merge_cleanup};
use crate::command::CommandBehavior;
use crate::error::SqlFluentDbError;
use crate::provider::Capability;
use crate::results::{Record, ResultSchema, RowSink};
use crate::scalar::{FromDbValue, convert_scalar, scalar_binary};
use crate::types::DbValue;

/// Adapts the caller's column-setup and row-fill callbacks to a [`RowSink`]. Whatever the
/// setter returns is handed to every filler call.
struct CallbackSink<S, F, O> {
    setter: Option<S>,
    filler: F,
    columns: Option<O>,
    single_row: bool,
}

impl<S, F, O> CallbackSink<S, F, O> {
    fn new(setter: S, filler: F, single_row: bool) -> Self {
        Self {
            setter: Some(setter),
            filler,
            columns: None,
            single_row,
        }
    }
}

impl<S, F, O> RowSink for CallbackSink<S, F, O>
where
    S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError>,
    F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError>,
{
    fn columns(&mut self, schema: &ResultSchema) -> Result<(), SqlFluentDbError> {
        let setter = self.setter.take().ok_or_else(|| {
            SqlFluentDbError::InvalidState("reader columns were reported twice".into())
        })?;
        self.columns = Some(setter(schema)?);
        Ok(())
    }

    fn row(&mut self, record: &dyn Record) -> Result<bool, SqlFluentDbError> {
        let columns = self.columns.as_ref().ok_or_else(|| {
            SqlFluentDbError::InvalidState("reader produced a row before its columns".into())
        })?;
        (self.filler)(columns, record)?;
        Ok(!self.single_row)
    }
}

impl SqlExecutor {
    /// Run the command and return the number of affected rows.
    ///
    /// A statement that changes nothing, a plain `SELECT` included, reports 0. The count
    /// cannot tell "no rows matched" apart from "not a data-modifying statement".
    ///
    /// # Errors
    /// Returns `InvalidState` if the command is not runnable, the provider's error (classified
    /// when it carries a constraint code), or the close error when only cleanup failed.
    pub fn execute(&mut self) -> Result<u64, SqlFluentDbError> {
        self.validate("non-query")?;
        let result = self.non_query();
        self.finish(result)
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn execute_async(&mut self) -> Result<u64, SqlFluentDbError> {
        self.execute_async_with_cancel(&CancellationToken::new()).await
    }

    /// # Errors
    /// See [`execute`](Self::execute); returns `Cancelled` if `cancel` fires first.
    pub async fn execute_async_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<u64, SqlFluentDbError> {
        self.validate("non-query")?;
        let result = self.non_query_async(cancel).await;
        self.finish_async(result).await
    }

    /// First column of the first row, converted to `T`. NULL and an empty result are `None`.
    ///
    /// ```rust,no_run
    /// # use sql_fluent::prelude::*;
    /// # fn demo(exec: &mut SqlExecutor) -> Result<(), SqlFluentDbError> {
    /// let total: Option<i64> = exec
    ///     .set_sql("SELECT SUM(qty) FROM orders WHERE customer = @c")?
    ///     .add_in_parameter("@c", 12_i32)?
    ///     .scalar()?;
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    /// Returns `Cast` when the value is not convertible, plus everything
    /// [`execute`](Self::execute) can return.
    pub fn scalar<T: FromDbValue>(&mut self) -> Result<Option<T>, SqlFluentDbError> {
        convert_scalar(self.scalar_value()?)
    }

    /// # Errors
    /// See [`scalar`](Self::scalar).
    pub async fn scalar_async<T: FromDbValue>(&mut self) -> Result<Option<T>, SqlFluentDbError> {
        self.scalar_async_with_cancel(&CancellationToken::new()).await
    }

    /// # Errors
    /// See [`scalar`](Self::scalar); returns `Cancelled` if `cancel` fires first.
    pub async fn scalar_async_with_cancel<T: FromDbValue>(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, SqlFluentDbError> {
        convert_scalar(self.scalar_value_async(cancel).await?)
    }

    /// Binary scalar. A value that is not binary reads as `None`.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub fn scalar_binary(&mut self) -> Result<Option<Vec<u8>>, SqlFluentDbError> {
        Ok(scalar_binary(self.scalar_value()?))
    }

    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn scalar_binary_async(&mut self) -> Result<Option<Vec<u8>>, SqlFluentDbError> {
        self.scalar_binary_async_with_cancel(&CancellationToken::new())
            .await
    }

    /// # Errors
    /// See [`execute`](Self::execute); returns `Cancelled` if `cancel` fires first.
    pub async fn scalar_binary_async_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, SqlFluentDbError> {
        Ok(scalar_binary(self.scalar_value_async(cancel).await?))
    }

    /// XML scalar as document text.
    ///
    /// # Errors
    /// Returns `Unsupported` unless the provider handles XML; otherwise see
    /// [`scalar`](Self::scalar).
    pub fn scalar_xml(&mut self) -> Result<Option<String>, SqlFluentDbError> {
        self.require(Capability::Xml, "XML scalars")?;
        convert_scalar(self.scalar_value()?)
    }

    /// # Errors
    /// See [`scalar_xml`](Self::scalar_xml).
    pub async fn scalar_xml_async(&mut self) -> Result<Option<String>, SqlFluentDbError> {
        self.scalar_xml_async_with_cancel(&CancellationToken::new())
            .await
    }

    /// # Errors
    /// See [`scalar_xml`](Self::scalar_xml); returns `Cancelled` if `cancel` fires first.
    pub async fn scalar_xml_async_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SqlFluentDbError> {
        self.require(Capability::Xml, "XML scalars")?;
        convert_scalar(self.scalar_value_async(cancel).await?)
    }

    /// Stream the result set: `setter` runs once with the columns, then `filler` once per
    /// row as the cursor advances. The setter's return value, typically the ordinals it
    /// looked up, is passed to every filler call.
    ///
    /// ```rust,no_run
    /// # use sql_fluent::prelude::*;
    /// # fn demo(exec: &mut SqlExecutor) -> Result<(), SqlFluentDbError> {
    /// let mut ids = Vec::new();
    /// exec.set_sql("SELECT id FROM users WHERE active = @active")?
    ///     .add_in_parameter("@active", true)?
    ///     .read(
    ///         |schema| schema.ordinal("id"),
    ///         |&id_col, row| {
    ///             ids.push(row.get::<i64>(id_col)?);
    ///             Ok(())
    ///         },
    ///     )?;
    /// # Ok(()) }
    /// ```
    ///
    /// # Errors
    /// See [`execute`](Self::execute); errors raised by either callback abort the read and
    /// are returned unchanged.
    pub fn read<S, F, O>(&mut self, setter: S, filler: F) -> Result<(), SqlFluentDbError>
    where
        S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError>,
        F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError>,
    {
        self.read_with_behavior(setter, filler, CommandBehavior::default())
    }

    /// [`read`](Self::read) with explicit reader options. In
    /// [`ConnectionMode::Normal`](super::ConnectionMode::Normal) the connection is always
    /// closed once the read ends.
    ///
    /// # Errors
    /// See [`read`](Self::read).
    pub fn read_with_behavior<S, F, O>(
        &mut self,
        setter: S,
        filler: F,
        behavior: CommandBehavior,
    ) -> Result<(), SqlFluentDbError>
    where
        S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError>,
        F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError>,
    {
        self.validate("read")?;
        let behavior = self.reader_behavior(behavior);
        let mut sink = CallbackSink::new(setter, filler, behavior.single_row);
        let result = self.stream_rows(&mut sink, behavior);
        let cleanup = if behavior.close_connection {
            self.close_connection()
        } else {
            Ok(())
        };
        merge_cleanup(result, cleanup)
    }

    /// # Errors
    /// See [`read`](Self::read).
    pub async fn read_async<S, F, O>(&mut self, setter: S, filler: F) -> Result<(), SqlFluentDbError>
    where
        S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError> + Send,
        F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError> + Send,
        O: Send,
    {
        self.read_async_with_cancel(
            setter,
            filler,
            CommandBehavior::default(),
            &CancellationToken::new(),
        )
        .await
    }

    /// # Errors
    /// See [`read`](Self::read); returns `Cancelled` if `cancel` fires before the cursor is
    /// exhausted.
    pub async fn read_async_with_cancel<S, F, O>(
        &mut self,
        setter: S,
        filler: F,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError>
    where
        S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError> + Send,
        F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError> + Send,
        O: Send,
    {
        self.validate("read")?;
        let behavior = self.reader_behavior(behavior);
        let result = self
            .stream_rows_async(setter, filler, behavior, cancel)
            .await;
        let cleanup = if behavior.close_connection {
            self.close_connection_async().await
        } else {
            Ok(())
        };
        merge_cleanup(result, cleanup)
    }

    /// Open the connection and have the provider pre-compile the command. Follow with
    /// [`set_parameter`](Self::set_parameter) and any execution mode.
    ///
    /// # Errors
    /// Returns `InvalidState` if the command is not runnable, or the provider's error.
    pub fn prepare(&mut self) -> Result<&mut Self, SqlFluentDbError> {
        self.validate("prepare")?;
        self.open()?;
        let (conn, cmd) = self.parts()?;
        conn.prepare(cmd)?;
        cmd.mark_prepared();
        Ok(self)
    }

    /// # Errors
    /// See [`prepare`](Self::prepare).
    pub async fn prepare_async(&mut self) -> Result<&mut Self, SqlFluentDbError> {
        self.prepare_async_with_cancel(&CancellationToken::new())
            .await
    }

    /// # Errors
    /// See [`prepare`](Self::prepare); returns `Cancelled` if `cancel` fires first.
    pub async fn prepare_async_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<&mut Self, SqlFluentDbError> {
        self.validate("prepare")?;
        self.open_async(cancel).await?;
        let (conn, cmd) = self.parts()?;
        conn.prepare_async(cmd, cancel).await?;
        cmd.mark_prepared();
        Ok(self)
    }

    fn validate(&self, operation: &'static str) -> Result<(), SqlFluentDbError> {
        self.ensure_live()?;
        self.command.check()?;
        tracing::debug!(
            operation,
            provider = self.provider.name(),
            text = self.command.text(),
            kind = ?self.command.kind(),
            parameters = self.command.parameters().len(),
            "executing command"
        );
        Ok(())
    }

    fn reader_behavior(&self, requested: CommandBehavior) -> CommandBehavior {
        if self.mode.holds_connection() {
            requested
        } else {
            requested.with_close_connection(true)
        }
    }

    fn non_query(&mut self) -> Result<u64, SqlFluentDbError> {
        self.open()?;
        let (conn, cmd) = self.parts()?;
        let result = conn.execute_non_query(cmd);
        result.map_err(|err| self.classify(err))
    }

    async fn non_query_async(&mut self, cancel: &CancellationToken) -> Result<u64, SqlFluentDbError> {
        self.open_async(cancel).await?;
        let (conn, cmd) = self.parts()?;
        let result = conn.execute_non_query_async(cmd, cancel).await;
        result.map_err(|err| self.classify(err))
    }

    fn scalar_value(&mut self) -> Result<DbValue, SqlFluentDbError> {
        self.validate("scalar")?;
        let result = self.fetch_scalar();
        self.finish(result)
    }

    async fn scalar_value_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<DbValue, SqlFluentDbError> {
        self.validate("scalar")?;
        let result = self.fetch_scalar_async(cancel).await;
        self.finish_async(result).await
    }

    fn fetch_scalar(&mut self) -> Result<DbValue, SqlFluentDbError> {
        self.open()?;
        let (conn, cmd) = self.parts()?;
        let result = conn.execute_scalar(cmd);
        result.map_err(|err| self.classify(err))
    }

    async fn fetch_scalar_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<DbValue, SqlFluentDbError> {
        self.open_async(cancel).await?;
        let (conn, cmd) = self.parts()?;
        let result = conn.execute_scalar_async(cmd, cancel).await;
        result.map_err(|err| self.classify(err))
    }

    fn stream_rows(
        &mut self,
        sink: &mut dyn RowSink,
        behavior: CommandBehavior,
    ) -> Result<(), SqlFluentDbError> {
        self.open()?;
        let (conn, cmd) = self.parts()?;
        let result = conn.execute_reader(cmd, behavior, sink);
        result.map_err(|err| self.classify(err))
    }

    async fn stream_rows_async<S, F, O>(
        &mut self,
        setter: S,
        mut filler: F,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError>
    where
        S: FnOnce(&ResultSchema) -> Result<O, SqlFluentDbError> + Send,
        F: FnMut(&O, &dyn Record) -> Result<(), SqlFluentDbError> + Send,
        O: Send,
    {
        self.open_async(cancel).await?;
        let (conn, cmd) = self.parts()?;
        let cursor = conn.execute_reader_async(cmd, behavior, cancel).await;
        let mut cursor = cursor.map_err(|err| self.classify(err))?;
        let columns = setter(cursor.schema())?;
        loop {
            let advanced = cursor.advance(cancel).await;
            if !advanced.map_err(|err| self.classify(err))? {
                break;
            }
            if let Some(record) = cursor.current() {
                filler(&columns, record)?;
            }
            if behavior.single_row {
                break;
            }
        }
        Ok(())
    }

    fn finish<T>(
        &mut self,
        result: Result<T, SqlFluentDbError>,
    ) -> Result<T, SqlFluentDbError> {
        let cleanup = self.close();
        merge_cleanup(result, cleanup)
    }

    async fn finish_async<T>(
        &mut self,
        result: Result<T, SqlFluentDbError>,
    ) -> Result<T, SqlFluentDbError> {
        let cleanup = self.close_async().await;
        merge_cleanup(result, cleanup)
    }
}
