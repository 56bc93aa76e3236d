use clap::ValueEnum;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::SqlExecutor;
use crate::error::SqlFluentDbError;
use crate::provider::{ProviderConnection, TransactionOp};

/// Policy for when the executor's connection is closed.
///
/// Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
pub enum ConnectionMode {
    /// Close the connection after every statement.
    #[default]
    Normal,
    /// Hold the connection open; the caller manages transaction boundaries.
    Transactional,
    /// Hold the connection open so several result sets can be consumed.
    MultipleResultSets,
}

impl ConnectionMode {
    /// Whether statements leave the connection open for the next one.
    #[must_use]
    pub fn holds_connection(self) -> bool {
        !matches!(self, ConnectionMode::Normal)
    }
}

impl SqlExecutor {
    /// Create the connection if needed and open it if it is not already open.
    ///
    /// # Errors
    /// Returns the provider's connection error unchanged; open failures are never
    /// reclassified as constraint violations.
    pub fn open(&mut self) -> Result<(), SqlFluentDbError> {
        self.ensure_live()?;
        let conn = self.connection_slot()?;
        if !conn.is_open() {
            conn.open()?;
            tracing::debug!(provider = self.provider.name(), mode = ?self.mode, "connection opened");
        }
        Ok(())
    }

    /// Async [`open`](Self::open).
    ///
    /// # Errors
    /// Returns `Cancelled` if `cancel` has fired, or the provider's connection error.
    pub async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), SqlFluentDbError> {
        self.ensure_live()?;
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        let conn = self.connection_slot()?;
        if !conn.is_open() {
            conn.open_async(cancel).await?;
            tracing::debug!(provider = self.provider.name(), mode = ?self.mode, "connection opened");
        }
        Ok(())
    }

    /// Close the connection when the mode is [`ConnectionMode::Normal`]; otherwise a no-op.
    ///
    /// # Errors
    /// Returns an error if the provider fails to close the connection.
    pub fn close(&mut self) -> Result<(), SqlFluentDbError> {
        if self.mode.holds_connection() {
            return Ok(());
        }
        self.close_connection()
    }

    /// # Errors
    /// Returns an error if the provider fails to close the connection.
    pub async fn close_async(&mut self) -> Result<(), SqlFluentDbError> {
        if self.mode.holds_connection() {
            return Ok(());
        }
        self.close_connection_async().await
    }

    /// Start a transaction on the held connection, opening it first if necessary.
    ///
    /// # Errors
    /// Returns `InvalidState` outside [`ConnectionMode::Transactional`], or the provider's
    /// error (classified when it carries a constraint code).
    pub fn begin_transaction(&mut self) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.open()?;
        self.run_transaction(TransactionOp::Begin)
    }

    /// # Errors
    /// See [`begin_transaction`](Self::begin_transaction); also `InvalidState` if no
    /// connection is open.
    pub fn commit(&mut self) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.run_transaction(TransactionOp::Commit)
    }

    /// # Errors
    /// See [`commit`](Self::commit).
    pub fn rollback(&mut self) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.run_transaction(TransactionOp::Rollback)
    }

    /// # Errors
    /// See [`begin_transaction`](Self::begin_transaction); also `Cancelled`.
    pub async fn begin_transaction_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.open_async(cancel).await?;
        self.run_transaction_async(TransactionOp::Begin, cancel).await
    }

    /// # Errors
    /// See [`commit`](Self::commit); also `Cancelled`.
    pub async fn commit_async(&mut self, cancel: &CancellationToken) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.run_transaction_async(TransactionOp::Commit, cancel).await
    }

    /// # Errors
    /// See [`rollback`](Self::rollback); also `Cancelled`.
    pub async fn rollback_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        self.require_transactional()?;
        self.run_transaction_async(TransactionOp::Rollback, cancel).await
    }

    /// Close the connection regardless of mode, if it is open.
    pub(crate) fn close_connection(&mut self) -> Result<(), SqlFluentDbError> {
        match self.connection.as_deref_mut() {
            Some(conn) if conn.is_open() => {
                conn.close()?;
                tracing::debug!(provider = self.provider.name(), "connection closed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) async fn close_connection_async(&mut self) -> Result<(), SqlFluentDbError> {
        match self.connection.as_deref_mut() {
            Some(conn) if conn.is_open() => {
                conn.close_async().await?;
                tracing::debug!(provider = self.provider.name(), "connection closed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn connection_slot(&mut self) -> Result<&mut dyn ProviderConnection, SqlFluentDbError> {
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => self.provider.connect(&self.connection_string)?,
        };
        Ok(self.connection.insert(conn).as_mut())
    }

    fn require_transactional(&self) -> Result<(), SqlFluentDbError> {
        self.ensure_live()?;
        if self.mode != ConnectionMode::Transactional {
            return Err(SqlFluentDbError::InvalidState(format!(
                "transactions require transactional connection mode, executor is {:?}",
                self.mode
            )));
        }
        Ok(())
    }

    fn run_transaction(&mut self, op: TransactionOp) -> Result<(), SqlFluentDbError> {
        let (conn, _) = self.parts()?;
        if !conn.is_open() {
            return Err(SqlFluentDbError::InvalidState("connection is not open".into()));
        }
        let result = conn.transaction(op);
        tracing::debug!(?op, ok = result.is_ok(), "transaction boundary");
        result.map_err(|err| self.classify(err))
    }

    async fn run_transaction_async(
        &mut self,
        op: TransactionOp,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        let (conn, _) = self.parts()?;
        if !conn.is_open() {
            return Err(SqlFluentDbError::InvalidState("connection is not open".into()));
        }
        let result = conn.transaction_async(op, cancel).await;
        tracing::debug!(?op, ok = result.is_ok(), "transaction boundary");
        result.map_err(|err| self.classify(err))
    }
}
