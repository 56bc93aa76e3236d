use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{InterruptHandle, OpenFlags};
use tokio::sync::{mpsc, oneshot};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandBehavior};
use crate::error::{ProviderError, SqlFluentDbError};
use crate::provider::{ProviderConnection, TransactionOp};
use crate::results::{RowCursor, RowSink};
use crate::types::DbValue;

use super::config::SqliteOptions;
use super::cursor::{ROW_CHANNEL_CAPACITY, SqliteRowCursor};
use super::query;

type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Handles to an open database: the connection itself and the handle used to interrupt a
/// statement running on the blocking pool.
#[derive(Clone)]
struct OpenHandle {
    conn: SharedSqliteConnection,
    interrupt: Arc<InterruptHandle>,
}

/// One `SQLite` connection owned by an executor.
///
/// Synchronous calls lock the connection on the calling thread. Async calls move the work to
/// `tokio`'s blocking pool and race it against the cancellation token; on cancellation the
/// running statement is interrupted and the call returns [`SqlFluentDbError::Cancelled`].
/// Async reads keep stepping on the blocking pool and hand rows to the cursor one at a time.
pub struct SqliteConnection {
    connection_string: String,
    handle: Option<OpenHandle>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            handle: None,
        }
    }

    fn handle(&self) -> Result<OpenHandle, SqlFluentDbError> {
        self.handle
            .clone()
            .ok_or_else(|| SqlFluentDbError::InvalidState("sqlite connection is not open".into()))
    }

    fn with_connection<R>(
        &self,
        func: impl FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFluentDbError>,
    ) -> Result<R, SqlFluentDbError> {
        let handle = self.handle()?;
        let mut guard = lock(&handle.conn)?;
        func(&mut guard)
    }

    async fn run_cancellable<F, R>(
        &self,
        cancel: &CancellationToken,
        func: F,
    ) -> Result<R, SqlFluentDbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFluentDbError> + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.handle()?;
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        let interrupt = Arc::clone(&handle.interrupt);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                interrupt.interrupt();
                tracing::debug!("sqlite statement interrupted by cancellation");
                Err(SqlFluentDbError::Cancelled)
            }
            result = run_blocking(handle.conn, func) => result,
        }
    }
}

fn lock(conn: &Mutex<rusqlite::Connection>) -> Result<MutexGuard<'_, rusqlite::Connection>, SqlFluentDbError> {
    conn.lock()
        .map_err(|_| ProviderError::Connection("sqlite connection lock poisoned".into()).into())
}

async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, SqlFluentDbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFluentDbError> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking(move || {
        let mut guard = lock(&conn)?;
        func(&mut guard)
    })
    .await
    .map_err(|e| {
        SqlFluentDbError::from(ProviderError::Connection(format!(
            "sqlite spawn_blocking join error: {e}"
        )))
    })?
}

fn open_connection(opts: &SqliteOptions) -> Result<rusqlite::Connection, SqlFluentDbError> {
    let conn = if opts.read_only {
        rusqlite::Connection::open_with_flags(
            &opts.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        rusqlite::Connection::open(&opts.path)?
    };
    conn.pragma_update(None, "foreign_keys", opts.foreign_keys)?;
    if let Some(timeout) = opts.busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

fn transaction_sql(op: TransactionOp) -> &'static str {
    match op {
        TransactionOp::Begin => "BEGIN",
        TransactionOp::Commit => "COMMIT",
        TransactionOp::Rollback => "ROLLBACK",
    }
}

#[async_trait]
impl ProviderConnection for SqliteConnection {
    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn open(&mut self) -> Result<(), SqlFluentDbError> {
        let opts = SqliteOptions::parse(&self.connection_string)?;
        let conn = open_connection(&opts)?;
        self.handle = Some(OpenHandle {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
        });
        Ok(())
    }

    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), SqlFluentDbError> {
        let opts = SqliteOptions::parse(&self.connection_string)?;
        let opening = spawn_blocking(move || open_connection(&opts));
        let conn = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SqlFluentDbError::Cancelled),
            joined = opening => joined.map_err(|e| {
                SqlFluentDbError::from(ProviderError::Connection(format!(
                    "sqlite spawn_blocking join error: {e}"
                )))
            })??,
        };
        self.handle = Some(OpenHandle {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), SqlFluentDbError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // A cancelled statement may still hold a clone; the last owner closes it on drop.
        if let Ok(mutex) = Arc::try_unwrap(handle.conn) {
            let conn = mutex
                .into_inner()
                .map_err(|_| ProviderError::Connection("sqlite connection lock poisoned".into()))?;
            conn.close().map_err(|(_, err)| SqlFluentDbError::from(err))?;
        }
        Ok(())
    }

    fn prepare(&mut self, command: &Command) -> Result<(), SqlFluentDbError> {
        self.with_connection(|conn| query::prepare(conn, command))
    }

    async fn prepare_async(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        let owned = command.clone();
        self.run_cancellable(cancel, move |conn| query::prepare(conn, &owned))
            .await
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64, SqlFluentDbError> {
        self.with_connection(|conn| query::execute_non_query(conn, command))
    }

    async fn execute_non_query_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SqlFluentDbError> {
        let mut owned = command.clone();
        let (affected, owned) = self
            .run_cancellable(cancel, move |conn| {
                let affected = query::execute_non_query(conn, &mut owned)?;
                Ok((affected, owned))
            })
            .await?;
        *command = owned;
        Ok(affected)
    }

    fn execute_scalar(&mut self, command: &mut Command) -> Result<DbValue, SqlFluentDbError> {
        self.with_connection(|conn| query::execute_scalar(conn, command))
    }

    async fn execute_scalar_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<DbValue, SqlFluentDbError> {
        let mut owned = command.clone();
        let (value, owned) = self
            .run_cancellable(cancel, move |conn| {
                let value = query::execute_scalar(conn, &mut owned)?;
                Ok((value, owned))
            })
            .await?;
        *command = owned;
        Ok(value)
    }

    fn execute_reader(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        sink: &mut dyn RowSink,
    ) -> Result<(), SqlFluentDbError> {
        self.with_connection(|conn| query::execute_reader(conn, command, behavior, sink))
    }

    async fn execute_reader_async(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RowCursor>, SqlFluentDbError> {
        let handle = self.handle()?;
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        let owned = command.clone();
        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let conn = handle.conn;
        spawn_blocking(move || match lock(&conn) {
            Ok(guard) => query::stream_rows(&guard, &owned, behavior, columns_tx, &rows_tx),
            Err(err) => {
                let _ = columns_tx.send(Err(err));
            }
        });

        let schema = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                handle.interrupt.interrupt();
                tracing::debug!("sqlite reader interrupted by cancellation");
                return Err(SqlFluentDbError::Cancelled);
            }
            columns = columns_rx => columns.map_err(|_| {
                SqlFluentDbError::from(ProviderError::Connection(
                    "sqlite reader task ended before reporting columns".into(),
                ))
            })??,
        };
        Ok(Box::new(SqliteRowCursor::new(schema, rows_rx, handle.interrupt)))
    }

    fn transaction(&mut self, op: TransactionOp) -> Result<(), SqlFluentDbError> {
        self.with_connection(|conn| Ok(conn.execute_batch(transaction_sql(op))?))
    }

    async fn transaction_async(
        &mut self,
        op: TransactionOp,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        self.run_cancellable(cancel, move |conn| Ok(conn.execute_batch(transaction_sql(op))?))
            .await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("connection_string", &self.connection_string)
            .field("open", &self.handle.is_some())
            .finish()
    }
}
