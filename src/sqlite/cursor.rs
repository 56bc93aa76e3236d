//! Async row cursor fed by a statement stepping on the blocking pool.
//!
//! The blocking task owns the connection lock for the life of the statement. It sends the
//! column layout over a oneshot and then one row per message over a bounded channel, so at
//! most [`ROW_CHANNEL_CAPACITY`] rows are buffered ahead of the consumer.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::InterruptHandle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::SqlFluentDbError;
use crate::results::{BufferedRecord, Record, ResultSchema, RowCursor};
use crate::types::DbValue;

pub(crate) const ROW_CHANNEL_CAPACITY: usize = 64;

pub(crate) type SchemaSender = oneshot::Sender<Result<ResultSchema, SqlFluentDbError>>;
pub(crate) type RowSender = mpsc::Sender<Result<Vec<DbValue>, SqlFluentDbError>>;
type RowReceiver = mpsc::Receiver<Result<Vec<DbValue>, SqlFluentDbError>>;

pub(crate) struct SqliteRowCursor {
    schema: ResultSchema,
    rows: RowReceiver,
    interrupt: Arc<InterruptHandle>,
    current: Option<BufferedRecord>,
    finished: bool,
}

impl SqliteRowCursor {
    pub(crate) fn new(
        schema: ResultSchema,
        rows: RowReceiver,
        interrupt: Arc<InterruptHandle>,
    ) -> Self {
        Self {
            schema,
            rows,
            interrupt,
            current: None,
            finished: false,
        }
    }

    fn stop(&mut self) {
        self.current = None;
        self.finished = true;
    }
}

#[async_trait]
impl RowCursor for SqliteRowCursor {
    fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    async fn advance(&mut self, cancel: &CancellationToken) -> Result<bool, SqlFluentDbError> {
        if self.finished {
            return Ok(false);
        }
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.interrupt.interrupt();
                self.stop();
                tracing::debug!("sqlite reader interrupted by cancellation");
                return Err(SqlFluentDbError::Cancelled);
            }
            next = self.rows.recv() => next,
        };
        match next {
            Some(Ok(values)) => {
                self.current = Some(BufferedRecord::new(self.schema.clone(), values));
                Ok(true)
            }
            Some(Err(err)) => {
                self.stop();
                Err(err)
            }
            None => {
                self.stop();
                Ok(false)
            }
        }
    }

    fn current(&self) -> Option<&dyn Record> {
        self.current.as_ref().map(|r| r as &dyn Record)
    }
}

impl Drop for SqliteRowCursor {
    // Abandoned mid-scan: stop the statement instead of letting it step until its next send.
    fn drop(&mut self) {
        if !self.finished {
            self.interrupt.interrupt();
        }
    }
}
