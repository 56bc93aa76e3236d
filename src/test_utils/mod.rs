//! A scripted provider for exercising the executor without a database.
//!
//! Queue the outcome of each statement up front, run the executor, then inspect the call
//! counters:
//!
//! ```rust
//! use std::sync::Arc;
//! use sql_fluent::prelude::*;
//! use sql_fluent::test_utils::{ScriptedProvider, Step};
//!
//! let provider = ScriptedProvider::new();
//! provider.push(Step::affected(3));
//! let mut exec = SqlExecutor::new(Arc::new(provider.clone()), "scripted", ConnectionMode::Normal);
//! let n = exec.set_sql("DELETE FROM t WHERE a = @a")?.add_in_parameter("@a", 1)?.execute()?;
//! assert_eq!(n, 3);
//! assert_eq!(provider.counters().closes, 1);
//! # Ok::<(), SqlFluentDbError>(())
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandBehavior};
use crate::constraint::ConstraintCodes;
use crate::error::{ProviderError, SqlFluentDbError};
use crate::provider::{Capability, Provider, ProviderConnection, TransactionOp};
use crate::results::{BufferedCursor, BufferedRecord, ResultSchema, RowCursor, RowSink};
use crate::types::DbValue;

/// Constraint codes the scripted provider reports unless overridden.
pub const SCRIPTED_CODES: ConstraintCodes = ConstraintCodes {
    duplicate_key: 2601,
    foreign_key: 547,
    primary_key: 2627,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Affected(u64),
    Scalar(DbValue),
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<DbValue>>,
    },
    /// Fail with a native error carrying `code`.
    Fail { code: i32, message: String },
}

/// What the next statement does.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub outcome: Outcome,
    /// Values written to output parameters after a successful run.
    pub outputs: Vec<(String, DbValue)>,
    /// Async paths wait this long (honouring cancellation) before completing.
    pub delay: Option<Duration>,
}

impl Step {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            outputs: Vec::new(),
            delay: None,
        }
    }

    #[must_use]
    pub fn affected(rows: u64) -> Self {
        Self::new(Outcome::Affected(rows))
    }

    #[must_use]
    pub fn scalar(value: impl Into<DbValue>) -> Self {
        Self::new(Outcome::Scalar(value.into()))
    }

    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<DbValue>>) -> Self {
        Self::new(Outcome::Rows {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows,
        })
    }

    #[must_use]
    pub fn fail(code: i32, message: &str) -> Self {
        Self::new(Outcome::Fail {
            code,
            message: message.to_owned(),
        })
    }

    #[must_use]
    pub fn with_output(mut self, name: &str, value: impl Into<DbValue>) -> Self {
        self.outputs.push((name.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Calls observed by a [`ScriptedProvider`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub connects: usize,
    pub opens: usize,
    pub closes: usize,
    pub prepares: usize,
    pub executions: usize,
    pub transactions: Vec<TransactionOp>,
}

#[derive(Debug, Default)]
struct State {
    steps: VecDeque<Step>,
    counters: Counters,
    last_command: Option<Command>,
    open_failure: Option<String>,
}

/// Provider whose statements follow a queue of [`Step`]s. Clones share the queue and the
/// counters.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<State>>,
    codes: ConstraintCodes,
    capabilities: Vec<Capability>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            codes: SCRIPTED_CODES,
            capabilities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_codes(mut self, codes: ConstraintCodes) -> Self {
        self.codes = codes;
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Make every open fail with a connection error.
    #[must_use]
    pub fn failing_open(self, message: &str) -> Self {
        lock(&self.state).open_failure = Some(message.to_owned());
        self
    }

    pub fn push(&self, step: Step) -> &Self {
        lock(&self.state).steps.push_back(step);
        self
    }

    #[must_use]
    pub fn counters(&self) -> Counters {
        lock(&self.state).counters.clone()
    }

    /// The command as the provider last saw it.
    #[must_use]
    pub fn last_command(&self) -> Option<Command> {
        lock(&self.state).last_command.clone()
    }

    #[must_use]
    pub fn pending_steps(&self) -> usize {
        lock(&self.state).steps.len()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn ProviderConnection>, SqlFluentDbError> {
        lock(&self.state).counters.connects += 1;
        Ok(Box::new(ScriptedConnection {
            state: Arc::clone(&self.state),
            connection_string: connection_string.to_owned(),
            open: false,
        }))
    }

    fn constraint_codes(&self) -> ConstraintCodes {
        self.codes
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

struct ScriptedConnection {
    state: Arc<Mutex<State>>,
    connection_string: String,
    open: bool,
}

impl ScriptedConnection {
    fn ensure_open(&self) -> Result<(), SqlFluentDbError> {
        if self.open {
            Ok(())
        } else {
            Err(SqlFluentDbError::InvalidState("scripted connection is not open".into()))
        }
    }

    fn next_step(&self, command: &Command) -> Result<Step, SqlFluentDbError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.counters.executions += 1;
        state.last_command = Some(command.clone());
        Ok(state
            .steps
            .pop_front()
            .unwrap_or_else(|| Step::affected(0)))
    }

    fn complete(step: Step, command: &mut Command) -> Result<Outcome, SqlFluentDbError> {
        if let Outcome::Fail { code, message } = step.outcome {
            return Err(ProviderError::Native { code, message }.into());
        }
        for (name, value) in step.outputs {
            if let Some(parameter) = command.get_mut(&name) {
                parameter.set_output(value);
            }
        }
        Ok(step.outcome)
    }

    async fn wait(step: &Step, cancel: &CancellationToken) -> Result<(), SqlFluentDbError> {
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        if let Some(delay) = step.delay {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SqlFluentDbError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    fn affected(outcome: &Outcome) -> u64 {
        match outcome {
            Outcome::Affected(n) => *n,
            _ => 0,
        }
    }

    fn scalar(outcome: Outcome) -> DbValue {
        match outcome {
            Outcome::Scalar(value) => value,
            Outcome::Rows { rows, .. } => rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .unwrap_or_default(),
            _ => DbValue::Null,
        }
    }

    fn result_set(
        outcome: Outcome,
        behavior: CommandBehavior,
    ) -> (ResultSchema, Vec<Vec<DbValue>>) {
        match outcome {
            Outcome::Rows { columns, mut rows } => {
                if behavior.single_row {
                    rows.truncate(1);
                }
                (ResultSchema::new(columns), rows)
            }
            _ => (ResultSchema::default(), Vec::new()),
        }
    }
}

#[async_trait]
impl ProviderConnection for ScriptedConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), SqlFluentDbError> {
        let mut state = lock(&self.state);
        if self.connection_string.trim().is_empty() {
            return Err(ProviderError::Connection("connection string is empty".into()).into());
        }
        if let Some(message) = &state.open_failure {
            return Err(ProviderError::Connection(message.clone()).into());
        }
        state.counters.opens += 1;
        self.open = true;
        Ok(())
    }

    async fn open_async(&mut self, cancel: &CancellationToken) -> Result<(), SqlFluentDbError> {
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        self.open()
    }

    fn close(&mut self) -> Result<(), SqlFluentDbError> {
        lock(&self.state).counters.closes += 1;
        self.open = false;
        Ok(())
    }

    fn prepare(&mut self, command: &Command) -> Result<(), SqlFluentDbError> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.counters.prepares += 1;
        state.last_command = Some(command.clone());
        Ok(())
    }

    async fn prepare_async(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<(), SqlFluentDbError> {
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        self.prepare(command)
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<u64, SqlFluentDbError> {
        let step = self.next_step(command)?;
        Ok(Self::affected(&Self::complete(step, command)?))
    }

    async fn execute_non_query_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SqlFluentDbError> {
        let step = self.next_step(command)?;
        Self::wait(&step, cancel).await?;
        Ok(Self::affected(&Self::complete(step, command)?))
    }

    fn execute_scalar(&mut self, command: &mut Command) -> Result<DbValue, SqlFluentDbError> {
        let step = self.next_step(command)?;
        Ok(Self::scalar(Self::complete(step, command)?))
    }

    async fn execute_scalar_async(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<DbValue, SqlFluentDbError> {
        let step = self.next_step(command)?;
        Self::wait(&step, cancel).await?;
        Ok(Self::scalar(Self::complete(step, command)?))
    }

    fn execute_reader(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        sink: &mut dyn RowSink,
    ) -> Result<(), SqlFluentDbError> {
        let step = self.next_step(command)?;
        let mut scratch = command.clone();
        let (schema, rows) = Self::result_set(Self::complete(step, &mut scratch)?, behavior);
        sink.columns(&schema)?;
        for values in rows {
            let record = BufferedRecord::new(schema.clone(), values);
            if !sink.row(&record)? {
                break;
            }
        }
        Ok(())
    }

    async fn execute_reader_async(
        &mut self,
        command: &Command,
        behavior: CommandBehavior,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn RowCursor>, SqlFluentDbError> {
        let step = self.next_step(command)?;
        Self::wait(&step, cancel).await?;
        let mut scratch = command.clone();
        let (schema, rows) = Self::result_set(Self::complete(step, &mut scratch)?, behavior);
        Ok(Box::new(BufferedCursor::new(schema, rows)))
    }

    fn transaction(&mut self, op: TransactionOp) -> Result<(), SqlFluentDbError> {
        self.ensure_open()?;
        lock(&self.state).counters.transactions.push(op);
        Ok(())
    }
}
