use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SqlFluentDbError;
use crate::scalar::{FromDbValue, convert_scalar};
use crate::types::DbValue;

/// Column layout of an open result cursor.
///
/// Cheap to clone: names and the lookup cache are shared.
#[derive(Debug, Clone, Default)]
pub struct ResultSchema {
    column_names: Arc<Vec<String>>,
    // Internal cache for faster column lookups
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl ResultSchema {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        let cache = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<HashMap<_, _>>();
        Self {
            column_names: Arc::new(column_names),
            column_index_cache: Arc::new(cache),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column_names.is_empty()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn name(&self, ordinal: usize) -> Option<&str> {
        self.column_names.get(ordinal).map(String::as_str)
    }

    /// Ordinal of a column, exact match first, then case-insensitive.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::OutOfRange` if no column has that name.
    pub fn ordinal(&self, column_name: &str) -> Result<usize, SqlFluentDbError> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Ok(idx);
        }
        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
            .ok_or_else(|| {
                SqlFluentDbError::out_of_range(column_name, "no column with that name in the result")
            })
    }
}

/// Read access to the current row of a cursor.
pub trait Record {
    fn schema(&self) -> &ResultSchema;

    /// Value at `ordinal`.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::OutOfRange` for a bad ordinal, or a provider error if the
    /// driver cannot decode the value.
    fn value(&self, ordinal: usize) -> Result<DbValue, SqlFluentDbError>;
}

impl dyn Record + '_ {
    /// Typed, nullable value at `ordinal`.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::Cast` if the value is not convertible to `T`.
    pub fn get<T: FromDbValue>(&self, ordinal: usize) -> Result<Option<T>, SqlFluentDbError> {
        convert_scalar(self.value(ordinal)?)
    }

    /// Typed value by column name.
    ///
    /// # Errors
    /// Returns an error if the column is missing or the value is not convertible.
    pub fn get_by_name<T: FromDbValue>(&self, column: &str) -> Result<Option<T>, SqlFluentDbError> {
        let ordinal = self.schema().ordinal(column)?;
        self.get(ordinal)
    }

    /// # Errors
    /// Returns an error if the ordinal is out of range or the driver fails to decode.
    pub fn is_null(&self, ordinal: usize) -> Result<bool, SqlFluentDbError> {
        Ok(self.value(ordinal)?.is_null())
    }
}

/// Target a provider streams rows into on the synchronous read path.
pub trait RowSink {
    /// Called once, before any row, with the cursor's columns.
    ///
    /// # Errors
    /// Errors abort the read and propagate to the caller.
    fn columns(&mut self, schema: &ResultSchema) -> Result<(), SqlFluentDbError>;

    /// Called once per row. Return `Ok(false)` to stop reading.
    ///
    /// # Errors
    /// Errors abort the read and propagate to the caller.
    fn row(&mut self, record: &dyn Record) -> Result<bool, SqlFluentDbError>;
}

/// Forward-only cursor returned by the asynchronous read path.
#[async_trait]
pub trait RowCursor: Send {
    fn schema(&self) -> &ResultSchema;

    /// Advance to the next row. `Ok(false)` once the cursor is exhausted.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::Cancelled` if `cancel` fires, or a provider error.
    async fn advance(&mut self, cancel: &CancellationToken) -> Result<bool, SqlFluentDbError>;

    /// The row the cursor is positioned on, if any.
    fn current(&self) -> Option<&dyn Record>;
}

/// One materialised row.
#[derive(Debug, Clone)]
pub struct BufferedRecord {
    schema: ResultSchema,
    values: Vec<DbValue>,
}

impl BufferedRecord {
    #[must_use]
    pub fn new(schema: ResultSchema, values: Vec<DbValue>) -> Self {
        Self { schema, values }
    }

    #[must_use]
    pub fn values(&self) -> &[DbValue] {
        &self.values
    }
}

impl Record for BufferedRecord {
    fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    fn value(&self, ordinal: usize) -> Result<DbValue, SqlFluentDbError> {
        self.values.get(ordinal).cloned().ok_or_else(|| {
            SqlFluentDbError::out_of_range("ordinal", format!("column {ordinal} does not exist"))
        })
    }
}

/// Cursor over rows that are already in memory, such as scripted results.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    schema: ResultSchema,
    pending: VecDeque<Vec<DbValue>>,
    current: Option<BufferedRecord>,
}

impl BufferedCursor {
    #[must_use]
    pub fn new(schema: ResultSchema, rows: Vec<Vec<DbValue>>) -> Self {
        Self {
            schema,
            pending: rows.into(),
            current: None,
        }
    }
}

#[async_trait]
impl RowCursor for BufferedCursor {
    fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    async fn advance(&mut self, cancel: &CancellationToken) -> Result<bool, SqlFluentDbError> {
        if cancel.is_cancelled() {
            return Err(SqlFluentDbError::Cancelled);
        }
        self.current = self
            .pending
            .pop_front()
            .map(|values| BufferedRecord::new(self.schema.clone(), values));
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&dyn Record> {
        self.current.as_ref().map(|r| r as &dyn Record)
    }
}
