//! Statement execution against a locked `rusqlite` connection.
//!
//! Everything here is synchronous; the async adapter calls into it from the blocking pool.

use rusqlite::{CachedStatement, Connection, Row};

use crate::command::{Command, CommandBehavior, CommandKind};
use crate::error::SqlFluentDbError;
use crate::results::{Record, ResultSchema, RowSink};
use crate::types::DbValue;

use super::cursor::{RowSender, SchemaSender};
use super::params::{apply_outputs, bind_parameters, sqlite_to_db_value};

/// Live row handed to a [`RowSink`] while the statement is still stepping.
struct SqliteRecord<'a> {
    schema: &'a ResultSchema,
    row: &'a Row<'a>,
}

impl Record for SqliteRecord<'_> {
    fn schema(&self) -> &ResultSchema {
        self.schema
    }

    fn value(&self, ordinal: usize) -> Result<DbValue, SqlFluentDbError> {
        if ordinal >= self.schema.len() {
            return Err(SqlFluentDbError::out_of_range(
                "ordinal",
                format!("column {ordinal} does not exist"),
            ));
        }
        Ok(sqlite_to_db_value(self.row.get_ref(ordinal)?))
    }
}

/// Compile (or fetch from the connection's statement cache) and bind the command.
fn prepare_bound<'c>(
    conn: &'c Connection,
    command: &Command,
) -> Result<CachedStatement<'c>, SqlFluentDbError> {
    ensure_text(command)?;
    let mut stmt = conn.prepare_cached(command.text())?;
    bind_parameters(&mut stmt, command)?;
    Ok(stmt)
}

fn ensure_text(command: &Command) -> Result<(), SqlFluentDbError> {
    match command.kind() {
        CommandKind::Text => Ok(()),
        kind => Err(SqlFluentDbError::Unsupported(format!(
            "sqlite cannot run {kind:?} commands"
        ))),
    }
}

pub(crate) fn prepare(conn: &Connection, command: &Command) -> Result<(), SqlFluentDbError> {
    ensure_text(command)?;
    conn.prepare_cached(command.text())?;
    Ok(())
}

fn column_names(stmt: &CachedStatement<'_>) -> Vec<String> {
    stmt.column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect()
}

fn read_row(row: &Row<'_>, width: usize) -> Result<Vec<DbValue>, SqlFluentDbError> {
    (0..width)
        .map(|i| -> Result<DbValue, SqlFluentDbError> { Ok(sqlite_to_db_value(row.get_ref(i)?)) })
        .collect()
}

/// Run the statement to completion. Returns the affected-row count and the first returned
/// row, if any, after filling output parameters from that row.
fn run_to_completion(
    conn: &Connection,
    command: &mut Command,
) -> Result<(u64, Option<Vec<DbValue>>), SqlFluentDbError> {
    let mut stmt = prepare_bound(conn, command)?;
    if stmt.column_count() == 0 {
        let affected = stmt.raw_execute()?;
        return Ok((u64::try_from(affected).unwrap_or(u64::MAX), None));
    }

    let columns = column_names(&stmt);
    let readonly = stmt.readonly();
    let mut first = None;
    {
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            if first.is_none() {
                first = Some(read_row(row, columns.len())?);
                if readonly {
                    break;
                }
            }
        }
    }
    let affected = if readonly {
        0
    } else {
        u64::try_from(conn.changes()).unwrap_or(u64::MAX)
    };
    drop(stmt);
    if let Some(values) = &first {
        apply_outputs(command, &columns, values);
    }
    Ok((affected, first))
}

pub(crate) fn execute_non_query(
    conn: &Connection,
    command: &mut Command,
) -> Result<u64, SqlFluentDbError> {
    run_to_completion(conn, command).map(|(affected, _)| affected)
}

pub(crate) fn execute_scalar(
    conn: &Connection,
    command: &mut Command,
) -> Result<DbValue, SqlFluentDbError> {
    let (_, first) = run_to_completion(conn, command)?;
    Ok(first
        .and_then(|row| row.into_iter().next())
        .unwrap_or_default())
}

pub(crate) fn execute_reader(
    conn: &Connection,
    command: &Command,
    behavior: CommandBehavior,
    sink: &mut dyn RowSink,
) -> Result<(), SqlFluentDbError> {
    let mut stmt = prepare_bound(conn, command)?;
    let schema = ResultSchema::new(column_names(&stmt));
    sink.columns(&schema)?;
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let record = SqliteRecord {
            schema: &schema,
            row,
        };
        if !sink.row(&record)? || behavior.single_row {
            break;
        }
    }
    Ok(())
}

/// Step the statement on the calling (blocking) thread, sending the columns first and then
/// one row per message. Stops once the receiver is dropped, after the first row when
/// `single_row` is set, or after sending a step error.
pub(crate) fn stream_rows(
    conn: &Connection,
    command: &Command,
    behavior: CommandBehavior,
    columns: SchemaSender,
    rows: &RowSender,
) {
    let mut stmt = match prepare_bound(conn, command) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = columns.send(Err(err));
            return;
        }
    };
    let schema = ResultSchema::new(column_names(&stmt));
    let width = schema.len();
    if columns.send(Ok(schema)).is_err() {
        return;
    }
    let mut cursor = stmt.raw_query();
    loop {
        let next = match cursor.next() {
            Ok(Some(row)) => read_row(row, width),
            Ok(None) => break,
            Err(err) => Err(err.into()),
        };
        let failed = next.is_err();
        if rows.blocking_send(next).is_err() || failed || behavior.single_row {
            break;
        }
    }
}
