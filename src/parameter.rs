use chrono::NaiveDateTime;

use crate::error::SqlFluentDbError;
use crate::scalar::FromDbValue;
use crate::types::{DbValue, Decimal, NumericType};

/// Name of the reserved parameter that receives a stored procedure's return code.
pub const RETURN_PARAMETER: &str = "RETURN_VALUE";

/// String parameters larger than this are registered as variable-length by default.
pub const DEFAULT_VARIABLE_LENGTH_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    /// Whether the provider sends this parameter's value to the database.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InputOutput)
    }

    /// Whether the provider writes a value back after execution.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Direction::Output | Direction::InputOutput | Direction::ReturnValue
        )
    }
}

/// Type descriptor of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Numeric(NumericType),
    Decimal { precision: u8, scale: u8 },
    String { size: usize, variable: bool },
    Binary,
    Xml,
    /// Table-valued parameter bound to a user-defined table type.
    Table { type_name: String },
}

/// Rows handed to a table-valued parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableValue {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl TableValue {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; it must have one value per column.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::OutOfRange` when the row width does not match the columns.
    pub fn push_row(&mut self, row: Vec<DbValue>) -> Result<(), SqlFluentDbError> {
        if row.len() != self.columns.len() {
            return Err(SqlFluentDbError::out_of_range(
                "row",
                format!(
                    "expected {} values, got {}",
                    self.columns.len(),
                    row.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }
}

/// A named, typed statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub direction: Direction,
    pub kind: ParamKind,
    pub value: DbValue,
    /// Rows for table-valued parameters; empty for every other kind.
    pub table: Option<TableValue>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, direction: Direction, kind: ParamKind, value: DbValue) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            value,
            table: None,
        }
    }

    /// Parameter name without a leading `@`, `:`, `$` or `?` marker.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }

    #[must_use]
    pub fn is_return(&self) -> bool {
        self.direction == Direction::ReturnValue
    }

    /// Store a value written back by the provider, coerced to the declared kind when it
    /// converts cleanly. Anything that does not convert is kept as returned so the caller's
    /// typed accessor reports the cast failure.
    pub fn set_output(&mut self, value: DbValue) {
        self.value = coerce(&self.kind, value);
    }
}

fn coerce(kind: &ParamKind, value: DbValue) -> DbValue {
    if value.is_null() {
        return value;
    }
    let converted = match kind {
        ParamKind::Numeric(numeric) => match numeric {
            NumericType::Boolean => bool::from_db_value(value.clone()).map(DbValue::Bool),
            NumericType::Byte => u8::from_db_value(value.clone()).map(DbValue::Byte),
            NumericType::Int16 => i16::from_db_value(value.clone()).map(DbValue::Int16),
            NumericType::Int32 => i32::from_db_value(value.clone()).map(DbValue::Int32),
            NumericType::Int64 => i64::from_db_value(value.clone()).map(DbValue::Int64),
            NumericType::Single => f32::from_db_value(value.clone()).map(DbValue::Single),
            NumericType::Double => f64::from_db_value(value.clone()).map(DbValue::Double),
            NumericType::DateTime => {
                NaiveDateTime::from_db_value(value.clone()).map(DbValue::DateTime)
            }
        },
        ParamKind::Decimal { scale, .. } => Decimal::from_db_value(value.clone())
            .map(|d| DbValue::Decimal(d.round_dp(u32::from(*scale)))),
        ParamKind::Xml => match value {
            DbValue::Text(text) => return DbValue::Xml(text),
            other => return other,
        },
        ParamKind::String { .. } | ParamKind::Binary | ParamKind::Table { .. } => return value,
    };
    converted.unwrap_or(value)
}

/// Strip a single placeholder prefix from a parameter or column name.
#[must_use]
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix(['@', ':', '$', '?']).unwrap_or(name)
}

pub(crate) fn check_name(name: &str) -> Result<(), SqlFluentDbError> {
    if name.trim().is_empty() {
        return Err(SqlFluentDbError::missing("parameter name"));
    }
    Ok(())
}

pub(crate) fn check_size(name: &str, size: usize) -> Result<(), SqlFluentDbError> {
    check_name(name)?;
    if size == 0 {
        return Err(SqlFluentDbError::out_of_range(
            "size",
            format!("string parameter {name} must have a size greater than zero"),
        ));
    }
    Ok(())
}

pub(crate) fn check_precision(name: &str, precision: u8, scale: u8) -> Result<(), SqlFluentDbError> {
    check_name(name)?;
    if scale > precision && precision > 0 {
        return Err(SqlFluentDbError::out_of_range(
            "scale",
            format!("decimal parameter {name} has scale {scale} larger than precision {precision}"),
        ));
    }
    Ok(())
}
