use rusqlite::Statement;
use rusqlite::types::{Value, ValueRef};

use crate::command::Command;
use crate::error::SqlFluentDbError;
use crate::parameter::{ParamKind, Parameter};
use crate::types::DbValue;

/// Convert a parameter value to the value `SQLite` stores.
///
/// # Errors
/// Returns `SqlFluentDbError::Unsupported` for table-valued parameters.
pub fn db_value_to_sqlite(parameter: &Parameter) -> Result<Value, SqlFluentDbError> {
    if let ParamKind::Table { .. } = parameter.kind {
        return Err(SqlFluentDbError::Unsupported(
            "sqlite has no table-valued parameters".into(),
        ));
    }
    Ok(match &parameter.value {
        DbValue::Null => Value::Null,
        DbValue::Bool(_) | DbValue::Byte(_) | DbValue::Int16(_) | DbValue::Int32(_) => {
            Value::Integer(parameter.value.as_i64().unwrap_or_default())
        }
        DbValue::Int64(v) => Value::Integer(*v),
        DbValue::Single(v) => Value::Real(f64::from(*v)),
        DbValue::Double(v) => Value::Real(*v),
        DbValue::Decimal(d) => Value::Text(d.to_string()),
        DbValue::DateTime(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        DbValue::Text(s) | DbValue::Xml(s) => Value::Text(s.clone()),
        DbValue::Binary(bytes) => Value::Blob(bytes.clone()),
    })
}

#[must_use]
pub fn sqlite_to_db_value(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(i) => DbValue::Int64(i),
        ValueRef::Real(f) => DbValue::Double(f),
        ValueRef::Text(bytes) => DbValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => DbValue::Binary(bytes.to_vec()),
    }
}

/// Bind every placeholder in `stmt` from the command's parameters.
///
/// Named placeholders (`:n`, `@n`, `$n`) match a parameter by its prefix-less name, ignoring
/// case. `?NNN` takes the NNN-th input parameter and a bare `?` takes the next one.
///
/// # Errors
/// Returns `SqlFluentDbError::ParameterError` for a placeholder no parameter satisfies.
pub fn bind_parameters(stmt: &mut Statement<'_>, command: &Command) -> Result<(), SqlFluentDbError> {
    let inputs: Vec<&Parameter> = command
        .parameters()
        .iter()
        .filter(|p| p.direction.is_input())
        .collect();
    let mut next_positional = 0;

    for index in 1..=stmt.parameter_count() {
        let placeholder = stmt.parameter_name(index).map(str::to_owned);
        let parameter = match placeholder.as_deref() {
            None => {
                next_positional += 1;
                inputs.get(next_positional - 1).copied()
            }
            Some(name) if name.starts_with('?') => name[1..]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| inputs.get(n).copied()),
            Some(name) => command
                .find_bare(&name[1..])
                .map(|i| &command.parameters()[i]),
        };
        let parameter = parameter.ok_or_else(|| {
            SqlFluentDbError::ParameterError(format!(
                "no parameter registered for placeholder {}",
                placeholder.as_deref().unwrap_or("?")
            ))
        })?;
        stmt.raw_bind_parameter(index, db_value_to_sqlite(parameter)?)?;
    }
    Ok(())
}

/// Copy values from a returned row into the command's output and return parameters, matching
/// column names against parameter names without their prefix.
pub fn apply_outputs(command: &mut Command, columns: &[String], values: &[DbValue]) {
    for parameter in command.parameters_mut() {
        if !parameter.direction.is_output() {
            continue;
        }
        let bare = parameter.bare_name();
        if let Some(ordinal) = columns.iter().position(|c| c.eq_ignore_ascii_case(bare))
            && let Some(value) = values.get(ordinal)
        {
            parameter.set_output(value.clone());
        }
    }
}
