//! Fluent parameter registration.
//!
//! Every builder validates its arguments before touching the command, so a failed call leaves
//! the parameter list exactly as it was.

use super::SqlExecutor;
use crate::error::SqlFluentDbError;
use crate::parameter::{
    Direction, ParamKind, Parameter, RETURN_PARAMETER, TableValue, check_name, check_precision,
    check_size,
};
use crate::provider::Capability;
use crate::types::{DbValue, Decimal, NumericType, ParameterValue};

type Chain<'a> = Result<&'a mut SqlExecutor, SqlFluentDbError>;

impl SqlExecutor {
    /// Register an input parameter of a fixed-width kind. `None` binds a typed NULL.
    ///
    /// # Errors
    /// Returns `MissingArgument` for an empty name, or `InvalidState` if the name is taken.
    pub fn add_in_parameter<V: ParameterValue>(&mut self, name: &str, value: V) -> Chain<'_> {
        self.push_numeric(name, Direction::Input, V::numeric_type(), value.into_db_value())
    }

    /// Register an input parameter by type only; bind its value later with
    /// [`set_parameter`](Self::set_parameter).
    ///
    /// # Errors
    /// See [`add_in_parameter`](Self::add_in_parameter).
    pub fn add_in_typed(&mut self, name: &str, kind: NumericType) -> Chain<'_> {
        self.push_numeric(name, Direction::Input, kind, DbValue::Null)
    }

    /// # Errors
    /// Returns `OutOfRange` if `scale` exceeds a non-zero `precision`.
    pub fn add_in_decimal(
        &mut self,
        name: &str,
        value: impl Into<Option<Decimal>>,
        precision: u8,
        scale: u8,
    ) -> Chain<'_> {
        self.push_decimal(name, Direction::Input, value.into(), precision, scale)
    }

    /// # Errors
    /// Returns `OutOfRange` if `scale` exceeds a non-zero `precision`.
    pub fn add_in_decimal_typed(&mut self, name: &str, precision: u8, scale: u8) -> Chain<'_> {
        self.push_decimal(name, Direction::Input, None, precision, scale)
    }

    /// String input; variable-length when `size` exceeds the configured threshold.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_string(&mut self, name: &str, value: Option<&str>, size: usize) -> Chain<'_> {
        let variable = self.is_variable_length(size);
        self.push_string(name, Direction::Input, value, size, variable)
    }

    /// String input with an explicit variable/fixed-length flag.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_string_with(
        &mut self,
        name: &str,
        value: Option<&str>,
        size: usize,
        variable: bool,
    ) -> Chain<'_> {
        self.push_string(name, Direction::Input, value, size, variable)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_string_typed(&mut self, name: &str, size: usize) -> Chain<'_> {
        let variable = self.is_variable_length(size);
        self.push_string(name, Direction::Input, None, size, variable)
    }

    /// # Errors
    /// Returns `MissingArgument` for an empty name.
    pub fn add_in_binary(&mut self, name: &str, value: Option<&[u8]>) -> Chain<'_> {
        self.push(name, Direction::Input, ParamKind::Binary, value.into())
    }

    /// # Errors
    /// Returns `Unsupported` unless the provider handles XML.
    pub fn add_in_xml(&mut self, name: &str, value: Option<&str>) -> Chain<'_> {
        self.require(Capability::Xml, "XML parameters")?;
        let value = value.map_or(DbValue::Null, |v| DbValue::Xml(v.to_owned()));
        self.push(name, Direction::Input, ParamKind::Xml, value)
    }

    /// Table-valued input bound to the user-defined table type `type_name`.
    ///
    /// # Errors
    /// Returns `Unsupported` unless the provider handles table-valued parameters, and
    /// `MissingArgument` for an empty type name.
    pub fn add_in_table(&mut self, name: &str, type_name: &str, table: TableValue) -> Chain<'_> {
        self.ensure_live()?;
        self.require(Capability::TableValued, "table-valued parameters")?;
        if type_name.trim().is_empty() {
            return Err(SqlFluentDbError::missing("table type name"));
        }
        check_name(name)?;
        let mut parameter = Parameter::new(
            name,
            Direction::Input,
            ParamKind::Table {
                type_name: type_name.to_owned(),
            },
            DbValue::Null,
        );
        parameter.table = Some(table);
        self.command.push(parameter)?;
        Ok(self)
    }

    /// Register an output parameter the provider fills during execution.
    ///
    /// # Errors
    /// Returns `MissingArgument` for an empty name.
    pub fn add_out_parameter(&mut self, name: &str, kind: NumericType) -> Chain<'_> {
        self.push_numeric(name, Direction::Output, kind, DbValue::Null)
    }

    /// # Errors
    /// Returns `OutOfRange` if `scale` exceeds a non-zero `precision`.
    pub fn add_out_decimal(&mut self, name: &str, precision: u8, scale: u8) -> Chain<'_> {
        self.push_decimal(name, Direction::Output, None, precision, scale)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_out_string(&mut self, name: &str, size: usize) -> Chain<'_> {
        let variable = self.is_variable_length(size);
        self.push_string(name, Direction::Output, None, size, variable)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_out_string_with(&mut self, name: &str, size: usize, variable: bool) -> Chain<'_> {
        self.push_string(name, Direction::Output, None, size, variable)
    }

    /// # Errors
    /// Returns `MissingArgument` for an empty name.
    pub fn add_out_binary(&mut self, name: &str) -> Chain<'_> {
        self.push(name, Direction::Output, ParamKind::Binary, DbValue::Null)
    }

    /// # Errors
    /// Returns `Unsupported` unless the provider handles XML.
    pub fn add_out_xml(&mut self, name: &str) -> Chain<'_> {
        self.require(Capability::Xml, "XML parameters")?;
        self.push(name, Direction::Output, ParamKind::Xml, DbValue::Null)
    }

    /// # Errors
    /// See [`add_in_parameter`](Self::add_in_parameter).
    pub fn add_in_out_parameter<V: ParameterValue>(&mut self, name: &str, value: V) -> Chain<'_> {
        self.push_numeric(
            name,
            Direction::InputOutput,
            V::numeric_type(),
            value.into_db_value(),
        )
    }

    /// # Errors
    /// See [`add_in_parameter`](Self::add_in_parameter).
    pub fn add_in_out_typed(&mut self, name: &str, kind: NumericType) -> Chain<'_> {
        self.push_numeric(name, Direction::InputOutput, kind, DbValue::Null)
    }

    /// # Errors
    /// Returns `OutOfRange` if `scale` exceeds a non-zero `precision`.
    pub fn add_in_out_decimal(
        &mut self,
        name: &str,
        value: impl Into<Option<Decimal>>,
        precision: u8,
        scale: u8,
    ) -> Chain<'_> {
        self.push_decimal(name, Direction::InputOutput, value.into(), precision, scale)
    }

    /// # Errors
    /// Returns `OutOfRange` if `scale` exceeds a non-zero `precision`.
    pub fn add_in_out_decimal_typed(&mut self, name: &str, precision: u8, scale: u8) -> Chain<'_> {
        self.push_decimal(name, Direction::InputOutput, None, precision, scale)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_out_string(&mut self, name: &str, value: Option<&str>, size: usize) -> Chain<'_> {
        let variable = self.is_variable_length(size);
        self.push_string(name, Direction::InputOutput, value, size, variable)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_out_string_with(
        &mut self,
        name: &str,
        value: Option<&str>,
        size: usize,
        variable: bool,
    ) -> Chain<'_> {
        self.push_string(name, Direction::InputOutput, value, size, variable)
    }

    /// # Errors
    /// Returns `OutOfRange` when `size` is zero.
    pub fn add_in_out_string_typed(&mut self, name: &str, size: usize) -> Chain<'_> {
        let variable = self.is_variable_length(size);
        self.push_string(name, Direction::InputOutput, None, size, variable)
    }

    /// # Errors
    /// Returns `MissingArgument` for an empty name.
    pub fn add_in_out_binary(&mut self, name: &str, value: Option<&[u8]>) -> Chain<'_> {
        self.push(name, Direction::InputOutput, ParamKind::Binary, value.into())
    }

    /// Register the 32-bit return-code parameter, named [`RETURN_PARAMETER`]. It must be the
    /// first parameter on the command.
    ///
    /// # Errors
    /// Returns `InvalidState` if any parameter has already been registered.
    pub fn add_return_parameter(&mut self) -> Chain<'_> {
        if !self.command.parameters().is_empty() {
            return Err(SqlFluentDbError::InvalidState(
                "return parameter must be first".into(),
            ));
        }
        self.push_numeric(
            RETURN_PARAMETER,
            Direction::ReturnValue,
            NumericType::Int32,
            DbValue::Null,
        )
    }

    /// Replace the value of a registered parameter, typically between executions of a
    /// prepared command. Decimal values are rounded to the declared scale.
    ///
    /// # Errors
    /// Returns `OutOfRange` if no parameter has that name.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<DbValue>) -> Chain<'_> {
        self.ensure_live()?;
        check_name(name)?;
        let parameter = self.command.get_mut(name).ok_or_else(|| {
            SqlFluentDbError::out_of_range(name, "no parameter with that name is registered")
        })?;
        parameter.value = fit_to_kind(&parameter.kind, value.into());
        Ok(self)
    }

    /// # Errors
    /// Returns `Unsupported` unless the provider handles XML, or `OutOfRange` for an unknown
    /// name.
    pub fn set_xml(&mut self, name: &str, value: Option<&str>) -> Chain<'_> {
        self.require(Capability::Xml, "XML parameters")?;
        let value = value.map_or(DbValue::Null, |v| DbValue::Xml(v.to_owned()));
        self.set_parameter(name, value)
    }

    pub(crate) fn is_variable_length(&self, size: usize) -> bool {
        size > self.options.variable_length_threshold
    }

    fn push(
        &mut self,
        name: &str,
        direction: Direction,
        kind: ParamKind,
        value: DbValue,
    ) -> Chain<'_> {
        self.ensure_live()?;
        check_name(name)?;
        self.command
            .push(Parameter::new(name, direction, kind, value))?;
        Ok(self)
    }

    fn push_numeric(
        &mut self,
        name: &str,
        direction: Direction,
        kind: NumericType,
        value: DbValue,
    ) -> Chain<'_> {
        self.push(name, direction, ParamKind::Numeric(kind), value)
    }

    fn push_decimal(
        &mut self,
        name: &str,
        direction: Direction,
        value: Option<Decimal>,
        precision: u8,
        scale: u8,
    ) -> Chain<'_> {
        check_precision(name, precision, scale)?;
        let kind = ParamKind::Decimal { precision, scale };
        let value = fit_to_kind(&kind, value.into());
        self.push(name, direction, kind, value)
    }

    fn push_string(
        &mut self,
        name: &str,
        direction: Direction,
        value: Option<&str>,
        size: usize,
        variable: bool,
    ) -> Chain<'_> {
        check_size(name, size)?;
        self.push(name, direction, ParamKind::String { size, variable }, value.into())
    }
}

fn fit_to_kind(kind: &ParamKind, value: DbValue) -> DbValue {
    match (kind, value) {
        (ParamKind::Decimal { scale, .. }, DbValue::Decimal(d)) => {
            DbValue::Decimal(d.round_dp(u32::from(*scale)))
        }
        (_, value) => value,
    }
}
