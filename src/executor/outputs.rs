//! Reading parameter values back after execution.

use super::SqlExecutor;
use crate::error::SqlFluentDbError;
use crate::parameter::Parameter;
use crate::provider::Capability;
use crate::scalar::{FromDbValue, convert_scalar, scalar_binary};

impl SqlExecutor {
    /// Value of a parameter converted to `T`; NULL is a cast error.
    ///
    /// # Errors
    /// Returns `OutOfRange` for an unknown name and `Cast` when the value is NULL or not
    /// convertible.
    pub fn get<T: FromDbValue>(&self, name: &str) -> Result<T, SqlFluentDbError> {
        self.get_or_null(name)?
            .ok_or_else(|| SqlFluentDbError::Cast(format!("parameter {name} is NULL")))
    }

    /// # Errors
    /// Returns `OutOfRange` for an unknown name and `Cast` when the value is not convertible.
    pub fn get_or_null<T: FromDbValue>(&self, name: &str) -> Result<Option<T>, SqlFluentDbError> {
        convert_scalar(self.parameter(name)?.value.clone())
    }

    /// Binary parameter value; any non-binary value reads as `None`.
    ///
    /// # Errors
    /// Returns `OutOfRange` for an unknown name.
    pub fn get_binary(&self, name: &str) -> Result<Option<Vec<u8>>, SqlFluentDbError> {
        Ok(scalar_binary(self.parameter(name)?.value.clone()))
    }

    /// # Errors
    /// Returns `OutOfRange` for an unknown name.
    pub fn get_string(&self, name: &str) -> Result<Option<String>, SqlFluentDbError> {
        self.get_or_null(name)
    }

    /// # Errors
    /// Returns `Unsupported` unless the provider handles XML, or `OutOfRange` for an unknown
    /// name.
    pub fn get_xml(&self, name: &str) -> Result<Option<String>, SqlFluentDbError> {
        self.require(Capability::Xml, "XML parameters")?;
        self.get_or_null(name)
    }

    /// The stored procedure's return code.
    ///
    /// # Errors
    /// Returns `InvalidState` if no return parameter was registered, and `Cast` if the
    /// provider left it NULL or wrote a value that does not fit in an `i32`.
    pub fn get_return(&self) -> Result<i32, SqlFluentDbError> {
        let parameter = self
            .command
            .parameters()
            .iter()
            .find(|p| p.is_return())
            .ok_or_else(|| {
                SqlFluentDbError::InvalidState("no return parameter has been registered".into())
            })?;
        self.get(&parameter.name)
    }

    fn parameter(&self, name: &str) -> Result<&Parameter, SqlFluentDbError> {
        self.command.get(name).ok_or_else(|| {
            SqlFluentDbError::out_of_range(name, "no parameter with that name is registered")
        })
    }
}
