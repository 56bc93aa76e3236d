use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::Deserialize;

mod decimal;

pub use decimal::{Decimal, MAX_SCALE};

/// Values bound to parameters, returned by scalar queries, and read from result rows.
///
/// Reuse the same enum across providers so helper code does not need to branch on driver
/// types:
/// ```rust
/// use sql_fluent::prelude::*;
///
/// let values = vec![
///     DbValue::Int32(1),
///     DbValue::Text("alice".into()),
///     DbValue::Bool(true),
/// ];
/// assert!(!values[0].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DbValue {
    /// NULL value
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Text(String),
    Binary(Vec<u8>),
    /// XML document text
    Xml(String),
}

impl DbValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Widen any integral value (including booleans) to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Bool(b) => Some(i64::from(*b)),
            DbValue::Byte(v) => Some(i64::from(*v)),
            DbValue::Int16(v) => Some(i64::from(*v)),
            DbValue::Int32(v) => Some(i64::from(*v)),
            DbValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(value) | DbValue::Xml(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DbValue::Binary(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Short name of the variant, used in cast error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "boolean",
            DbValue::Byte(_) => "byte",
            DbValue::Int16(_) => "int16",
            DbValue::Int32(_) => "int32",
            DbValue::Int64(_) => "int64",
            DbValue::Single(_) => "single",
            DbValue::Double(_) => "double",
            DbValue::Decimal(_) => "decimal",
            DbValue::DateTime(_) => "datetime",
            DbValue::Text(_) => "text",
            DbValue::Binary(_) => "binary",
            DbValue::Xml(_) => "xml",
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => Ok(()),
            DbValue::Bool(v) => write!(f, "{v}"),
            DbValue::Byte(v) => write!(f, "{v}"),
            DbValue::Int16(v) => write!(f, "{v}"),
            DbValue::Int32(v) => write!(f, "{v}"),
            DbValue::Int64(v) => write!(f, "{v}"),
            DbValue::Single(v) => write!(f, "{v}"),
            DbValue::Double(v) => write!(f, "{v}"),
            DbValue::Decimal(v) => write!(f, "{v}"),
            DbValue::DateTime(v) => write!(f, "{}", v.format("%F %T%.f")),
            DbValue::Text(v) | DbValue::Xml(v) => f.write_str(v),
            DbValue::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// Provider-agnostic type selector for parameters whose value is supplied later, and the
/// type descriptor of every fixed-width parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
pub enum NumericType {
    Boolean,
    Byte,
    DateTime,
    Double,
    Int16,
    Int32,
    Int64,
    Single,
}

/// Values accepted by the fixed-width `add_*_parameter` builders.
///
/// Implemented for the primitive kinds and for `Option` of each, so `None` registers a typed
/// NULL.
pub trait ParameterValue {
    fn numeric_type() -> NumericType;
    fn into_db_value(self) -> DbValue;
}

macro_rules! parameter_value {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl ParameterValue for $ty {
            fn numeric_type() -> NumericType {
                NumericType::$kind
            }

            fn into_db_value(self) -> DbValue {
                DbValue::$variant(self)
            }
        }

        impl From<$ty> for DbValue {
            fn from(value: $ty) -> Self {
                DbValue::$variant(value)
            }
        }
    };
}

parameter_value!(bool, Boolean, Bool);
parameter_value!(u8, Byte, Byte);
parameter_value!(i16, Int16, Int16);
parameter_value!(i32, Int32, Int32);
parameter_value!(i64, Int64, Int64);
parameter_value!(f32, Single, Single);
parameter_value!(f64, Double, Double);
parameter_value!(NaiveDateTime, DateTime, DateTime);

impl<T: ParameterValue> ParameterValue for Option<T> {
    fn numeric_type() -> NumericType {
        T::numeric_type()
    }

    fn into_db_value(self) -> DbValue {
        self.map_or(DbValue::Null, T::into_db_value)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DbValue::Null, Into::into)
    }
}

impl From<Decimal> for DbValue {
    fn from(value: Decimal) -> Self {
        DbValue::Decimal(value)
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(value: Vec<u8>) -> Self {
        DbValue::Binary(value)
    }
}

impl From<&[u8]> for DbValue {
    fn from(value: &[u8]) -> Self {
        DbValue::Binary(value.to_vec())
    }
}
