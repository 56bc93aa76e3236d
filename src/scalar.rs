//! Conversion of untyped returned values into the type a caller asks for.

use chrono::NaiveDateTime;

use crate::error::SqlFluentDbError;
use crate::types::{DbValue, Decimal};

/// Types a returned [`DbValue`] can be coerced into.
///
/// Conversions are lenient in the way database drivers usually are: integers of any width
/// narrow when the value fits, numeric text parses, and floats round to the nearest integer.
/// Anything else is a [`SqlFluentDbError::Cast`].
pub trait FromDbValue: Sized {
    /// Convert a non-null value.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::Cast` when the value cannot represent `Self`.
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError>;
}

/// Convert a possibly-null value, mapping NULL to `None`.
///
/// # Errors
/// Returns `SqlFluentDbError::Cast` if a non-null value is not convertible.
pub fn convert_scalar<T: FromDbValue>(value: DbValue) -> Result<Option<T>, SqlFluentDbError> {
    if value.is_null() {
        return Ok(None);
    }
    T::from_db_value(value).map(Some)
}

/// Binary scalars are taken as-is; any non-binary value reads as no value.
#[must_use]
pub fn scalar_binary(value: DbValue) -> Option<Vec<u8>> {
    match value {
        DbValue::Binary(bytes) => Some(bytes),
        _ => None,
    }
}

fn cast_error(value: &DbValue, target: &str) -> SqlFluentDbError {
    SqlFluentDbError::Cast(format!(
        "cannot convert {} value '{value}' to {target}",
        value.type_name()
    ))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_i64(value: &DbValue, target: &str) -> Result<i64, SqlFluentDbError> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    let float = match value {
        DbValue::Single(v) => f64::from(*v),
        DbValue::Double(v) => *v,
        DbValue::Decimal(d) => return d.to_i64().ok_or_else(|| cast_error(value, target)),
        DbValue::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(v);
            }
            return trimmed
                .parse::<Decimal>()
                .ok()
                .and_then(|d| d.to_i64())
                .ok_or_else(|| cast_error(value, target));
        }
        _ => return Err(cast_error(value, target)),
    };
    let rounded = float.round();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(cast_error(value, target));
    }
    Ok(rounded as i64)
}

macro_rules! integral_from_db_value {
    ($ty:ty, $target:literal) => {
        impl FromDbValue for $ty {
            fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
                let wide = to_i64(&value, $target)?;
                <$ty>::try_from(wide).map_err(|_| cast_error(&value, $target))
            }
        }
    };
}

integral_from_db_value!(u8, "byte");
integral_from_db_value!(i16, "int16");
integral_from_db_value!(i32, "int32");

impl FromDbValue for i64 {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        to_i64(&value, "int64")
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        if let Some(v) = value.as_i64() {
            return Ok(v != 0);
        }
        match &value {
            DbValue::Single(v) => Ok(*v != 0.0),
            DbValue::Double(v) => Ok(*v != 0.0),
            DbValue::Decimal(d) => Ok(d.mantissa() != 0),
            DbValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
            DbValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(cast_error(&value, "boolean")),
        }
    }
}

impl FromDbValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        if let Some(v) = value.as_i64() {
            return Ok(v as f64);
        }
        match &value {
            DbValue::Single(v) => Ok(f64::from(*v)),
            DbValue::Double(v) => Ok(*v),
            DbValue::Decimal(d) => Ok(d.to_f64()),
            DbValue::Text(s) => s.trim().parse().map_err(|_| cast_error(&value, "double")),
            _ => Err(cast_error(&value, "double")),
        }
    }
}

impl FromDbValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        if let DbValue::Single(v) = value {
            return Ok(v);
        }
        f64::from_db_value(value).map(|v| v as f32)
    }
}

impl FromDbValue for Decimal {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        if let Some(v) = value.as_i64() {
            return Ok(Decimal::from_i64(v));
        }
        match &value {
            DbValue::Decimal(d) => Ok(*d),
            DbValue::Single(v) => {
                Decimal::from_f64(f64::from(*v)).ok_or_else(|| cast_error(&value, "decimal"))
            }
            DbValue::Double(v) => Decimal::from_f64(*v).ok_or_else(|| cast_error(&value, "decimal")),
            DbValue::Text(s) => s.parse().map_err(|_| cast_error(&value, "decimal")),
            _ => Err(cast_error(&value, "decimal")),
        }
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl FromDbValue for NaiveDateTime {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        match &value {
            DbValue::DateTime(dt) => Ok(*dt),
            DbValue::Text(s) => {
                let trimmed = s.trim();
                DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                    .or_else(|| {
                        chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
                    .ok_or_else(|| cast_error(&value, "datetime"))
            }
            _ => Err(cast_error(&value, "datetime")),
        }
    }
}

/// Any non-null value renders as its string form, so an empty string stays distinct from
/// NULL.
impl FromDbValue for String {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        match value {
            DbValue::Text(s) | DbValue::Xml(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        match value {
            DbValue::Binary(bytes) => Ok(bytes),
            other => Err(cast_error(&other, "binary")),
        }
    }
}

impl FromDbValue for DbValue {
    fn from_db_value(value: DbValue) -> Result<Self, SqlFluentDbError> {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_none_not_cast_error() {
        assert_eq!(convert_scalar::<i32>(DbValue::Null).unwrap(), None);
        assert_eq!(convert_scalar::<String>(DbValue::Null).unwrap(), None);
    }

    #[test]
    fn integers_narrow_when_they_fit() {
        assert_eq!(convert_scalar::<i32>(DbValue::Int64(42)).unwrap(), Some(42));
        assert_eq!(convert_scalar::<u8>(DbValue::Int32(255)).unwrap(), Some(255));
        assert!(matches!(
            convert_scalar::<u8>(DbValue::Int32(256)),
            Err(SqlFluentDbError::Cast(_))
        ));
        assert!(matches!(
            convert_scalar::<i16>(DbValue::Int64(i64::from(i16::MAX) + 1)),
            Err(SqlFluentDbError::Cast(_))
        ));
    }

    #[test]
    fn text_and_float_coercions() {
        assert_eq!(convert_scalar::<i64>(DbValue::Text(" 17 ".into())).unwrap(), Some(17));
        assert_eq!(convert_scalar::<i32>(DbValue::Double(2.6)).unwrap(), Some(3));
        assert_eq!(convert_scalar::<f64>(DbValue::Int64(3)).unwrap(), Some(3.0));
        assert!(matches!(
            convert_scalar::<i32>(DbValue::Text("abc".into())),
            Err(SqlFluentDbError::Cast(_))
        ));
        assert_eq!(
            convert_scalar::<Decimal>(DbValue::Text("12.50".into())).unwrap(),
            Some(Decimal::new(125, 1).unwrap())
        );
    }

    #[test]
    fn booleans() {
        assert_eq!(convert_scalar::<bool>(DbValue::Int64(1)).unwrap(), Some(true));
        assert_eq!(convert_scalar::<bool>(DbValue::Int64(0)).unwrap(), Some(false));
        assert_eq!(convert_scalar::<bool>(DbValue::Text("TRUE".into())).unwrap(), Some(true));
        assert!(convert_scalar::<bool>(DbValue::Binary(vec![1])).is_err());
    }

    #[test]
    fn datetimes_parse_from_text() {
        let dt = convert_scalar::<NaiveDateTime>(DbValue::Text("2024-01-02 03:04:05.250".into()))
            .unwrap()
            .unwrap();
        assert_eq!(dt.format("%F %T%.3f").to_string(), "2024-01-02 03:04:05.250");
        let midnight = convert_scalar::<NaiveDateTime>(DbValue::Text("2024-01-02".into()))
            .unwrap()
            .unwrap();
        assert_eq!(midnight.format("%T").to_string(), "00:00:00");
        assert!(convert_scalar::<NaiveDateTime>(DbValue::Int64(5)).is_err());
    }

    #[test]
    fn strings_distinguish_empty_from_null() {
        assert_eq!(
            convert_scalar::<String>(DbValue::Text(String::new())).unwrap(),
            Some(String::new())
        );
        assert_eq!(
            convert_scalar::<String>(DbValue::Int32(5)).unwrap(),
            Some("5".to_string())
        );
    }

    #[test]
    fn binary_is_a_raw_cast() {
        assert_eq!(scalar_binary(DbValue::Binary(vec![1, 2])), Some(vec![1, 2]));
        assert_eq!(scalar_binary(DbValue::Text("x".into())), None);
        assert!(convert_scalar::<Vec<u8>>(DbValue::Text("x".into())).is_err());
    }
}
