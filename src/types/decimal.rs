use std::fmt;
use std::str::FromStr;

use crate::error::SqlFluentDbError;

/// Largest number of fractional digits a [`Decimal`] carries.
pub const MAX_SCALE: u32 = 28;

/// Exact base-10 number stored as an integer mantissa and a scale.
///
/// `Decimal::new(12345, 2)` is `123.45`. Equality ignores trailing zeros, so `1.50 == 1.5`.
///
/// ```rust
/// use sql_fluent::prelude::*;
///
/// let price: Decimal = "19.990".parse().unwrap();
/// assert_eq!(price, Decimal::new(1999, 2).unwrap());
/// assert_eq!(price.round_dp(1).to_string(), "20.0");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Build a decimal from a raw mantissa and scale.
    ///
    /// # Errors
    /// Returns `SqlFluentDbError::OutOfRange` if `scale` exceeds [`MAX_SCALE`].
    pub fn new(mantissa: i128, scale: u32) -> Result<Self, SqlFluentDbError> {
        if scale > MAX_SCALE {
            return Err(SqlFluentDbError::out_of_range(
                "scale",
                format!("decimal scale {scale} exceeds {MAX_SCALE}"),
            ));
        }
        Ok(Self { mantissa, scale })
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }

    /// Convert a finite float through its shortest decimal representation.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        format!("{value}").parse().ok()
    }

    #[must_use]
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    #[must_use]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Drop trailing fractional zeros.
    #[must_use]
    pub fn normalize(self) -> Self {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    /// Round half away from zero to `scale` fractional digits.
    ///
    /// Widening the scale pads with zeros; if that would overflow the mantissa the value is
    /// returned unchanged.
    #[must_use]
    pub fn round_dp(self, scale: u32) -> Self {
        let scale = scale.min(MAX_SCALE);
        if scale >= self.scale {
            return 10i128
                .checked_pow(scale - self.scale)
                .and_then(|factor| self.mantissa.checked_mul(factor))
                .map_or(self, |mantissa| Self { mantissa, scale });
        }
        let factor = 10i128.pow(self.scale - scale);
        let quotient = self.mantissa / factor;
        let remainder = (self.mantissa % factor).abs();
        let mantissa = if remainder * 2 >= factor {
            quotient + self.mantissa.signum()
        } else {
            quotient
        };
        Self { mantissa, scale }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(i32::try_from(self.scale).unwrap_or(i32::MAX))
    }

    /// Integer value rounded half away from zero, if it fits.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        i64::try_from(self.round_dp(0).mantissa).ok()
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.normalize();
        let rhs = other.normalize();
        lhs.mantissa == rhs.mantissa && lhs.scale == rhs.scale
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl FromStr for Decimal {
    type Err = SqlFluentDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SqlFluentDbError::Cast(format!("'{s}' is not a valid decimal"));
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for ch in whole.chars().chain(fraction.chars()) {
            let digit = ch.to_digit(10).ok_or_else(invalid)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit)))
                .ok_or_else(invalid)?;
        }
        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        if scale > MAX_SCALE {
            return Err(invalid());
        }
        Ok(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            scale,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{whole}.{fraction}")
    }
}
