//! Scalar values: decimals, timestamps, and the `Value` sum type.

use std::fmt;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;

use super::{Int, IonType, SymbolToken};
use crate::{err_msg, IonResult};

// ============================================================================
// DECIMAL
// ============================================================================

/// An Ion decimal: `coefficient * 10^exponent`, with a distinguishable negative zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    pub coefficient: Int,
    pub exponent: i64,
    /// Only meaningful when the coefficient is zero.
    pub negative_zero: bool,
}

impl Decimal {
    pub fn new(coefficient: impl Into<Int>, exponent: i64) -> Self {
        Self {
            coefficient: coefficient.into(),
            exponent,
            negative_zero: false,
        }
    }

    pub fn negative_zero(exponent: i64) -> Self {
        Self {
            coefficient: Int::I64(0),
            exponent,
            negative_zero: true,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    /// True when the value is strictly below zero (negative zero is not).
    pub fn is_negative(&self) -> bool {
        self.coefficient.is_negative()
    }

    pub fn to_big_decimal(&self) -> BigDecimal {
        // BigDecimal scale is the negated exponent.
        BigDecimal::new(self.coefficient.to_big(), -self.exponent)
    }
}

impl From<BigDecimal> for Decimal {
    fn from(value: BigDecimal) -> Self {
        let (coefficient, scale) = value.into_bigint_and_exponent();
        Decimal::new(Int::from_big(coefficient), -scale)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative_zero && self.is_zero() { "-" } else { "" };
        write!(f, "{sign}{}d{}", self.coefficient, self.exponent)
    }
}

// ============================================================================
// TIMESTAMP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimestampPrecision {
    Year,
    Month,
    Day,
    Minute,
    Second,
    FractionalSecond,
}

/// An Ion timestamp. Precision is implied by which components are present.
///
/// `offset_minutes == None` is the unknown local offset (`-00:00`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    /// Fractional seconds as `coefficient * 10^-scale`, strictly below one.
    pub fraction: Option<(BigInt, u32)>,
    pub offset_minutes: Option<i16>,
}

impl Timestamp {
    pub fn with_year(year: u16) -> Self {
        Self {
            year,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
            fraction: None,
            offset_minutes: None,
        }
    }

    pub fn precision(&self) -> TimestampPrecision {
        if self.fraction.is_some() {
            TimestampPrecision::FractionalSecond
        } else if self.second.is_some() {
            TimestampPrecision::Second
        } else if self.minute.is_some() {
            TimestampPrecision::Minute
        } else if self.day.is_some() {
            TimestampPrecision::Day
        } else if self.month.is_some() {
            TimestampPrecision::Month
        } else {
            TimestampPrecision::Year
        }
    }

    /// Checks component ranges and that every component's prerequisites are present.
    pub fn validate(&self) -> IonResult<()> {
        if !(1..=9999).contains(&self.year) {
            return Err(err_msg!(Expansion, "timestamp year {} is out of range", self.year));
        }
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(err_msg!(Expansion, "timestamp month {} is out of range", month));
            }
        }
        match (self.month, self.day) {
            (None, Some(_)) => return Err(err_msg!(Expansion, "timestamp day requires a month")),
            (Some(month), Some(day)) => {
                let max = days_in_month(self.year, month);
                if day == 0 || day > max {
                    return Err(err_msg!(
                        Expansion,
                        "timestamp day {} is out of range for month {}",
                        day,
                        month
                    ));
                }
            }
            _ => {}
        }
        match (self.hour, self.minute) {
            (Some(_), None) => return Err(err_msg!(Expansion, "timestamp hour requires a minute")),
            (None, Some(_)) => return Err(err_msg!(Expansion, "timestamp minute requires an hour")),
            (Some(hour), Some(minute)) => {
                if self.day.is_none() {
                    return Err(err_msg!(Expansion, "timestamp time of day requires a day"));
                }
                if hour > 23 || minute > 59 {
                    return Err(err_msg!(Expansion, "timestamp time {}:{} is out of range", hour, minute));
                }
            }
            (None, None) => {}
        }
        if let Some(second) = self.second {
            if self.minute.is_none() {
                return Err(err_msg!(Expansion, "timestamp seconds require a minute"));
            }
            if second > 59 {
                return Err(err_msg!(Expansion, "timestamp second {} is out of range", second));
            }
        }
        if self.fraction.is_some() && self.second.is_none() {
            return Err(err_msg!(Expansion, "timestamp fractional seconds require seconds"));
        }
        if let Some(offset) = self.offset_minutes {
            if self.minute.is_none() {
                return Err(err_msg!(Expansion, "timestamp offset requires a time of day"));
            }
            if !(-1439..=1439).contains(&offset) {
                return Err(err_msg!(Expansion, "timestamp offset {} is out of range", offset));
            }
        }
        Ok(())
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        let Some(month) = self.month else { return write!(f, "T") };
        write!(f, "-{month:02}")?;
        let Some(day) = self.day else { return write!(f, "T") };
        write!(f, "-{day:02}")?;
        let (Some(hour), Some(minute)) = (self.hour, self.minute) else { return Ok(()) };
        write!(f, "T{hour:02}:{minute:02}")?;
        if let Some(second) = self.second {
            write!(f, ":{second:02}")?;
            if let Some((coefficient, scale)) = &self.fraction {
                write!(f, ".{:0width$}", coefficient, width = *scale as usize)?;
            }
        }
        match self.offset_minutes {
            None => write!(f, "-00:00"),
            Some(0) => write!(f, "Z"),
            Some(offset) => {
                let sign = if offset < 0 { '-' } else { '+' };
                let offset = offset.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", offset / 60, offset % 60)
            }
        }
    }
}

// ============================================================================
// VALUE
// ============================================================================

/// A scalar (non-container) Ion value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A null of the given type; `IonType::Null` is the untyped `null`.
    Null(IonType),
    Bool(bool),
    Int(Int),
    Float(f64),
    Decimal(Decimal),
    Timestamp(Timestamp),
    String(String),
    Symbol(SymbolToken),
    Blob(Vec<u8>),
    Clob(Vec<u8>),
}

impl Value {
    pub fn ion_type(&self) -> IonType {
        match self {
            Value::Null(ion_type) => *ion_type,
            Value::Bool(_) => IonType::Bool,
            Value::Int(_) => IonType::Int,
            Value::Float(_) => IonType::Float,
            Value::Decimal(_) => IonType::Decimal,
            Value::Timestamp(_) => IonType::Timestamp,
            Value::String(_) => IonType::String,
            Value::Symbol(_) => IonType::Symbol,
            Value::Blob(_) => IonType::Blob,
            Value::Clob(_) => IonType::Clob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Text content of a string or a symbol with known text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            Value::Symbol(symbol) => symbol.as_text(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&Int> {
        match self {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn int(value: i64) -> Self {
        Value::Int(Int::I64(value))
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    pub fn symbol(text: impl Into<String>) -> Self {
        Value::Symbol(SymbolToken::Text(text.into()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(IonType::Null) => write!(f, "null"),
            Value::Null(ion_type) => write!(f, "null.{ion_type}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:e}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::Timestamp(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Symbol(value) => write!(f, "'{value}'"),
            Value::Blob(bytes) => write!(f, "{{{{blob {} bytes}}}}", bytes.len()),
            Value::Clob(bytes) => write!(f, "{{{{\"{}\"}}}}", String::from_utf8_lossy(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_component_rules() {
        let mut ts = Timestamp::with_year(2024);
        assert!(ts.validate().is_ok());
        ts.day = Some(3);
        assert!(ts.validate().is_err(), "day without month");
        ts.month = Some(2);
        ts.day = Some(30);
        assert!(ts.validate().is_err(), "february 30th");
        ts.day = Some(29);
        assert!(ts.validate().is_ok(), "2024 is a leap year");
        ts.minute = Some(5);
        assert!(ts.validate().is_err(), "minute without hour");
        ts.hour = Some(12);
        assert!(ts.validate().is_ok());
        assert_eq!(ts.precision(), TimestampPrecision::Minute);
        assert_eq!(ts.to_string(), "2024-02-29T12:05-00:00");
    }

    #[test]
    fn decimal_round_trips_through_big_decimal() {
        let decimal = Decimal::new(Int::I64(-125), -2);
        let big = decimal.to_big_decimal();
        assert_eq!(big.to_string(), "-1.25");
        assert_eq!(Decimal::from(big), decimal);
    }
}
