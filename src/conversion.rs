//! Central value conversion.
//!
//! Every typed accessor on [`ResultField`](crate::results::ResultField) goes
//! through [`convert`] / [`convert_opt`], so a given `RowValues` converts the
//! same way regardless of which accessor asked for it.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::ConversionError;
use crate::types::RowValues;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// A Rust type that can be produced from a non-NULL [`RowValues`].
pub trait FromRowValue: Sized {
    /// Name used in conversion errors.
    const TARGET: &'static str;

    /// Convert a value that is known not to be [`RowValues::Null`].
    ///
    /// # Errors
    /// Returns `ConversionError` if the value has an incompatible kind, is out
    /// of range for `Self`, or is text that does not parse.
    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError>;
}

/// Convert a value, treating NULL as an error.
///
/// # Errors
/// Returns `ConversionError::NullValue` for NULL and the conversion error of
/// `T` otherwise.
pub fn convert<T: FromRowValue>(value: &RowValues) -> Result<T, ConversionError> {
    if value.is_null() {
        return Err(ConversionError::NullValue { target: T::TARGET });
    }
    T::from_non_null(value)
}

/// Convert a value, mapping NULL to `None`.
///
/// # Errors
/// Returns the conversion error of `T` for non-NULL values that do not convert.
pub fn convert_opt<T: FromRowValue>(value: &RowValues) -> Result<Option<T>, ConversionError> {
    if value.is_null() {
        return Ok(None);
    }
    T::from_non_null(value).map(Some)
}

fn incompatible<T: FromRowValue>(value: &RowValues) -> ConversionError {
    ConversionError::Incompatible {
        from: value.kind(),
        target: T::TARGET,
    }
}

fn unparsable<T: FromRowValue>(text: &str) -> ConversionError {
    ConversionError::Unparsable {
        target: T::TARGET,
        value: text.to_owned(),
    }
}

fn out_of_range<T: FromRowValue>(value: &RowValues, shown: impl ToString) -> ConversionError {
    ConversionError::OutOfRange {
        from: value.kind(),
        target: T::TARGET,
        value: shown.to_string(),
    }
}

impl FromRowValue for bool {
    const TARGET: &'static str = "bool";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Bool(b) => Ok(*b),
            RowValues::Int(i) => Ok(*i != 0),
            RowValues::Float(f) => Ok(*f != 0.0),
            RowValues::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
                "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
                _ => Err(unparsable::<Self>(s)),
            },
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for i64 {
    const TARGET: &'static str = "i64";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Int(i) => Ok(*i),
            RowValues::Bool(b) => Ok(i64::from(*b)),
            // Floats truncate toward zero, like a narrowing numeric cast.
            RowValues::Float(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(out_of_range::<Self>(value, f))
                }
            }
            RowValues::Text(s) => s.trim().parse::<i64>().map_err(|_| unparsable::<Self>(s)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromRowValue for $ty {
                const TARGET: &'static str = $name;

                fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
                    let wide = i64::from_non_null(value).map_err(|err| match err {
                        ConversionError::Incompatible { from, .. } => {
                            ConversionError::Incompatible { from, target: $name }
                        }
                        ConversionError::Unparsable { value, .. } => {
                            ConversionError::Unparsable { target: $name, value }
                        }
                        ConversionError::OutOfRange { from, value, .. } => {
                            ConversionError::OutOfRange { from, target: $name, value }
                        }
                        other => other,
                    })?;
                    <$ty>::try_from(wide).map_err(|_| out_of_range::<Self>(value, wide))
                }
            }
        )*
    };
}

narrow_integer!(i8 => "i8", i16 => "i16", i32 => "i32");

impl FromRowValue for i128 {
    const TARGET: &'static str = "i128";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Int(i) => Ok(i128::from(*i)),
            RowValues::Bool(b) => Ok(i128::from(*b)),
            RowValues::Float(f) => {
                if f.is_finite() && *f >= i128::MIN as f64 && *f < i128::MAX as f64 {
                    Ok(f.trunc() as i128)
                } else {
                    Err(out_of_range::<Self>(value, f))
                }
            }
            RowValues::Text(s) => s.trim().parse::<i128>().map_err(|_| unparsable::<Self>(s)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for f64 {
    const TARGET: &'static str = "f64";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Float(f) => Ok(*f),
            RowValues::Int(i) => Ok(*i as f64),
            RowValues::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            RowValues::Text(s) => s.trim().parse::<f64>().map_err(|_| unparsable::<Self>(s)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for f32 {
    const TARGET: &'static str = "f32";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        let wide = match value {
            RowValues::Text(s) => return s.trim().parse::<f32>().map_err(|_| unparsable::<Self>(s)),
            other => f64::from_non_null(other).map_err(|_| incompatible::<Self>(other))?,
        };
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(out_of_range::<Self>(value, wide));
        }
        Ok(narrow)
    }
}

impl FromRowValue for char {
    const TARGET: &'static str = "char";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(unparsable::<Self>(s)),
                }
            }
            RowValues::Int(i) => u32::try_from(*i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| out_of_range::<Self>(value, i)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for String {
    const TARGET: &'static str = "String";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Text(s) => Ok(s.clone()),
            RowValues::Int(i) => Ok(i.to_string()),
            RowValues::Float(f) => Ok(f.to_string()),
            RowValues::Bool(b) => Ok(b.to_string()),
            RowValues::Timestamp(dt) => Ok(dt.format("%F %T%.f").to_string()),
            RowValues::Date(d) => Ok(d.format("%F").to_string()),
            RowValues::Time(t) => Ok(t.format("%T%.f").to_string()),
            RowValues::JSON(j) => Ok(j.to_string()),
            RowValues::Blob(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| incompatible::<Self>(value))
            }
            RowValues::Null => Err(ConversionError::NullValue { target: Self::TARGET }),
        }
    }
}

impl FromRowValue for Decimal {
    const TARGET: &'static str = "Decimal";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Int(i) => Ok(Decimal::from(*i)),
            RowValues::Bool(b) => Ok(Decimal::from(i64::from(*b))),
            RowValues::Float(f) => Decimal::try_from(*f).map_err(|_| out_of_range::<Self>(value, f)),
            RowValues::Text(s) => {
                let trimmed = s.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|_| unparsable::<Self>(s))
            }
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for NaiveDateTime {
    const TARGET: &'static str = "NaiveDateTime";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Timestamp(dt) => Ok(*dt),
            RowValues::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            // Integers are read as Unix epoch seconds.
            RowValues::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| out_of_range::<Self>(value, secs)),
            RowValues::Text(s) => parse_timestamp(s.trim()).ok_or_else(|| unparsable::<Self>(s)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

impl FromRowValue for NaiveDate {
    const TARGET: &'static str = "NaiveDate";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Date(d) => Ok(*d),
            RowValues::Timestamp(dt) => Ok(dt.date()),
            RowValues::Text(s) => {
                let trimmed = s.trim();
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(trimmed).map(|dt| dt.date()))
                    .ok_or_else(|| unparsable::<Self>(s))
            }
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for NaiveTime {
    const TARGET: &'static str = "NaiveTime";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Time(t) => Ok(*t),
            RowValues::Timestamp(dt) => Ok(dt.time()),
            RowValues::Text(s) => {
                let trimmed = s.trim();
                TIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
                    .or_else(|| parse_timestamp(trimmed).map(|dt| dt.time()))
                    .ok_or_else(|| unparsable::<Self>(s))
            }
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for Vec<u8> {
    const TARGET: &'static str = "bytes";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::Blob(bytes) => Ok(bytes.clone()),
            RowValues::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

impl FromRowValue for JsonValue {
    const TARGET: &'static str = "JSON";

    fn from_non_null(value: &RowValues) -> Result<Self, ConversionError> {
        match value {
            RowValues::JSON(j) => Ok(j.clone()),
            RowValues::Text(s) => serde_json::from_str(s).map_err(|_| unparsable::<Self>(s)),
            RowValues::Int(i) => Ok(JsonValue::from(*i)),
            RowValues::Float(f) => Ok(JsonValue::from(*f)),
            RowValues::Bool(b) => Ok(JsonValue::Bool(*b)),
            other => Err(incompatible::<Self>(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_distinct_from_incompatible() {
        assert_eq!(
            convert::<i32>(&RowValues::Null),
            Err(ConversionError::NullValue { target: "i32" })
        );
        assert!(matches!(
            convert::<i32>(&RowValues::Blob(vec![1])),
            Err(ConversionError::Incompatible { from: "blob", target: "i32" })
        ));
        assert_eq!(convert_opt::<i32>(&RowValues::Null), Ok(None));
    }

    #[test]
    fn narrowing_checks_range() {
        assert_eq!(convert::<i8>(&RowValues::Int(127)), Ok(127));
        assert!(matches!(
            convert::<i8>(&RowValues::Int(128)),
            Err(ConversionError::OutOfRange { target: "i8", .. })
        ));
        assert!(matches!(
            convert::<i16>(&RowValues::Text("abc".into())),
            Err(ConversionError::Unparsable { target: "i16", .. })
        ));
    }

    #[test]
    fn numeric_text_and_bool_conversions() {
        assert_eq!(convert::<i64>(&RowValues::Text(" 42 ".into())), Ok(42));
        assert_eq!(convert::<i64>(&RowValues::Float(3.9)), Ok(3));
        assert_eq!(convert::<f64>(&RowValues::Int(2)), Ok(2.0));
        assert_eq!(convert::<bool>(&RowValues::Int(0)), Ok(false));
        assert_eq!(convert::<bool>(&RowValues::Text("TRUE".into())), Ok(true));
        assert_eq!(convert::<char>(&RowValues::Text("x".into())), Ok('x'));
        assert!(convert::<char>(&RowValues::Text("xy".into())).is_err());
    }

    #[test]
    fn decimal_and_big_integer() {
        assert_eq!(
            convert::<Decimal>(&RowValues::Text("12.50".into())),
            Ok(Decimal::new(1250, 2))
        );
        assert_eq!(
            convert::<i128>(&RowValues::Text("170141183460469231731687303715884105727".into())),
            Ok(i128::MAX)
        );
    }

    #[test]
    fn big_integer_rejects_floats_past_its_range() {
        assert_eq!(convert::<i128>(&RowValues::Float(-2.75)), Ok(-2));
        assert_eq!(convert::<i128>(&RowValues::Float(1e20)), Ok(100_000_000_000_000_000_000));
        for f in [1e300, -1e300, 2f64.powi(127), f64::INFINITY] {
            assert!(matches!(
                convert::<i128>(&RowValues::Float(f)),
                Err(ConversionError::OutOfRange { target: "i128", .. })
            ));
        }
    }

    #[test]
    fn temporal_text_parses() {
        let dt = convert::<NaiveDateTime>(&RowValues::Text("2024-01-02 03:04:05".into()));
        assert_eq!(
            dt.map(|d| d.to_string()),
            Ok("2024-01-02 03:04:05".to_string())
        );
        let date = convert::<NaiveDate>(&RowValues::Text("2024-01-02 03:04:05".into()));
        assert_eq!(date, Ok(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default()));
        let time = convert::<NaiveTime>(&RowValues::Text("03:04".into()));
        assert_eq!(time, Ok(NaiveTime::from_hms_opt(3, 4, 0).unwrap_or_default()));
    }

    #[test]
    fn strings_render_every_scalar() {
        assert_eq!(convert::<String>(&RowValues::Int(7)), Ok("7".to_string()));
        assert_eq!(convert::<String>(&RowValues::Bool(true)), Ok("true".to_string()));
        assert!(convert::<String>(&RowValues::Blob(vec![0xff, 0xfe])).is_err());
    }
}
