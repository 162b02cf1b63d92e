use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::conversion::{FromRowValue, convert, convert_opt};
use crate::error::ConversionError;
use crate::types::{RowValues, sql_types};

/// A single value of a query result row, together with its column metadata.
///
/// Column names are shared (`Arc<str>`) between all rows of one query, so
/// building a field per cell does not copy the name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultField {
    column_name: Arc<str>,
    column_type: i32,
    value: RowValues,
}

macro_rules! primitive_accessors {
    ($($ty:ty => $get:ident, $get_or:ident, $get_opt:ident);* $(;)?) => {
        $(
            #[doc = concat!("Convert the value to `", stringify!($ty), "`.")]
            ///
            /// # Errors
            /// Returns `ConversionError::NullValue` for NULL or the conversion error.
            pub fn $get(&self) -> Result<$ty, ConversionError> {
                convert(&self.value)
            }

            #[doc = concat!("Convert the value to `", stringify!($ty), "`, using `default` for NULL.")]
            ///
            /// # Errors
            /// Returns the conversion error for non-NULL values that do not convert.
            pub fn $get_or(&self, default: $ty) -> Result<$ty, ConversionError> {
                if self.value.is_null() {
                    return Ok(default);
                }
                convert(&self.value)
            }

            #[doc = concat!("Convert the value to `Option<", stringify!($ty), ">`; NULL is `None`.")]
            ///
            /// # Errors
            /// Returns the conversion error for non-NULL values that do not convert.
            pub fn $get_opt(&self) -> Result<Option<$ty>, ConversionError> {
                convert_opt(&self.value)
            }
        )*
    };
}

impl ResultField {
    /// Create a field.
    ///
    /// # Panics
    /// Panics if `column_name` is empty or only whitespace.
    #[must_use]
    pub fn new(column_name: impl Into<Arc<str>>, column_type: i32, value: RowValues) -> Self {
        let column_name = column_name.into();
        assert!(
            !column_name.trim().is_empty(),
            "result field column name must not be empty"
        );
        Self {
            column_name,
            column_type,
            value,
        }
    }

    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// The column type tag, numbered like `java.sql.Types`.
    #[must_use]
    pub fn column_type(&self) -> i32 {
        self.column_type
    }

    #[must_use]
    pub fn column_type_name(&self) -> Option<&'static str> {
        sql_types::type_name(self.column_type)
    }

    /// The raw value as read from the database.
    #[must_use]
    pub fn value(&self) -> &RowValues {
        &self.value
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Convert the value to any supported type.
    ///
    /// # Errors
    /// Returns `ConversionError::NullValue` for NULL or the conversion error of `T`.
    pub fn get_as<T: FromRowValue>(&self) -> Result<T, ConversionError> {
        convert(&self.value)
    }

    /// Convert the value, mapping NULL to `None`.
    ///
    /// # Errors
    /// Returns the conversion error of `T` for non-NULL values.
    pub fn get_as_opt<T: FromRowValue>(&self) -> Result<Option<T>, ConversionError> {
        convert_opt(&self.value)
    }

    /// Convert the value, substituting `default` for NULL without converting.
    ///
    /// # Errors
    /// Returns the conversion error of `T` for non-NULL values.
    pub fn get_as_or<T: FromRowValue>(&self, default: T) -> Result<T, ConversionError> {
        if self.value.is_null() {
            return Ok(default);
        }
        convert(&self.value)
    }

    primitive_accessors! {
        bool => as_bool, as_bool_or, as_bool_opt;
        i8 => as_i8, as_i8_or, as_i8_opt;
        i16 => as_i16, as_i16_or, as_i16_opt;
        i32 => as_i32, as_i32_or, as_i32_opt;
        i64 => as_i64, as_i64_or, as_i64_opt;
        f32 => as_f32, as_f32_or, as_f32_opt;
        f64 => as_f64, as_f64_or, as_f64_opt;
        char => as_char, as_char_or, as_char_opt;
    }

    /// The value rendered as text; NULL is `None`.
    ///
    /// # Errors
    /// Returns `ConversionError` for blobs that are not valid UTF-8.
    pub fn as_string(&self) -> Result<Option<String>, ConversionError> {
        convert_opt(&self.value)
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not numeric.
    pub fn as_big_decimal(&self) -> Result<Option<Decimal>, ConversionError> {
        convert_opt(&self.value)
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not an integer.
    pub fn as_big_integer(&self) -> Result<Option<i128>, ConversionError> {
        convert_opt(&self.value)
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not a timestamp.
    pub fn as_timestamp(&self) -> Result<Option<NaiveDateTime>, ConversionError> {
        convert_opt(&self.value)
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not a date.
    pub fn as_date(&self) -> Result<Option<NaiveDate>, ConversionError> {
        convert_opt(&self.value)
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not a time of day.
    pub fn as_time(&self) -> Result<Option<NaiveTime>, ConversionError> {
        convert_opt(&self.value)
    }

    /// Borrow blob bytes without copying.
    ///
    /// # Errors
    /// Returns `ConversionError::Incompatible` if the value is not a blob.
    pub fn as_blob(&self) -> Result<Option<&[u8]>, ConversionError> {
        match &self.value {
            RowValues::Null => Ok(None),
            RowValues::Blob(bytes) => Ok(Some(bytes)),
            other => Err(ConversionError::Incompatible {
                from: other.kind(),
                target: "blob",
            }),
        }
    }

    /// # Errors
    /// Returns `ConversionError` if the value is not JSON or JSON text.
    pub fn as_json(&self) -> Result<Option<JsonValue>, ConversionError> {
        convert_opt(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_only_to_null() {
        let null = ResultField::new("n", sql_types::INTEGER, RowValues::Null);
        assert_eq!(null.as_i32_or(7), Ok(7));
        assert_eq!(null.as_bool_or(true), Ok(true));
        assert_eq!(null.as_char_or('z'), Ok('z'));
        assert_eq!(null.as_i32_opt(), Ok(None));
        assert!(matches!(
            null.as_i32(),
            Err(ConversionError::NullValue { .. })
        ));

        let text = ResultField::new("t", sql_types::VARCHAR, RowValues::Text("oops".into()));
        assert!(matches!(
            text.as_i32_or(7),
            Err(ConversionError::Unparsable { .. })
        ));
    }

    #[test]
    fn metadata_is_exposed() {
        let field = ResultField::new("id", sql_types::BIGINT, RowValues::Int(9));
        assert_eq!(field.column_name(), "id");
        assert_eq!(field.column_type_name(), Some("BIGINT"));
        assert_eq!(field.as_i64(), Ok(9));
        assert_eq!(field.as_string(), Ok(Some("9".to_string())));
        assert_eq!(field.as_big_decimal(), Ok(Some(Decimal::from(9))));
    }

    #[test]
    fn blobs_borrow() {
        let field = ResultField::new("b", sql_types::BLOB, RowValues::Blob(vec![1, 2]));
        assert_eq!(field.as_blob(), Ok(Some(&[1u8, 2][..])));
        let text = ResultField::new("t", sql_types::VARCHAR, RowValues::Text("x".into()));
        assert!(text.as_blob().is_err());
    }

    #[test]
    #[should_panic(expected = "column name must not be empty")]
    fn empty_column_name_is_rejected() {
        let _ = ResultField::new("", sql_types::INTEGER, RowValues::Null);
    }
}
