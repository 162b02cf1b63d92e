use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{Value, ValueRef};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// This is the closed set of kinds the executor hands out in result fields and
/// accepts from prepared-statement data providers:
/// ```rust
/// use txn_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Calendar date without time
    Date(NaiveDate),
    /// Time of day without date
    Time(NaiveTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value kind, used in conversion errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "integer",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "boolean",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Date(_) => "date",
            RowValues::Time(_) => "time",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Convert into the value bound to a `SQLite` statement parameter.
    ///
    /// SQLite has no native boolean or temporal storage; booleans bind as 0/1
    /// and temporal values as ISO-8601 text, the same layout `SQLite`'s date
    /// functions understand.
    #[must_use]
    pub fn to_sqlite_value(&self) -> Value {
        match self {
            RowValues::Int(i) => Value::Integer(*i),
            RowValues::Float(f) => Value::Real(*f),
            RowValues::Text(s) => Value::Text(s.clone()),
            RowValues::Bool(b) => Value::Integer(i64::from(*b)),
            RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
            RowValues::Date(d) => Value::Text(d.format("%F").to_string()),
            RowValues::Time(t) => Value::Text(t.format("%T%.f").to_string()),
            RowValues::Null => Value::Null,
            RowValues::JSON(jval) => Value::Text(jval.to_string()),
            RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
        }
    }

    /// Read a raw value produced by the `SQLite` cursor.
    #[must_use]
    pub fn from_sqlite_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => RowValues::Null,
            ValueRef::Integer(i) => RowValues::Int(i),
            ValueRef::Real(f) => RowValues::Float(f),
            ValueRef::Text(t) => RowValues::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => RowValues::Blob(b.to_vec()),
        }
    }
}

impl From<Value> for RowValues {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RowValues::Null,
            Value::Integer(i) => RowValues::Int(i),
            Value::Real(f) => RowValues::Float(f),
            Value::Text(s) => RowValues::Text(s),
            Value::Blob(b) => RowValues::Blob(b),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Column type tags, numbered like `java.sql.Types` so tags stay meaningful
/// to tooling that already speaks JDBC.
pub mod sql_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const BOOLEAN: i32 = 16;

    /// Name of a type tag, `None` for tags outside the table.
    #[must_use]
    pub fn type_name(tag: i32) -> Option<&'static str> {
        let name = match tag {
            BIT => "BIT",
            TINYINT => "TINYINT",
            SMALLINT => "SMALLINT",
            INTEGER => "INTEGER",
            BIGINT => "BIGINT",
            FLOAT => "FLOAT",
            REAL => "REAL",
            DOUBLE => "DOUBLE",
            NUMERIC => "NUMERIC",
            DECIMAL => "DECIMAL",
            CHAR => "CHAR",
            VARCHAR => "VARCHAR",
            LONGVARCHAR => "LONGVARCHAR",
            DATE => "DATE",
            TIME => "TIME",
            TIMESTAMP => "TIMESTAMP",
            BINARY => "BINARY",
            VARBINARY => "VARBINARY",
            NULL => "NULL",
            OTHER => "OTHER",
            BLOB => "BLOB",
            CLOB => "CLOB",
            BOOLEAN => "BOOLEAN",
            _ => return None,
        };
        Some(name)
    }

    /// Map a declared `SQLite` column type to a tag.
    ///
    /// Well-known names map directly; everything else follows `SQLite`'s
    /// affinity rules (INT → integer, CHAR/CLOB/TEXT → text, BLOB → blob,
    /// REAL/FLOA/DOUB → floating point, otherwise numeric). Expression
    /// columns have no declared type and map to [`OTHER`].
    #[must_use]
    pub fn from_decl_type(decl: Option<&str>) -> i32 {
        let Some(decl) = decl else {
            return OTHER;
        };
        let upper = decl.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "" => return BLOB,
            "BOOLEAN" | "BOOL" => return BOOLEAN,
            "BIGINT" | "INT8" => return BIGINT,
            "SMALLINT" | "INT2" => return SMALLINT,
            "TINYINT" => return TINYINT,
            "DATE" => return DATE,
            "TIME" => return TIME,
            "DATETIME" | "TIMESTAMP" => return TIMESTAMP,
            "DECIMAL" => return DECIMAL,
            "DOUBLE" | "DOUBLE PRECISION" => return DOUBLE,
            "FLOAT" => return FLOAT,
            "CHAR" | "CHARACTER" | "NCHAR" => return CHAR,
            "CLOB" => return CLOB,
            _ => {}
        }
        if base.contains("INT") {
            INTEGER
        } else if base.contains("CHAR") || base.contains("TEXT") {
            VARCHAR
        } else if base.contains("CLOB") {
            CLOB
        } else if base.contains("BLOB") {
            BLOB
        } else if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
            REAL
        } else {
            NUMERIC
        }
    }
}
