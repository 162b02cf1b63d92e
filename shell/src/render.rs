use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use txn_middleware::prelude::*;

fn value_to_json(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Number((*i).into()),
        RowValues::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        RowValues::Text(s) => Value::String(s.clone()),
        RowValues::Bool(b) => Value::Bool(*b),
        RowValues::Timestamp(ts) => Value::String(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        RowValues::Date(d) => Value::String(d.to_string()),
        RowValues::Time(t) => Value::String(t.to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(json) => json.clone(),
        RowValues::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for byte in bytes {
                let _ = write!(hex, "{byte:02x}");
            }
            Value::String(hex)
        }
    }
}

/// One row as a JSON object keyed by column name.
pub(crate) fn row_to_json(row: &ResultRow) -> Value {
    let mut object = Map::new();
    for field in row.fields() {
        object.insert(field.column_name().to_string(), value_to_json(field.value()));
    }
    Value::Object(object)
}
