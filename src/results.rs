//! Tabular results handed out by the query path.

mod field;
mod row;

pub use field::ResultField;
pub use row::ResultRow;
