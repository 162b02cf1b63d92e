use std::collections::HashMap;

use crate::error::TxnMiddlewareError;
use crate::types::RowValues;

use super::field::ResultField;

/// A row from a database query result.
///
/// The executor allocates one row per query and refills it for every cursor
/// step, so the row passed to a row callback is only valid for that call.
/// Clone it to keep it; a clone is a deep copy and is not affected when the
/// original is refilled.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    cols: Box<[Option<ResultField>]>,
    used: usize,
}

impl ResultRow {
    /// Create an empty row with room for `column_count` fields.
    #[must_use]
    pub fn new(column_count: usize) -> Self {
        Self {
            cols: vec![None; column_count].into_boxed_slice(),
            used: 0,
        }
    }

    /// Build a fully populated row from fields.
    #[must_use]
    pub fn from_fields(fields: Vec<ResultField>) -> Self {
        let used = fields.len();
        Self {
            cols: fields.into_iter().map(Some).collect(),
            used,
        }
    }

    /// Reset the write cursor and drop all fields.
    pub fn clear(&mut self) {
        self.cols.iter_mut().for_each(|slot| *slot = None);
        self.used = 0;
    }

    /// Append a field at the write cursor.
    ///
    /// # Panics
    /// Panics if the row is already full.
    pub fn add(&mut self, field: ResultField) {
        assert!(
            self.used < self.cols.len(),
            "result row is full ({} columns)",
            self.cols.len()
        );
        self.cols[self.used] = Some(field);
        self.used += 1;
    }

    /// Number of fields written since the last [`clear`](Self::clear).
    #[must_use]
    pub fn used_column_index(&self) -> usize {
        self.used
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.cols.len()
    }

    /// Get the field at `index`.
    ///
    /// # Errors
    /// Returns `TxnMiddlewareError::ColumnIndexOutOfRange` if `index` is past
    /// the populated fields.
    pub fn get(&self, index: usize) -> Result<&ResultField, TxnMiddlewareError> {
        self.cols
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(TxnMiddlewareError::ColumnIndexOutOfRange {
                index,
                count: self.used,
            })
    }

    /// # Errors
    /// Returns `TxnMiddlewareError::ColumnIndexOutOfRange` for a bad index.
    pub fn get_column_name(&self, index: usize) -> Result<&str, TxnMiddlewareError> {
        self.get(index).map(ResultField::column_name)
    }

    /// # Errors
    /// Returns `TxnMiddlewareError::ColumnIndexOutOfRange` for a bad index.
    pub fn get_column_type(&self, index: usize) -> Result<i32, TxnMiddlewareError> {
        self.get(index).map(ResultField::column_type)
    }

    /// # Errors
    /// Returns `TxnMiddlewareError::ColumnIndexOutOfRange` for a bad index.
    pub fn get_value(&self, index: usize) -> Result<&RowValues, TxnMiddlewareError> {
        self.get(index).map(ResultField::value)
    }

    /// Look a field up by column name (first match).
    #[must_use]
    pub fn get_by_name(&self, column_name: &str) -> Option<&ResultField> {
        self.fields().find(|f| f.column_name() == column_name)
    }

    /// Iterate over the populated fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = &ResultField> {
        self.cols.iter().take(self.used).filter_map(Option::as_ref)
    }

    /// Map column name to zero-based index.
    ///
    /// Built on every call; rows of different queries have different columns.
    #[must_use]
    pub fn column_name_to_index_map(&self) -> HashMap<String, usize> {
        self.fields()
            .enumerate()
            .map(|(idx, field)| (field.column_name().to_owned(), idx))
            .collect()
    }

    /// Copy the raw values out of the row.
    #[must_use]
    pub fn to_values(&self) -> Vec<RowValues> {
        self.fields().map(|f| f.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sql_types;

    fn field(name: &str, v: i64) -> ResultField {
        ResultField::new(name, sql_types::INTEGER, RowValues::Int(v))
    }

    #[test]
    fn clone_is_independent_of_refill() {
        let mut row = ResultRow::new(2);
        row.add(field("a", 1));
        row.add(field("b", 2));
        let snapshot = row.clone();

        row.clear();
        row.add(field("a", 10));
        row.add(field("b", 20));

        assert_eq!(snapshot.get_value(0).ok(), Some(&RowValues::Int(1)));
        assert_eq!(snapshot.get_column_name(1).ok(), Some("b"));
        assert_eq!(row.get_value(0).ok(), Some(&RowValues::Int(10)));
        assert_ne!(snapshot, row);
    }

    #[test]
    fn get_reports_out_of_range() {
        let mut row = ResultRow::new(1);
        assert!(matches!(
            row.get(0),
            Err(TxnMiddlewareError::ColumnIndexOutOfRange { index: 0, count: 0 })
        ));
        row.add(field("a", 1));
        assert_eq!(row.used_column_index(), row.column_count());
        assert!(row.get(1).is_err());
    }

    #[test]
    fn name_map_is_fresh() {
        let row = ResultRow::from_fields(vec![field("x", 1), field("y", 2)]);
        let mut map = row.column_name_to_index_map();
        assert_eq!(map.get("y"), Some(&1));
        map.clear();
        assert_eq!(row.column_name_to_index_map().len(), 2);
        assert_eq!(row.get_by_name("x").map(ResultField::value), Some(&RowValues::Int(1)));
    }

    #[test]
    #[should_panic(expected = "result row is full")]
    fn add_past_capacity_panics() {
        let mut row = ResultRow::new(0);
        row.add(field("a", 1));
    }
}
