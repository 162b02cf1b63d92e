use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use crate::error::TxnMiddlewareError;
use crate::results::{ResultField, ResultRow};
use crate::types::{RowValues, sql_types};

/// Run a query and hand every row to `on_row`, in cursor order.
///
/// Column metadata is read once. A single [`ResultRow`] is allocated for the
/// query and refilled for every row, so `on_row` must clone what it keeps.
/// Returns the number of rows seen.
///
/// # Errors
/// Returns `TxnMiddlewareError` if preparing, binding or stepping fails, or
/// the first error returned by `on_row` (iteration stops there).
pub(crate) fn for_each_row<F>(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    mut on_row: F,
) -> Result<usize, TxnMiddlewareError>
where
    F: FnMut(&ResultRow) -> Result<(), TxnMiddlewareError>,
{
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<(Arc<str>, i32)> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let name: Arc<str> = if col.name().trim().is_empty() {
                Arc::from(format!("column{}", idx + 1))
            } else {
                Arc::from(col.name())
            };
            (name, sql_types::from_decl_type(col.decl_type()))
        })
        .collect();

    let mut row = ResultRow::new(columns.len());
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut seen = 0;
    while let Some(raw) = rows.next()? {
        row.clear();
        for (idx, (name, column_type)) in columns.iter().enumerate() {
            let value = RowValues::from_sqlite_ref(raw.get_ref(idx)?);
            row.add(ResultField::new(Arc::clone(name), *column_type, value));
        }
        on_row(&row)?;
        seen += 1;
    }
    Ok(seen)
}

/// Collect every row of a query.
///
/// # Errors
/// Returns `TxnMiddlewareError` if the query fails.
pub(crate) fn collect_rows(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<ResultRow>, TxnMiddlewareError> {
    let mut out = Vec::new();
    for_each_row(conn, sql, params, |row| {
        out.push(row.clone());
        Ok(())
    })?;
    Ok(out)
}

/// Read the first column of the first row as a count.
///
/// Returns `None` when the query yields no rows; NULL counts as zero.
///
/// # Errors
/// Returns `TxnMiddlewareError` if the query fails or the value is not an
/// integer.
pub(crate) fn first_count(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Option<i64>, TxnMiddlewareError> {
    let mut count = None;
    for_each_row(conn, sql, params, |row| {
        if count.is_none() {
            let field = row.get(0)?;
            count = Some(field.as_i64_or(0)?);
        }
        Ok(())
    })?;
    Ok(count)
}
