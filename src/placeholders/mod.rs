//! Lightweight SQL scanning: bind placeholder counting and leading keyword
//! detection.
//!
//! The scanner skips quoted strings, quoted identifiers and comments with a
//! small state machine; it does not parse SQL.

use std::collections::HashSet;

mod parsers;
mod scanner;

use parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start, is_name_byte};
use scanner::{State, scan_digits, scan_name, skip_identifier};

/// Count the bind parameters `SQLite` will expect for `sql`.
///
/// Follows `sqlite3_bind_parameter_count`: the result is the largest parameter
/// index. A bare `?` takes the next index, `?NNN` uses index `NNN`, and each
/// distinct `:name`, `@name` or `$name` takes the next index on first use.
///
/// ```rust
/// use txn_middleware::placeholders::count_placeholders;
///
/// assert_eq!(count_placeholders("INSERT INTO t VALUES (?, ?)"), 2);
/// assert_eq!(count_placeholders("SELECT * FROM t WHERE a = ?3"), 3);
/// assert_eq!(count_placeholders("SELECT '?' FROM t -- ?"), 0);
/// ```
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut max_index = 0usize;
    let mut named: HashSet<&[u8]> = HashSet::new();
    let mut state = State::Normal;
    let bytes = sql.as_bytes();
    let mut idx = 0;

    while idx < bytes.len() {
        if state != State::Normal {
            (state, idx) = state.step(bytes, idx);
            idx += 1;
            continue;
        }
        if let Some((opened, last)) = State::opening(bytes, idx) {
            state = opened;
            idx = last + 1;
            continue;
        }
        match bytes[idx] {
            b'?' => {
                if let Some((digits_end, digits)) = scan_digits(bytes, idx + 1) {
                    let explicit = digits.parse::<usize>().unwrap_or(0);
                    max_index = max_index.max(explicit);
                    idx = digits_end - 1;
                } else {
                    max_index += 1;
                }
            }
            b':' | b'@' | b'$' => {
                if let Some(name_end) = scan_name(bytes, idx + 1) {
                    // The prefix is part of the name: `:a` and `@a` differ.
                    let key = &bytes[idx..name_end];
                    if named.insert(key) {
                        max_index += 1;
                    }
                    idx = name_end - 1;
                }
            }
            b if is_name_byte(b) => idx = skip_identifier(bytes, idx) - 1,
            _ => {}
        }
        idx += 1;
    }

    max_index
}

/// The first keyword of `sql` in upper case, skipping whitespace and comments.
#[must_use]
pub fn leading_keyword(sql: &str) -> Option<String> {
    let bytes = sql.as_bytes();
    let mut idx = 0;
    loop {
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if is_line_comment_start(bytes, idx) {
            while idx < bytes.len() && bytes[idx] != b'\n' {
                idx += 1;
            }
        } else if is_block_comment_start(bytes, idx) {
            idx += 2;
            while idx < bytes.len() && !is_block_comment_end(bytes, idx) {
                idx += 1;
            }
            idx += 2;
        } else {
            break;
        }
    }
    let start = idx.min(bytes.len());
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    if end == start {
        None
    } else {
        Some(sql[start..end].to_ascii_uppercase())
    }
}

const STATEMENT_KEYWORDS: [&str; 6] = ["SELECT", "VALUES", "INSERT", "REPLACE", "UPDATE", "DELETE"];

/// The keyword of the statement `sql` runs: its leading keyword, or for a
/// `WITH` statement the first keyword after the common table expressions.
///
/// ```rust
/// use txn_middleware::placeholders::statement_keyword;
///
/// let sql = "WITH src(n) AS (SELECT 1) INSERT INTO t (n) SELECT n FROM src";
/// assert_eq!(statement_keyword(sql).as_deref(), Some("INSERT"));
/// ```
#[must_use]
pub fn statement_keyword(sql: &str) -> Option<String> {
    let leading = leading_keyword(sql)?;
    if leading != "WITH" {
        return Some(leading);
    }

    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < bytes.len() {
        if state != State::Normal {
            (state, idx) = state.step(bytes, idx);
            idx += 1;
            continue;
        }
        if let Some((opened, last)) = State::opening(bytes, idx) {
            state = opened;
            idx = last + 1;
            continue;
        }
        match bytes[idx] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b if is_name_byte(b) => {
                let end = skip_identifier(bytes, idx);
                let word = &bytes[idx..end];
                if depth == 0
                    && let Some(keyword) = STATEMENT_KEYWORDS
                        .iter()
                        .find(|k| word.eq_ignore_ascii_case(k.as_bytes()))
                {
                    return Some((*keyword).to_string());
                }
                idx = end - 1;
            }
            _ => {}
        }
        idx += 1;
    }
    Some(leading)
}

/// Whether `sql` is a statement `SQLite` reports an inserted rowid for.
#[must_use]
pub(crate) fn inserts_rows(sql: &str) -> bool {
    matches!(statement_keyword(sql).as_deref(), Some("INSERT" | "REPLACE"))
}

/// Whether `sql` is a data-changing statement whose row count `SQLite`
/// reports through `sqlite3_changes`. DDL and transaction control are not.
#[must_use]
pub(crate) fn changes_rows(sql: &str) -> bool {
    matches!(
        statement_keyword(sql).as_deref(),
        Some("INSERT" | "REPLACE" | "UPDATE" | "DELETE")
    )
}
