//! Callbacks the executor reports row counts and generated keys through.

use crate::types::RowValues;

/// Sentinel for "no row count / count not available".
pub const NOT_INITIALIZED: i64 = -1;

/// Receives the number of rows a statement changed.
pub trait UpdatedRowCountCallback {
    fn set_updated_row_count(&mut self, count: i64);
}

impl<F: FnMut(i64)> UpdatedRowCountCallback for F {
    fn set_updated_row_count(&mut self, count: i64) {
        self(count);
    }
}

/// Holder for an updated row count; [`NOT_INITIALIZED`] until set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedRowCount(i64);

impl UpdatedRowCount {
    #[must_use]
    pub fn new() -> Self {
        Self(NOT_INITIALIZED)
    }

    #[must_use]
    pub fn get(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.0 != NOT_INITIALIZED
    }
}

impl Default for UpdatedRowCount {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatedRowCountCallback for UpdatedRowCount {
    fn set_updated_row_count(&mut self, count: i64) {
        self.0 = count;
    }
}

/// Receives the keys generated by a statement, one inner list per row.
pub trait GeneratedKeysCallback {
    fn on_generated_keys(&mut self, keys: Vec<Vec<RowValues>>);
}

impl<F: FnMut(Vec<Vec<RowValues>>)> GeneratedKeysCallback for F {
    fn on_generated_keys(&mut self, keys: Vec<Vec<RowValues>>) {
        self(keys);
    }
}

/// Captures exactly one generated key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleGeneratedKey {
    key: Option<RowValues>,
}

impl SingleGeneratedKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured key.
    ///
    /// # Panics
    /// Panics if no key was delivered.
    #[must_use]
    pub fn generated_key(&self) -> &RowValues {
        match &self.key {
            Some(key) => key,
            None => panic!("no generated key was delivered"),
        }
    }

    /// The captured key, if one was delivered.
    #[must_use]
    pub fn try_generated_key(&self) -> Option<&RowValues> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn into_key(self) -> Option<RowValues> {
        self.key
    }
}

impl GeneratedKeysCallback for SingleGeneratedKey {
    /// # Panics
    /// Panics unless `keys` holds exactly one row with exactly one column.
    fn on_generated_keys(&mut self, keys: Vec<Vec<RowValues>>) {
        assert!(
            keys.len() == 1,
            "expected exactly one generated key row, got {}",
            keys.len()
        );
        let mut row = keys.into_iter().next().unwrap_or_default();
        assert!(
            row.len() == 1,
            "expected exactly one generated key column, got {}",
            row.len()
        );
        self.key = row.pop();
    }
}
