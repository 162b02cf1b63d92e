use crate::types::RowValues;

/// Supplies bind values for a prepared statement.
///
/// `value_count` must equal the number of bind placeholders in the SQL, and
/// `ordered_values` must return exactly that many values in placeholder
/// order. The executor checks both before it touches a connection and panics
/// on a mismatch.
pub trait PreparedStatementDataProvider {
    /// Number of values this provider binds.
    fn value_count(&self) -> usize;

    /// The values to bind, in placeholder order.
    fn ordered_values(&self) -> Vec<RowValues>;
}

/// A provider over a fixed list of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPreparedStatementDataProvider {
    values: Vec<RowValues>,
}

impl ConstantPreparedStatementDataProvider {
    #[must_use]
    pub fn new(values: Vec<RowValues>) -> Self {
        Self { values }
    }

    /// A provider that binds nothing, for statements without placeholders.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append one value.
    #[must_use]
    pub fn with(mut self, value: impl Into<RowValues>) -> Self {
        self.values.push(value.into());
        self
    }
}

impl<V: Into<RowValues>> FromIterator<V> for ConstantPreparedStatementDataProvider {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl PreparedStatementDataProvider for ConstantPreparedStatementDataProvider {
    fn value_count(&self) -> usize {
        self.values.len()
    }

    fn ordered_values(&self) -> Vec<RowValues> {
        self.values.clone()
    }
}

impl PreparedStatementDataProvider for Vec<RowValues> {
    fn value_count(&self) -> usize {
        self.len()
    }

    fn ordered_values(&self) -> Vec<RowValues> {
        self.clone()
    }
}

impl PreparedStatementDataProvider for [RowValues] {
    fn value_count(&self) -> usize {
        self.len()
    }

    fn ordered_values(&self) -> Vec<RowValues> {
        self.to_vec()
    }
}

impl<const N: usize> PreparedStatementDataProvider for [RowValues; N] {
    fn value_count(&self) -> usize {
        N
    }

    fn ordered_values(&self) -> Vec<RowValues> {
        self.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_provider_keeps_order() {
        let provider = ConstantPreparedStatementDataProvider::empty()
            .with(1_i64)
            .with("two")
            .with(None::<i64>);
        assert_eq!(provider.value_count(), 3);
        assert_eq!(
            provider.ordered_values(),
            vec![
                RowValues::Int(1),
                RowValues::Text("two".into()),
                RowValues::Null
            ]
        );
    }

    #[test]
    fn collects_from_iterator() {
        let provider: ConstantPreparedStatementDataProvider = (1..=3_i64).collect();
        assert_eq!(provider.value_count(), 3);
        assert_eq!(provider.ordered_values()[2], RowValues::Int(3));
    }
}
