use crate::error::TxnMiddlewareError;

/// Result of running a unit of work through the
/// [`TransactionalEngine`](super::TransactionalEngine).
///
/// A failure never carries a value and a success never carries an error.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ExecutionOutcome<T, E = TxnMiddlewareError> {
    Success(T),
    Failure(E),
}

impl<T, E> ExecutionOutcome<T, E> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Failure(_))
    }

    /// Borrow the value of a successful execution.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            ExecutionOutcome::Success(value) => Some(value),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    /// Borrow the error of a failed execution.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            ExecutionOutcome::Success(_) => None,
            ExecutionOutcome::Failure(err) => Some(err),
        }
    }

    /// Consume the outcome and take the value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            ExecutionOutcome::Success(value) => Some(value),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    /// Consume the outcome and take the error, if any.
    #[must_use]
    pub fn into_error(self) -> Option<E> {
        match self {
            ExecutionOutcome::Success(_) => None,
            ExecutionOutcome::Failure(err) => Some(err),
        }
    }

    /// Convert into a `Result`.
    ///
    /// # Errors
    /// Returns the error of a failed execution.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            ExecutionOutcome::Success(value) => Ok(value),
            ExecutionOutcome::Failure(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExecutionOutcome<U, E> {
        match self {
            ExecutionOutcome::Success(value) => ExecutionOutcome::Success(f(value)),
            ExecutionOutcome::Failure(err) => ExecutionOutcome::Failure(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for ExecutionOutcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ExecutionOutcome::Success(value),
            Err(err) => ExecutionOutcome::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_agree_with_variant() {
        let ok: ExecutionOutcome<i32> = ExecutionOutcome::Success(3);
        assert!(ok.is_success() && !ok.is_failure());
        assert_eq!(ok.value(), Some(&3));
        assert!(ok.error().is_none());
        assert_eq!(ok.map(|v| v * 2).into_value(), Some(6));

        let failed: ExecutionOutcome<i32> = Err(TxnMiddlewareError::SessionBusy).into();
        assert!(failed.is_failure());
        assert!(failed.value().is_none());
        assert!(matches!(
            failed.into_result(),
            Err(TxnMiddlewareError::SessionBusy)
        ));
    }
}
