//! Error type returned by [`TemplateStore`](crate::templates::TemplateStore)
//! operations.
//!
//! "Nothing matched" is never an error: mutations return `false` and reads
//! return `None` or an empty list. Errors are either rejected input or a
//! failed backend call, the latter tagged with the operation that issued it.

/// Failure of a template store operation.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Input rejected before anything was written.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The backing collection failed. `cause` carries the backend error chain.
    #[error("{operation} failed: {cause:#}")]
    Persistence {
        operation: &'static str,
        cause: anyhow::Error,
    },
}

impl TemplateError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns a closure wrapping a backend error for `operation`, for use
    /// with `map_err`.
    pub(crate) fn persistence(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |cause| Self::Persistence { operation, cause }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_message_names_operation_and_cause() {
        let cause = anyhow::anyhow!("disk full").context("insert chunk");
        let err = TemplateError::persistence("create")(cause);
        let msg = err.to_string();
        assert!(msg.starts_with("create failed: "), "got: {}", msg);
        assert!(msg.contains("insert chunk"));
        assert!(msg.contains("disk full"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_message() {
        let err = TemplateError::invalid("chunk_order must be >= 0");
        assert_eq!(err.to_string(), "invalid input: chunk_order must be >= 0");
        assert!(err.is_validation());
    }
}
