//! Error types for the datalayer event bridge.

use thiserror::Error;

/// Result type alias using datalayer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for datalayer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Product lookup failed
    #[error("Product not found: {0}")]
    ProductNotFound(u64),

    /// Order lookup failed
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Shared cache operation failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error points at inconsistent storefront data rather than
    /// bad input or failing infrastructure. Such errors belong in the Error Log.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::ProductNotFound(_) | Error::OrderNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_product_not_found() {
        let err = Error::ProductNotFound(42);
        assert_eq!(err.to_string(), "Product not found: 42");
    }

    #[test]
    fn test_error_display_order_not_found() {
        let err = Error::OrderNotFound("1001".to_string());
        assert_eq!(err.to_string(), "Order not found: 1001");
    }

    #[test]
    fn test_error_display_cache() {
        let err = Error::Cache("connection refused".to_string());
        assert_eq!(err.to_string(), "Cache error: connection refused");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("quantity must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid input: quantity must be at least 1");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid token".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid token");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("admin capability required".to_string());
        assert_eq!(err.to_string(), "Forbidden: admin capability required");
    }

    #[test]
    fn test_lookup_failures_are_classified() {
        assert!(Error::ProductNotFound(7).is_lookup_failure());
        assert!(Error::OrderNotFound("x".into()).is_lookup_failure());
        assert!(Error::NotFound("x".into()).is_lookup_failure());
        assert!(!Error::InvalidInput("x".into()).is_lookup_failure());
        assert!(!Error::Cache("x".into()).is_lookup_failure());
        assert!(!Error::Unauthorized("x".into()).is_lookup_failure());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
