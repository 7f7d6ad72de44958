//! Error types for the annbridge library.
//!
//! Every failure that crosses the binding boundary is represented by the
//! [`AnnBridgeError`] enum. Engine messages are carried verbatim, argument
//! problems are caught before the engine is reached, and native faults are
//! reduced to a generic per-operation message.
//!
//! # Examples
//!
//! ```
//! use annbridge::error::{AnnBridgeError, ErrorCategory, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(AnnBridgeError::invalid_argument("Keys must be unsigned integers"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => assert_eq!(e.category(), ErrorCategory::Argument),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for annbridge operations.
#[derive(Error, Debug)]
pub enum AnnBridgeError {
    /// Wrong arity, wrong type or a lossy numeric conversion.
    #[error("{0}")]
    InvalidArgument(String),

    /// Vector length does not match the index dimensionality.
    #[error("Wrong number of dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Reservation or output allocation failed.
    #[error("Out of memory")]
    OutOfMemory,

    /// Failure reported by the engine, message passed through unmodified.
    #[error("{0}")]
    Engine(String),

    /// Native fault caught at the boundary.
    #[error("{0}")]
    OperationFailed(String),

    /// I/O errors while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with AnnBridgeError.
pub type Result<T> = std::result::Result<T, AnnBridgeError>;

/// Coarse classification of an [`AnnBridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any engine call.
    Argument,
    /// Allocation failure while growing or projecting results.
    Capacity,
    /// Reported by the engine's result object.
    Engine,
    /// Uncaught failure inside the engine.
    NativeFault,
}

impl AnnBridgeError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        AnnBridgeError::InvalidArgument(msg.into())
    }

    /// Create a new engine error.
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        AnnBridgeError::Engine(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        AnnBridgeError::DimensionMismatch { expected, actual }
    }

    /// Which part of the taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnnBridgeError::InvalidArgument(_)
            | AnnBridgeError::DimensionMismatch { .. }
            | AnnBridgeError::Io(_)
            | AnnBridgeError::Json(_) => ErrorCategory::Argument,
            AnnBridgeError::OutOfMemory => ErrorCategory::Capacity,
            AnnBridgeError::Engine(_) => ErrorCategory::Engine,
            AnnBridgeError::OperationFailed(_) => ErrorCategory::NativeFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = AnnBridgeError::invalid_argument("Keys must be unsigned integers");
        assert_eq!(error.to_string(), "Keys must be unsigned integers");

        let error = AnnBridgeError::engine("Duplicate keys are not allowed");
        assert_eq!(error.to_string(), "Duplicate keys are not allowed");

        let error = AnnBridgeError::dimension_mismatch(4, 3);
        assert_eq!(
            error.to_string(),
            "Wrong number of dimensions: expected 4, got 3"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            AnnBridgeError::dimension_mismatch(1, 2).category(),
            ErrorCategory::Argument
        );
        assert_eq!(AnnBridgeError::OutOfMemory.category(), ErrorCategory::Capacity);
        assert_eq!(
            AnnBridgeError::engine("corrupt").category(),
            ErrorCategory::Engine
        );
        assert_eq!(
            AnnBridgeError::OperationFailed("Search failed".into()).category(),
            ErrorCategory::NativeFault
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = AnnBridgeError::from(io_error);

        match error {
            AnnBridgeError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
