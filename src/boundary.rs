//! Error translation at the engine boundary.
//!
//! Engine calls fail in two ways: an error value, or an unwinding panic
//! raised from deep inside the engine. [`guarded`] runs a call, collapses
//! both into [`AnnBridgeError`], and keeps panic payloads from reaching the
//! caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::engine::{EngineError, EngineResult};
use crate::error::{AnnBridgeError, Result};

/// Engine operations, named for their generic failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Construction,
    Reservation,
    Insertion,
    Search,
    Removal,
    Rename,
    Lookup,
    Retrieval,
    Duplication,
    Serialization,
    Loading,
    MemoryMapping,
}

impl Operation {
    /// Message reported when the engine faults during this operation.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::Construction => "Construction failed",
            Operation::Reservation => "Reservation failed",
            Operation::Insertion => "Insertion failed",
            Operation::Search => "Search failed",
            Operation::Removal => "Removal failed",
            Operation::Rename => "Rename failed",
            Operation::Lookup => "Lookup failed",
            Operation::Retrieval => "Retrieval failed",
            Operation::Duplication => "Copy failed",
            Operation::Serialization => "Serialization failed",
            Operation::Loading => "Loading failed",
            Operation::MemoryMapping => "Memory-mapping failed",
        }
    }
}

impl From<EngineError> for AnnBridgeError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Message(message) => AnnBridgeError::Engine(message),
            EngineError::OutOfMemory => AnnBridgeError::OutOfMemory,
        }
    }
}

/// Run an engine call, translating its error value or panic.
pub fn guarded<T>(operation: Operation, call: impl FnOnce() -> EngineResult<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result.map_err(AnnBridgeError::from),
        Err(payload) => {
            error!(
                operation = operation.failure_message(),
                fault = panic_detail(payload.as_ref()),
                "engine fault caught at boundary"
            );
            Err(AnnBridgeError::OperationFailed(
                operation.failure_message().to_string(),
            ))
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "opaque panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_passes_values_through() {
        assert_eq!(guarded(Operation::Search, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_engine_message_is_verbatim() {
        let err = guarded::<()>(Operation::Rename, || {
            Err(EngineError::message("Key 2 already exists"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Key 2 already exists");
        assert_eq!(err.category(), ErrorCategory::Engine);
    }

    #[test]
    fn test_out_of_memory() {
        let err = guarded::<()>(Operation::Insertion, || Err(EngineError::OutOfMemory)).unwrap_err();
        assert!(matches!(err, AnnBridgeError::OutOfMemory));
        assert_eq!(err.to_string(), "Out of memory");
    }

    #[test]
    fn test_panic_becomes_generic_failure() {
        let err = guarded::<()>(Operation::Insertion, || panic!("segment table corrupted"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Insertion failed");
        assert_eq!(err.category(), ErrorCategory::NativeFault);

        let err = guarded::<()>(Operation::MemoryMapping, || panic!("bad page")).unwrap_err();
        assert_eq!(err.to_string(), "Memory-mapping failed");
    }
}
