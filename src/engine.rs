//! The engine seam.
//!
//! The binding layer never looks inside an index; it drives it through the
//! [`Engine`] trait, which mirrors the operations a native ANN engine offers:
//! construction from a metric and configuration, capacity reservation,
//! insertion, search, labeling (remove/rename), and persistence.
//!
//! # Module Structure
//!
//! - `metric`: distance metric kinds and kernels
//! - `scalar`: component storage kinds
//! - `flat`: the bundled exact-scan engine
//! - `file`: on-disk layout used by the bundled engine

pub mod file;
pub mod flat;
pub mod metric;
pub mod scalar;

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::options::IndexOptions;

pub use self::flat::FlatEngine;
pub use self::metric::MetricKind;
pub use self::scalar::ScalarKind;

/// Identifier of an entry in the index.
pub type Key = u64;

/// Graph degree used when the caller does not pick one.
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// Insertion search breadth used when the caller does not pick one.
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// Query search breadth used when the caller does not pick one.
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Failure reported by an engine call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Failure described by the engine itself.
    #[error("{0}")]
    Message(String),

    /// Memory could not be allocated.
    #[error("Out of memory")]
    OutOfMemory,
}

impl EngineError {
    /// Create a new message error.
    pub fn message<S: Into<String>>(msg: S) -> Self {
        EngineError::Message(msg.into())
    }
}

impl From<std::collections::TryReserveError> for EngineError {
    fn from(_: std::collections::TryReserveError) -> Self {
        EngineError::OutOfMemory
    }
}

/// Result type alias for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Outcome of a labeling operation (remove or rename).
///
/// No error together with `completed == false` means the key was absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationResult {
    /// Failure reported by the engine, if any.
    pub error: Option<EngineError>,
    /// Whether the operation changed the index.
    pub completed: bool,
}

impl OperationResult {
    /// An operation that changed the index.
    pub fn completed() -> Self {
        Self {
            error: None,
            completed: true,
        }
    }

    /// An operation that found nothing to do.
    pub fn skipped() -> Self {
        Self::default()
    }

    /// An operation that failed.
    pub fn failed(error: EngineError) -> Self {
        Self {
            error: Some(error),
            completed: false,
        }
    }

    /// Collapse into a `Result`.
    pub fn into_result(self) -> EngineResult<bool> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.completed),
        }
    }
}

/// Matches produced by an engine search, ascending by distance.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    matches: Vec<(Key, f32)>,
}

impl SearchOutcome {
    /// Wrap matches already ordered by ascending distance.
    pub fn new(matches: Vec<(Key, f32)>) -> Self {
        Self { matches }
    }

    /// Number of matches found.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether no match was found.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Copy matches into caller-owned buffers and return how many were written.
    pub fn dump_to(&self, keys: &mut [Key], distances: &mut [f32]) -> usize {
        let count = self.matches.len().min(keys.len()).min(distances.len());
        for (i, (key, distance)) in self.matches.iter().take(count).enumerate() {
            keys[i] = *key;
            distances[i] = *distance;
        }
        count
    }
}

/// Interface of an approximate nearest neighbor engine.
///
/// Engines are single-owner objects. Concurrent use of one engine is not
/// assumed; mutating calls take `&mut self`.
pub trait Engine: Send + fmt::Debug {
    /// Build an engine for the given options. Capacity is reserved separately.
    fn make(options: &IndexOptions) -> EngineResult<Self>
    where
        Self: Sized;

    /// Read the options recorded in a persisted index.
    fn metadata(path: &Path) -> EngineResult<IndexOptions>
    where
        Self: Sized;

    fn dimensions(&self) -> usize;
    fn size(&self) -> usize;
    fn capacity(&self) -> usize;
    fn connectivity(&self) -> usize;
    fn expansion_add(&self) -> usize;
    fn expansion_search(&self) -> usize;

    /// Bytes currently held by the engine.
    fn memory_usage(&self) -> usize;

    /// Make room for at least `capacity` entries. Never shrinks.
    fn reserve(&mut self, capacity: usize) -> EngineResult<()>;

    /// Insert one vector. Capacity must have been reserved beforehand.
    fn add(&mut self, key: Key, vector: &[f32]) -> EngineResult<()>;

    /// Find up to `wanted` nearest entries to `query`.
    fn search(&self, query: &[f32], wanted: usize) -> EngineResult<SearchOutcome>;

    fn remove(&mut self, key: Key) -> OperationResult;
    fn rename(&mut self, from: Key, to: Key) -> OperationResult;
    fn contains(&self, key: Key) -> bool;

    /// Number of entries stored under `key`.
    fn count(&self, key: Key) -> usize;

    /// Decoded vector stored under `key`, if any.
    fn get(&self, key: Key) -> EngineResult<Option<Vec<f32>>>;

    /// Deep copy into owned memory, detached from any viewed file.
    fn copy(&self) -> EngineResult<Self>
    where
        Self: Sized;

    /// Drop all entries, keeping reserved memory.
    fn clear(&mut self);

    /// Drop all entries and release memory, including any mapped file.
    fn reset(&mut self);

    fn save(&self, path: &Path) -> EngineResult<()>;
    fn load(&mut self, path: &Path) -> EngineResult<()>;
    fn view(&mut self, path: &Path) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_to_truncates_to_buffer() {
        let outcome = SearchOutcome::new(vec![(7, 0.0), (3, 0.5), (9, 1.0)]);
        let mut keys = [0u64; 2];
        let mut distances = [0f32; 2];
        assert_eq!(outcome.dump_to(&mut keys, &mut distances), 2);
        assert_eq!(keys, [7, 3]);
        assert_eq!(distances, [0.0, 0.5]);
    }

    #[test]
    fn test_operation_result() {
        assert_eq!(OperationResult::completed().into_result(), Ok(true));
        assert_eq!(OperationResult::skipped().into_result(), Ok(false));
        assert_eq!(
            OperationResult::failed(EngineError::message("Duplicate key")).into_result(),
            Err(EngineError::message("Duplicate key"))
        );
    }
}
