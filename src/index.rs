//! The index handle.
//!
//! [`Index`] owns exactly one engine. Every public call validates its
//! arguments first, grows capacity when an insertion needs it, then crosses
//! into the engine through [`guarded`], so callers only ever see
//! [`AnnBridgeError`].
//!
//! ```
//! use annbridge::{Index, IndexOptions};
//!
//! # fn example() -> annbridge::error::Result<()> {
//! let mut index: Index = Index::new(IndexOptions::builder(4).build()?)?;
//! index.add(1, &[1.0, 0.0, 0.0, 0.0])?;
//! index.add(2, &[0.0, 1.0, 0.0, 0.0])?;
//!
//! let matches = index.search(&[1.0, 0.0, 0.0, 0.0], 1)?;
//! assert_eq!(matches.keys, vec![1]);
//! assert_eq!(matches.count, 1);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::boundary::{Operation, guarded};
use crate::engine::{Engine, FlatEngine, Key, MetricKind, ScalarKind};
use crate::error::{AnnBridgeError, Result};
use crate::options::IndexOptions;

/// Owning handle around one engine instance.
///
/// The handle is neither `Clone` nor shareable; the engine is released when
/// the handle is dropped. Mutating calls take `&mut self`.
#[derive(Debug)]
pub struct Index<E: Engine = FlatEngine> {
    engine: E,
    options: IndexOptions,
}

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Match {
    pub key: Key,
    pub distance: f32,
}

/// Search results, ascending by distance.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Matches {
    pub keys: Vec<Key>,
    pub distances: Vec<f32>,
    pub count: usize,
}

impl Matches {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get the hit at `position`.
    pub fn get(&self, position: usize) -> Option<Match> {
        Some(Match {
            key: *self.keys.get(position)?,
            distance: *self.distances.get(position)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Match> + '_ {
        self.keys
            .iter()
            .zip(self.distances.iter())
            .map(|(&key, &distance)| Match { key, distance })
    }
}

/// An entry of a batch insertion that was skipped.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the entry in the batch.
    pub position: usize,
    pub key: Key,
    pub error: AnnBridgeError,
}

/// Result of a batch insertion.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Number of entries inserted.
    pub inserted: usize,
    /// Entries that failed, in batch order.
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Whether every entry was inserted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Surface the first failure, if any.
    pub fn into_result(self) -> Result<usize> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.inserted),
        }
    }
}

impl<E: Engine> Index<E> {
    /// Build an engine for `options` and reserve its initial capacity.
    pub fn new(options: IndexOptions) -> Result<Self> {
        let mut engine = guarded(Operation::Construction, || E::make(&options))?;
        guarded(Operation::Reservation, || engine.reserve(options.capacity))?;

        debug!(
            dimensions = options.dimensions,
            metric = options.metric.name(),
            quantization = options.quantization.name(),
            capacity = options.capacity,
            "index created"
        );
        Ok(Self { engine, options })
    }

    /// Read the options recorded in a persisted index without loading it.
    pub fn metadata<P: AsRef<Path>>(path: P) -> Result<IndexOptions> {
        let path = checked_path(path.as_ref())?;
        guarded(Operation::Loading, || E::metadata(path))
    }

    /// Build a handle matching a persisted index, then load or view it.
    pub fn restore<P: AsRef<Path>>(path: P, view: bool) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::metadata(path)?;
        let mut index = Self::new(IndexOptions {
            capacity: 0,
            ..options
        })?;
        if view {
            index.view(path)?;
        } else {
            index.load(path)?;
        }
        Ok(index)
    }

    /// The options this handle was built with.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// The engine this handle owns.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Number of components in every vector.
    pub fn dimensions(&self) -> usize {
        self.engine.dimensions()
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.engine.size()
    }

    /// Entries that fit before the next reservation.
    pub fn capacity(&self) -> usize {
        self.engine.capacity()
    }

    /// Graph degree reported by the engine.
    pub fn connectivity(&self) -> usize {
        self.engine.connectivity()
    }

    /// Search breadth used during insertion.
    pub fn expansion_add(&self) -> usize {
        self.engine.expansion_add()
    }

    /// Search breadth used during queries.
    pub fn expansion_search(&self) -> usize {
        self.engine.expansion_search()
    }

    /// Distance metric.
    pub fn metric(&self) -> MetricKind {
        self.options.metric
    }

    /// Component storage kind.
    pub fn quantization(&self) -> ScalarKind {
        self.options.quantization
    }

    /// Bytes currently held by the engine.
    pub fn memory_usage(&self) -> usize {
        self.engine.memory_usage()
    }

    /// Insert one vector under `key`.
    pub fn add(&mut self, key: Key, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;
        self.ensure_capacity(1)?;
        self.insert(key, vector)
    }

    /// Insert a batch of vectors.
    ///
    /// Capacity is reserved once for the whole batch. Entries are then
    /// inserted one by one; an entry that fails is logged, recorded in the
    /// outcome and skipped, and entries already inserted stay in place.
    pub fn add_many<V: AsRef<[f32]>>(&mut self, keys: &[Key], vectors: &[V]) -> Result<BatchOutcome> {
        if keys.len() != vectors.len() {
            return Err(AnnBridgeError::invalid_argument(
                "The number of keys must match the number of vectors",
            ));
        }

        if keys.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.ensure_capacity(keys.len())?;
        Ok(self.insert_each(keys, vectors))
    }

    /// Insert entries one by one without reserving, recording failures.
    pub(crate) fn insert_each<V: AsRef<[f32]>>(&mut self, keys: &[Key], vectors: &[V]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (position, (&key, vector)) in keys.iter().zip(vectors).enumerate() {
            let vector = vector.as_ref();
            match self
                .check_dimensions(vector)
                .and_then(|()| self.insert(key, vector))
            {
                Ok(()) => outcome.inserted += 1,
                Err(error) => {
                    warn!(position, key, %error, "skipping batch entry");
                    outcome.failures.push(BatchFailure {
                        position,
                        key,
                        error,
                    });
                }
            }
        }
        outcome
    }

    /// Find up to `wanted` nearest entries to `query`.
    pub fn search(&self, query: &[f32], wanted: usize) -> Result<Matches> {
        self.check_dimensions(query)?;

        let mut keys = output_buffer::<Key>(wanted)?;
        let mut distances = output_buffer::<f32>(wanted)?;

        let outcome = guarded(Operation::Search, || self.engine.search(query, wanted))?;
        let filled = outcome.len().min(wanted);
        keys.resize(filled, 0);
        distances.resize(filled, 0.0);
        let count = outcome.dump_to(&mut keys, &mut distances);
        keys.truncate(count);
        distances.truncate(count);

        Ok(Matches {
            keys,
            distances,
            count,
        })
    }

    /// Remove `key`. Returns `false` when the key was absent.
    pub fn remove(&mut self, key: Key) -> Result<bool> {
        guarded(Operation::Removal, || self.engine.remove(key).into_result())
    }

    /// Rename `from` to `to`. Returns `false` when `from` was absent.
    pub fn rename(&mut self, from: Key, to: Key) -> Result<bool> {
        guarded(Operation::Rename, || self.engine.rename(from, to).into_result())
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: Key) -> Result<bool> {
        guarded(Operation::Lookup, || Ok(self.engine.contains(key)))
    }

    /// Number of entries stored under `key`.
    pub fn count(&self, key: Key) -> Result<usize> {
        guarded(Operation::Lookup, || Ok(self.engine.count(key)))
    }

    /// The vector stored under `key`, decoded from its quantized form.
    pub fn get(&self, key: Key) -> Result<Option<Vec<f32>>> {
        guarded(Operation::Retrieval, || self.engine.get(key))
    }

    /// An independent handle holding a copy of every entry.
    ///
    /// Copying a view yields a mutable, in-memory index.
    pub fn copy(&self) -> Result<Self> {
        let engine = guarded(Operation::Duplication, || self.engine.copy())?;
        Ok(Self {
            engine,
            options: self.options.clone(),
        })
    }

    /// Drop every entry, keeping reserved capacity.
    pub fn clear(&mut self) {
        self.engine.clear();
    }

    /// Drop every entry and release memory, detaching any viewed file.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// Serialize the index to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = checked_path(path.as_ref())?;
        guarded(Operation::Serialization, || self.engine.save(path))?;
        debug!(path = %path.display(), size = self.size(), "index saved");
        Ok(())
    }

    /// Replace the index contents with the file at `path`, read into memory.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = checked_path(path.as_ref())?;
        guarded(Operation::Loading, || self.engine.load(path))?;
        debug!(path = %path.display(), size = self.size(), "index loaded");
        Ok(())
    }

    /// Serve the file at `path` through a read-only memory map.
    pub fn view<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = checked_path(path.as_ref())?;
        guarded(Operation::MemoryMapping, || self.engine.view(path))?;
        debug!(path = %path.display(), size = self.size(), "index viewed");
        Ok(())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.engine.dimensions();
        if vector.len() != expected {
            return Err(AnnBridgeError::dimension_mismatch(expected, vector.len()));
        }
        Ok(())
    }

    /// Grow capacity to the next power of two when `incoming` entries would not fit.
    pub(crate) fn ensure_capacity(&mut self, incoming: usize) -> Result<()> {
        let size = self.engine.size();
        let needed = size
            .checked_add(incoming)
            .ok_or(AnnBridgeError::OutOfMemory)?;
        if needed < self.engine.capacity() {
            return Ok(());
        }

        let target = needed
            .checked_next_power_of_two()
            .ok_or(AnnBridgeError::OutOfMemory)?;
        debug!(size, needed, target, "growing index capacity");
        guarded(Operation::Reservation, || self.engine.reserve(target))
    }

    fn insert(&mut self, key: Key, vector: &[f32]) -> Result<()> {
        guarded(Operation::Insertion, || self.engine.add(key, vector))
    }
}

fn checked_path(path: &Path) -> Result<&Path> {
    if path.as_os_str().is_empty() {
        return Err(AnnBridgeError::invalid_argument(
            "Function expects a non-empty path",
        ));
    }
    Ok(path)
}

/// Reserve room for `length` results; only the filled prefix is ever written.
fn output_buffer<T>(length: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(length)
        .map_err(|_| AnnBridgeError::OutOfMemory)?;
    Ok(buffer)
}
