//! Exact-scan engine.
//!
//! `FlatEngine` stores quantized vectors in one contiguous slab and answers
//! queries by scanning every entry. Connectivity and expansion factors are
//! recorded and reported but have no effect on an exhaustive scan.
//!
//! An engine either owns its slab or views a memory-mapped file. Views are
//! immutable: reserving beyond the file's capacity, adding, removing and
//! renaming all fail.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::engine::file::{self, FileHeader, Layout, MappedFile};
use crate::engine::{
    Engine, EngineError, EngineResult, Key, MetricKind, OperationResult, ScalarKind,
    SearchOutcome,
};
use crate::options::IndexOptions;

const IMMUTABLE_VIEW: &str = "Can't modify an immutable index view";

#[derive(Debug)]
enum Storage {
    Owned { keys: Vec<Key>, vectors: Vec<u8> },
    Viewed { file: MappedFile, path: PathBuf },
}

/// Engine performing exact search over a flat slab of vectors.
#[derive(Debug)]
pub struct FlatEngine {
    options: IndexOptions,
    bytes_per_vector: usize,
    capacity: usize,
    slots: AHashMap<Key, usize>,
    storage: Storage,
}

impl FlatEngine {
    /// Whether the engine currently serves a memory-mapped file.
    pub fn is_view(&self) -> bool {
        matches!(self.storage, Storage::Viewed { .. })
    }

    fn key_at(&self, slot: usize) -> Key {
        match &self.storage {
            Storage::Owned { keys, .. } => keys[slot],
            Storage::Viewed { file, .. } => file.key(slot),
        }
    }

    fn vector_at(&self, slot: usize) -> &[u8] {
        match &self.storage {
            Storage::Owned { vectors, .. } => {
                let start = slot * self.bytes_per_vector;
                &vectors[start..start + self.bytes_per_vector]
            }
            Storage::Viewed { file, .. } => file.vector(slot),
        }
    }

    /// Reject files built for a different dimensionality, metric or scalar kind.
    fn check_compatible(&self, header: &FileHeader, path: &Path) -> EngineResult<()> {
        let options = &self.options;
        if header.dimensions != options.dimensions as u64
            || header.metric != options.metric
            || header.quantization != options.quantization
        {
            return Err(EngineError::message(format!(
                "Index file {} holds {} dimensions with {}/{}, expected {} dimensions with {}/{}",
                path.display(),
                header.dimensions,
                header.metric.name(),
                header.quantization.name(),
                options.dimensions,
                options.metric.name(),
                options.quantization.name(),
            )));
        }
        Ok(())
    }

    fn index_slots(
        count: usize,
        capacity: usize,
        key_at: impl Fn(usize) -> Key,
        path: &Path,
    ) -> EngineResult<AHashMap<Key, usize>> {
        let mut slots = AHashMap::new();
        slots.try_reserve(capacity.max(count))?;
        for slot in 0..count {
            let key = key_at(slot);
            if slots.insert(key, slot).is_some() {
                return Err(EngineError::message(format!(
                    "Index file {} is corrupted: key {key} appears twice",
                    path.display()
                )));
            }
        }
        Ok(slots)
    }

    /// Gather live entries into owned slabs with room for `capacity` entries.
    fn owned_slabs(&self, capacity: usize) -> EngineResult<(Vec<Key>, Vec<u8>)> {
        let size = self.size();
        let mut keys = Vec::new();
        keys.try_reserve_exact(capacity.max(size))?;
        let mut vectors = Vec::new();
        vectors.try_reserve_exact(
            capacity
                .max(size)
                .checked_mul(self.bytes_per_vector)
                .ok_or(EngineError::OutOfMemory)?,
        )?;
        for slot in 0..size {
            keys.push(self.key_at(slot));
            vectors.extend_from_slice(self.vector_at(slot));
        }
        Ok((keys, vectors))
    }

    fn is_backing_file(&self, path: &Path) -> bool {
        let Storage::Viewed { path: viewed, .. } = &self.storage else {
            return false;
        };
        match (std::fs::canonicalize(viewed), std::fs::canonicalize(path)) {
            (Ok(viewed), Ok(target)) => viewed == target,
            _ => false,
        }
    }
}

impl Engine for FlatEngine {
    fn make(options: &IndexOptions) -> EngineResult<Self> {
        if options.metric == MetricKind::Unknown {
            return Err(EngineError::message("Unknown metric kind"));
        }
        if options.quantization == ScalarKind::Unknown {
            return Err(EngineError::message("Unknown scalar kind"));
        }
        if options.metric == MetricKind::Haversine && options.dimensions < 2 {
            return Err(EngineError::message(
                "Haversine metric requires at least 2 dimensions",
            ));
        }

        Ok(Self {
            options: IndexOptions {
                capacity: 0,
                ..options.clone()
            },
            bytes_per_vector: options.quantization.bytes_per_vector(options.dimensions),
            capacity: 0,
            slots: AHashMap::new(),
            storage: Storage::Owned {
                keys: Vec::new(),
                vectors: Vec::new(),
            },
        })
    }

    fn metadata(path: &Path) -> EngineResult<IndexOptions> {
        Ok(file::read_header(path)?.options())
    }

    fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    fn size(&self) -> usize {
        self.slots.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn connectivity(&self) -> usize {
        self.options.connectivity
    }

    fn expansion_add(&self) -> usize {
        self.options.expansion_add
    }

    fn expansion_search(&self) -> usize {
        self.options.expansion_search
    }

    fn memory_usage(&self) -> usize {
        let slots = self.slots.capacity() * std::mem::size_of::<(Key, usize)>();
        match &self.storage {
            Storage::Owned { keys, vectors } => {
                slots + keys.capacity() * std::mem::size_of::<Key>() + vectors.capacity()
            }
            Storage::Viewed { file, .. } => slots + file.mapped_len(),
        }
    }

    fn reserve(&mut self, capacity: usize) -> EngineResult<()> {
        if capacity <= self.capacity {
            return Ok(());
        }

        let Storage::Owned { keys, vectors } = &mut self.storage else {
            return Err(EngineError::message(IMMUTABLE_VIEW));
        };

        let slab_len = capacity
            .checked_mul(self.bytes_per_vector)
            .ok_or(EngineError::OutOfMemory)?;
        let additional_keys = capacity - keys.len();
        let additional_bytes = slab_len - vectors.len();
        let additional_slots = capacity - self.slots.len();
        keys.try_reserve_exact(additional_keys)?;
        vectors.try_reserve_exact(additional_bytes)?;
        self.slots.try_reserve(additional_slots)?;

        self.capacity = capacity;
        Ok(())
    }

    fn add(&mut self, key: Key, vector: &[f32]) -> EngineResult<()> {
        let Storage::Owned { keys, vectors } = &mut self.storage else {
            return Err(EngineError::message(IMMUTABLE_VIEW));
        };

        if vector.len() != self.options.dimensions {
            return Err(EngineError::message("Wrong number of dimensions"));
        }
        if self.slots.contains_key(&key) {
            return Err(EngineError::message("Duplicate keys are not allowed"));
        }
        if keys.len() >= self.capacity {
            return Err(EngineError::message("Reserve capacity ahead of insertions"));
        }

        let slot = keys.len();
        keys.push(key);
        self.options.quantization.encode(vector, vectors);
        self.slots.insert(key, slot);
        Ok(())
    }

    fn search(&self, query: &[f32], wanted: usize) -> EngineResult<SearchOutcome> {
        if query.len() != self.options.dimensions {
            return Err(EngineError::message("Wrong number of dimensions"));
        }

        let size = self.size();
        if wanted == 0 || size == 0 {
            return Ok(SearchOutcome::default());
        }

        let metric = self.options.metric;
        let quantization = self.options.quantization;
        let mut scratch = vec![0.0f32; self.options.dimensions];
        let mut candidates: Vec<(Key, f32)> = Vec::new();
        candidates.try_reserve_exact(size)?;

        for slot in 0..size {
            quantization.decode(self.vector_at(slot), &mut scratch);
            candidates.push((self.key_at(slot), metric.distance(query, &scratch)));
        }

        let by_distance =
            |a: &(Key, f32), b: &(Key, f32)| -> Ordering { a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)) };

        if wanted < candidates.len() {
            candidates.select_nth_unstable_by(wanted - 1, by_distance);
            candidates.truncate(wanted);
        }
        candidates.sort_unstable_by(by_distance);

        Ok(SearchOutcome::new(candidates))
    }

    fn remove(&mut self, key: Key) -> OperationResult {
        let Storage::Owned { keys, vectors } = &mut self.storage else {
            return OperationResult::failed(EngineError::message(IMMUTABLE_VIEW));
        };

        let Some(slot) = self.slots.remove(&key) else {
            return OperationResult::skipped();
        };

        let last = keys.len() - 1;
        keys.swap_remove(slot);
        if slot != last {
            let width = self.bytes_per_vector;
            vectors.copy_within(last * width..(last + 1) * width, slot * width);
            self.slots.insert(keys[slot], slot);
        }
        vectors.truncate(last * self.bytes_per_vector);

        OperationResult::completed()
    }

    fn rename(&mut self, from: Key, to: Key) -> OperationResult {
        let Storage::Owned { keys, .. } = &mut self.storage else {
            return OperationResult::failed(EngineError::message(IMMUTABLE_VIEW));
        };

        if !self.slots.contains_key(&from) {
            return OperationResult::skipped();
        }
        if from == to {
            return OperationResult::completed();
        }
        if self.slots.contains_key(&to) {
            return OperationResult::failed(EngineError::message(format!(
                "Key {to} already exists"
            )));
        }

        if let Some(slot) = self.slots.remove(&from) {
            keys[slot] = to;
            self.slots.insert(to, slot);
        }
        OperationResult::completed()
    }

    fn contains(&self, key: Key) -> bool {
        self.slots.contains_key(&key)
    }

    fn count(&self, key: Key) -> usize {
        usize::from(self.slots.contains_key(&key))
    }

    fn get(&self, key: Key) -> EngineResult<Option<Vec<f32>>> {
        let Some(&slot) = self.slots.get(&key) else {
            return Ok(None);
        };

        let mut vector = Vec::new();
        vector.try_reserve_exact(self.options.dimensions)?;
        vector.resize(self.options.dimensions, 0.0);
        self.options
            .quantization
            .decode(self.vector_at(slot), &mut vector);
        Ok(Some(vector))
    }

    fn copy(&self) -> EngineResult<Self> {
        let capacity = self.capacity.max(self.size());
        let (keys, vectors) = self.owned_slabs(capacity)?;

        let mut slots = AHashMap::new();
        slots.try_reserve(capacity)?;
        slots.extend(keys.iter().enumerate().map(|(slot, &key)| (key, slot)));

        Ok(Self {
            options: self.options.clone(),
            bytes_per_vector: self.bytes_per_vector,
            capacity,
            slots,
            storage: Storage::Owned { keys, vectors },
        })
    }

    fn clear(&mut self) {
        if let Storage::Owned { keys, vectors } = &mut self.storage {
            keys.clear();
            vectors.clear();
            self.slots.clear();
        } else {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.storage = Storage::Owned {
            keys: Vec::new(),
            vectors: Vec::new(),
        };
        self.slots = AHashMap::new();
        self.capacity = 0;
    }

    fn save(&self, path: &Path) -> EngineResult<()> {
        let header = FileHeader::new(&self.options, self.size(), self.capacity);
        match &self.storage {
            Storage::Owned { keys, vectors } => file::write(path, &header, keys, vectors),
            Storage::Viewed { .. } => {
                if self.is_backing_file(path) {
                    return Err(EngineError::message(
                        "Can't overwrite the file backing an index view",
                    ));
                }
                let (keys, vectors) = self.owned_slabs(0)?;
                file::write(path, &header, &keys, &vectors)
            }
        }
    }

    fn load(&mut self, path: &Path) -> EngineResult<()> {
        let (data, layout) = file::read(path)?;
        self.check_compatible(&layout.header, path)?;

        let size = layout.header.size as usize;
        let capacity = (layout.header.capacity as usize).max(size);
        let slots = Self::index_slots(size, capacity, |slot| layout.key(&data, slot), path)?;

        let mut keys = Vec::new();
        keys.try_reserve_exact(capacity)?;
        keys.extend((0..size).map(|slot| layout.key(&data, slot)));

        let mut vectors = Vec::new();
        vectors.try_reserve_exact(
            capacity
                .checked_mul(self.bytes_per_vector)
                .ok_or(EngineError::OutOfMemory)?,
        )?;
        let Layout {
            vectors_offset,
            bytes_per_vector,
            ..
        } = layout;
        vectors.extend_from_slice(&data[vectors_offset..vectors_offset + size * bytes_per_vector]);

        self.storage = Storage::Owned { keys, vectors };
        self.slots = slots;
        self.capacity = capacity;
        Ok(())
    }

    fn view(&mut self, path: &Path) -> EngineResult<()> {
        let mapped = MappedFile::open(path)?;
        self.check_compatible(mapped.header(), path)?;

        let size = mapped.len();
        let capacity = (mapped.header().capacity as usize).max(size);
        let slots = Self::index_slots(size, size, |slot| mapped.key(slot), path)?;

        self.storage = Storage::Viewed {
            file: mapped,
            path: path.to_path_buf(),
        };
        self.slots = slots;
        self.capacity = capacity;
        Ok(())
    }
}
