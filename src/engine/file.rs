//! On-disk layout of the bundled engine.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ magic: b"ANNB" (4 bytes)            │
//! │ version: u16                        │
//! │ header_len: u32                     │
//! │ header: bincode(FileHeader)         │
//! │ header_crc32: u32                   │
//! ├─────────────────────────────────────┤
//! │ Key Slab                            │
//! │   size × u64                        │
//! ├─────────────────────────────────────┤
//! │ Padding (to 64-byte alignment)      │
//! ├─────────────────────────────────────┤
//! │ Vector Slab                         │
//! │   size × bytes_per_vector           │
//! └─────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, EngineResult, Key, MetricKind, ScalarKind};
use crate::options::IndexOptions;

/// Magic bytes identifying an index file.
const MAGIC: [u8; 4] = *b"ANNB";

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Alignment boundary for the vector slab.
const VECTOR_ALIGN_BYTES: usize = 64;

/// Bytes before the header record: magic, version, header length.
const PREAMBLE_SIZE: usize = 4 + 2 + 4;

/// Upper bound on the header record, to reject garbage lengths early.
const MAX_HEADER_SIZE: usize = 4096;

/// Options and counters recorded in an index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub dimensions: u64,
    pub metric: MetricKind,
    pub quantization: ScalarKind,
    pub connectivity: u64,
    pub expansion_add: u64,
    pub expansion_search: u64,
    pub size: u64,
    pub capacity: u64,
}

impl FileHeader {
    /// Build a header describing an index with the given options and counters.
    pub fn new(options: &IndexOptions, size: usize, capacity: usize) -> Self {
        Self {
            dimensions: options.dimensions as u64,
            metric: options.metric,
            quantization: options.quantization,
            connectivity: options.connectivity as u64,
            expansion_add: options.expansion_add as u64,
            expansion_search: options.expansion_search as u64,
            size: size as u64,
            capacity: capacity as u64,
        }
    }

    /// Options an index reading this file must be built with.
    pub fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions as usize,
            capacity: self.capacity as usize,
            connectivity: self.connectivity as usize,
            expansion_add: self.expansion_add as usize,
            expansion_search: self.expansion_search as usize,
            metric: self.metric,
            quantization: self.quantization,
        }
    }

    fn bytes_per_vector(&self) -> usize {
        self.quantization.bytes_per_vector(self.dimensions as usize)
    }
}

/// Offsets of the slabs inside a parsed file.
#[derive(Debug, Clone)]
pub struct Layout {
    pub header: FileHeader,
    pub keys_offset: usize,
    pub vectors_offset: usize,
    pub bytes_per_vector: usize,
}

impl Layout {
    /// Validate `data` as a complete index file.
    pub fn parse(data: &[u8], path: &Path) -> EngineResult<Self> {
        let header = parse_header(data, path)?;
        let header_len = read_u32(&data[6..10]) as usize;
        let keys_offset = PREAMBLE_SIZE + header_len + 4;

        let size = usize::try_from(header.size).map_err(|_| corrupted(path, "size overflow"))?;
        let bytes_per_vector = header.bytes_per_vector();
        let keys_end = size
            .checked_mul(8)
            .and_then(|len| len.checked_add(keys_offset))
            .ok_or_else(|| corrupted(path, "key slab size overflow"))?;
        let vectors_offset = align_up(keys_end, VECTOR_ALIGN_BYTES);
        let expected_len = size
            .checked_mul(bytes_per_vector)
            .and_then(|len| len.checked_add(vectors_offset))
            .ok_or_else(|| corrupted(path, "vector slab size overflow"))?;

        if data.len() < expected_len {
            return Err(corrupted(
                path,
                &format!(
                    "file too small: expected at least {expected_len} bytes, got {}",
                    data.len()
                ),
            ));
        }

        Ok(Self {
            header,
            keys_offset,
            vectors_offset,
            bytes_per_vector,
        })
    }

    /// Key stored in slot `slot`.
    pub fn key(&self, data: &[u8], slot: usize) -> Key {
        let start = self.keys_offset + slot * 8;
        LittleEndian::read_u64(&data[start..start + 8])
    }

    /// Encoded vector stored in slot `slot`.
    pub fn vector<'a>(&self, data: &'a [u8], slot: usize) -> &'a [u8] {
        let start = self.vectors_offset + slot * self.bytes_per_vector;
        &data[start..start + self.bytes_per_vector]
    }
}

/// Write an index file.
pub fn write(path: &Path, header: &FileHeader, keys: &[Key], vectors: &[u8]) -> EngineResult<()> {
    let record = bincode::serialize(header)
        .map_err(|e| EngineError::message(format!("Failed to encode index header: {e}")))?;
    let file = File::create(path).map_err(|e| io_failure("create", path, e))?;
    let mut out = BufWriter::new(file);

    let write_all = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        out.write_all(&MAGIC)?;
        out.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        out.write_u32::<LittleEndian>(record.len() as u32)?;
        out.write_all(&record)?;
        out.write_u32::<LittleEndian>(crc32fast::hash(&record))?;

        for &key in keys {
            out.write_u64::<LittleEndian>(key)?;
        }

        let keys_end = PREAMBLE_SIZE + record.len() + 4 + keys.len() * 8;
        let padding = align_up(keys_end, VECTOR_ALIGN_BYTES) - keys_end;
        out.write_all(&[0u8; VECTOR_ALIGN_BYTES][..padding])?;

        out.write_all(vectors)?;
        out.flush()
    };

    write_all(&mut out).map_err(|e| io_failure("write", path, e))
}

/// Read only the header of an index file.
pub fn read_header(path: &Path) -> EngineResult<FileHeader> {
    let file = File::open(path).map_err(|e| io_failure("open", path, e))?;
    let mut input = BufReader::new(file);

    let mut preamble = [0u8; PREAMBLE_SIZE];
    input
        .read_exact(&mut preamble)
        .map_err(|_| corrupted(path, "file too small"))?;
    let header_len = read_u32(&preamble[6..10]) as usize;
    if header_len > MAX_HEADER_SIZE {
        return Err(corrupted(path, "header length out of range"));
    }

    let mut rest = vec![0u8; header_len + 4];
    input
        .read_exact(&mut rest)
        .map_err(|_| corrupted(path, "truncated header"))?;

    let mut data = preamble.to_vec();
    data.extend_from_slice(&rest);
    parse_header(&data, path)
}

/// Read a whole index file into memory.
pub fn read(path: &Path) -> EngineResult<(Vec<u8>, Layout)> {
    let mut file = File::open(path).map_err(|e| io_failure("open", path, e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| io_failure("read", path, e))?;
    let layout = Layout::parse(&data, path)?;
    Ok((data, layout))
}

/// A read-only memory-mapped index file.
#[derive(Debug)]
pub struct MappedFile {
    mmap: Mmap,
    layout: Layout,
}

impl MappedFile {
    /// Map an index file.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| io_failure("open", path, e))?;

        // SAFETY: the mapping is read-only. The file must not be truncated
        // while it is viewed.
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| io_failure("map", path, e))?;
        let layout = Layout::parse(&mmap, path)?;

        Ok(Self { mmap, layout })
    }

    pub fn header(&self) -> &FileHeader {
        &self.layout.header
    }

    pub fn len(&self) -> usize {
        self.layout.header.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key(&self, slot: usize) -> Key {
        self.layout.key(&self.mmap, slot)
    }

    pub fn vector(&self, slot: usize) -> &[u8] {
        self.layout.vector(&self.mmap, slot)
    }

    /// Size of the mapping in bytes.
    pub fn mapped_len(&self) -> usize {
        self.mmap.len()
    }
}

fn parse_header(data: &[u8], path: &Path) -> EngineResult<FileHeader> {
    if data.len() < PREAMBLE_SIZE || data[..4] != MAGIC {
        return Err(corrupted(path, "not an index file"));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(EngineError::message(format!(
            "Unsupported index file version {version} in {}",
            path.display()
        )));
    }

    let header_len = read_u32(&data[6..10]) as usize;
    if header_len > MAX_HEADER_SIZE || data.len() < PREAMBLE_SIZE + header_len + 4 {
        return Err(corrupted(path, "truncated header"));
    }

    let record = &data[PREAMBLE_SIZE..PREAMBLE_SIZE + header_len];
    let stored_crc = read_u32(&data[PREAMBLE_SIZE + header_len..PREAMBLE_SIZE + header_len + 4]);
    if crc32fast::hash(record) != stored_crc {
        return Err(corrupted(path, "header checksum mismatch"));
    }

    bincode::deserialize(record).map_err(|e| corrupted(path, &format!("bad header: {e}")))
}

fn read_u32(mut bytes: &[u8]) -> u32 {
    bytes.read_u32::<LittleEndian>().unwrap_or(0)
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

fn corrupted(path: &Path, detail: &str) -> EngineError {
    EngineError::message(format!(
        "Index file {} is corrupted: {detail}",
        path.display()
    ))
}

fn io_failure(action: &str, path: &Path, error: std::io::Error) -> EngineError {
    EngineError::message(format!("Failed to {action} {}: {error}", path.display()))
}
