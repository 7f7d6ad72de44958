//! # annbridge
//!
//! A safe binding layer exposing an approximate-nearest-neighbor engine to a
//! host runtime.
//!
//! ## Features
//!
//! - Owning [`Index`] handle over any [`Engine`], with the exact-scan
//!   [`FlatEngine`] bundled
//! - Capacity grown in powers of two ahead of insertions
//! - Lossless conversion of host keys and vectors in [`host::HostIndex`]
//! - Engine errors passed through verbatim, native faults contained
//! - Save, load and memory-mapped views of persisted indexes

pub mod boundary;
pub mod engine;
pub mod error;
pub mod host;
pub mod index;
pub mod marshal;
pub mod options;

pub use engine::{Engine, FlatEngine, Key, MetricKind, ScalarKind};
pub use error::{AnnBridgeError, Result};
pub use index::{BatchFailure, BatchOutcome, Index, Match, Matches};
pub use options::IndexOptions;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
