//! Index construction options.
//!
//! [`IndexOptions`] is the immutable configuration snapshot an [`crate::Index`]
//! is built from. It can be assembled three ways:
//!
//! ```
//! use annbridge::options::IndexOptions;
//! use annbridge::{MetricKind, ScalarKind};
//! use serde_json::json;
//!
//! # fn example() -> annbridge::error::Result<()> {
//! // Typed builder
//! let typed = IndexOptions::builder(256)
//!     .metric(MetricKind::Cos)
//!     .quantization(ScalarKind::F16)
//!     .capacity(1024)
//!     .build()?;
//!
//! // Host configuration bag
//! let bag = IndexOptions::from_config(&json!({
//!     "dimensions": 256,
//!     "metric": "cos",
//!     "quantization": "f16",
//!     "capacity": 1024,
//! }))?;
//!
//! assert_eq!(typed, bag);
//! # Ok(())
//! # }
//! ```
//!
//! A JSON file holding the same bag is read with [`IndexOptions::from_json_file`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::engine::{
    DEFAULT_CONNECTIVITY, DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH, MetricKind, ScalarKind,
};
use crate::error::{AnnBridgeError, Result};
use crate::marshal;

pub(crate) const CONFIG_USAGE: &str =
    "Pass args as named objects: dimensions: uint, capacity: uint, metric: str";

const UNSIGNED_USAGE: &str = "Arguments must be unsigned integers";

/// Configuration of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Number of components in every vector.
    pub dimensions: usize,
    /// Entries to reserve up front. Zero grows on first insert.
    pub capacity: usize,
    /// Graph degree.
    pub connectivity: usize,
    /// Search breadth during insertion.
    pub expansion_add: usize,
    /// Search breadth during queries.
    pub expansion_search: usize,
    /// Distance metric.
    pub metric: MetricKind,
    /// Component storage kind.
    pub quantization: ScalarKind,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            dimensions: 0,
            capacity: 0,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            metric: MetricKind::Ip,
            quantization: ScalarKind::F32,
        }
    }
}

impl IndexOptions {
    /// Create a new builder for IndexOptions.
    pub fn builder(dimensions: usize) -> IndexOptionsBuilder {
        IndexOptionsBuilder::new(dimensions)
    }

    /// Parse a host configuration bag.
    ///
    /// Numeric options must be lossless unsigned integers; `metric` and
    /// `quantization` must be recognized names. `null` leaves the default in
    /// place and unrecognized keys are ignored.
    pub fn from_config(config: &Value) -> Result<Self> {
        let params = config
            .as_object()
            .ok_or_else(|| AnnBridgeError::invalid_argument(CONFIG_USAGE))?;

        let mut options = IndexOptions::default();
        for (name, value) in params {
            if value.is_null() {
                continue;
            }
            match name.as_str() {
                "dimensions" => options.dimensions = marshal::to_usize(value, UNSIGNED_USAGE)?,
                "capacity" => options.capacity = marshal::to_usize(value, UNSIGNED_USAGE)?,
                "connectivity" => options.connectivity = marshal::to_usize(value, UNSIGNED_USAGE)?,
                "expansion_add" => {
                    options.expansion_add = marshal::to_usize(value, UNSIGNED_USAGE)?
                }
                "expansion_search" => {
                    options.expansion_search = marshal::to_usize(value, UNSIGNED_USAGE)?
                }
                "metric" => {
                    let name = marshal::to_str(value, "Metric must be passed as a string")?;
                    options.metric = MetricKind::parse_str(name)?;
                }
                "quantization" => {
                    let name = marshal::to_str(value, "Quantization must be passed as a string")?;
                    options.quantization = ScalarKind::parse_str(name)?;
                }
                other => warn!(option = other, "ignoring unrecognized index option"),
            }
        }

        Ok(options)
    }

    /// Parse a configuration bag from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Value = serde_json::from_str(json)?;
        Self::from_config(&config)
    }

    /// Read a configuration bag from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.metric == MetricKind::Unknown {
            return Err(AnnBridgeError::invalid_argument("Unknown distance metric"));
        }
        if self.quantization == ScalarKind::Unknown {
            return Err(AnnBridgeError::invalid_argument("Unknown quantization"));
        }
        Ok(())
    }
}

/// Builder for [`IndexOptions`].
#[derive(Debug, Clone)]
pub struct IndexOptionsBuilder {
    options: IndexOptions,
}

impl IndexOptionsBuilder {
    /// Start from the defaults for the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            options: IndexOptions {
                dimensions,
                ..IndexOptions::default()
            },
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.options.capacity = capacity;
        self
    }

    pub fn connectivity(mut self, connectivity: usize) -> Self {
        self.options.connectivity = connectivity;
        self
    }

    pub fn expansion_add(mut self, expansion_add: usize) -> Self {
        self.options.expansion_add = expansion_add;
        self
    }

    pub fn expansion_search(mut self, expansion_search: usize) -> Self {
        self.options.expansion_search = expansion_search;
        self
    }

    pub fn metric(mut self, metric: MetricKind) -> Self {
        self.options.metric = metric;
        self
    }

    pub fn quantization(mut self, quantization: ScalarKind) -> Self {
        self.options.quantization = quantization;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<IndexOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = IndexOptions::from_config(&json!({ "dimensions": 4 })).unwrap();
        assert_eq!(options.dimensions, 4);
        assert_eq!(options.capacity, 0);
        assert_eq!(options.connectivity, DEFAULT_CONNECTIVITY);
        assert_eq!(options.expansion_add, DEFAULT_EXPANSION_ADD);
        assert_eq!(options.expansion_search, DEFAULT_EXPANSION_SEARCH);
        assert_eq!(options.metric, MetricKind::Ip);
        assert_eq!(options.quantization, ScalarKind::F32);
    }

    #[test]
    fn test_full_bag() {
        let options = IndexOptions::from_config(&json!({
            "dimensions": 3,
            "capacity": 100,
            "connectivity": 8,
            "expansion_add": 40,
            "expansion_search": 20,
            "metric": "l2sq",
            "quantization": "i8",
        }))
        .unwrap();

        let expected = IndexOptions::builder(3)
            .capacity(100)
            .connectivity(8)
            .expansion_add(40)
            .expansion_search(20)
            .metric(MetricKind::L2sq)
            .quantization(ScalarKind::I8)
            .build()
            .unwrap();
        assert_eq!(options, expected);
    }

    #[test]
    fn test_rejects_non_object() {
        let err = IndexOptions::from_config(&json!([4])).unwrap_err();
        assert_eq!(err.to_string(), CONFIG_USAGE);
        assert!(IndexOptions::from_config(&json!(4)).is_err());
    }

    #[test]
    fn test_rejects_lossy_numbers() {
        for bad in [json!(1.5), json!(-3), json!("4"), json!(true)] {
            let err = IndexOptions::from_config(&json!({ "dimensions": bad })).unwrap_err();
            assert_eq!(err.to_string(), UNSIGNED_USAGE);
        }
        assert!(IndexOptions::from_config(&json!({ "dimensions": 2, "capacity": 0.5 })).is_err());
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert!(IndexOptions::from_config(&json!({ "dimensions": 2, "metric": "l7" })).is_err());
        assert!(
            IndexOptions::from_config(&json!({ "dimensions": 2, "quantization": "u3" })).is_err()
        );
        assert!(IndexOptions::from_config(&json!({ "dimensions": 2, "metric": 1 })).is_err());
    }

    #[test]
    fn test_builder_rejects_unknown_kinds() {
        assert!(
            IndexOptions::builder(2)
                .metric(MetricKind::Unknown)
                .build()
                .is_err()
        );
        assert!(
            IndexOptions::builder(2)
                .quantization(ScalarKind::Unknown)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"dimensions": 8, "metric": "cos", "comment": "x"}"#).unwrap();

        let options = IndexOptions::from_json_file(&path).unwrap();
        assert_eq!(options.dimensions, 8);
        assert_eq!(options.metric, MetricKind::Cos);

        assert!(IndexOptions::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
