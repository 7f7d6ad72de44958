//! Host-facing surface.
//!
//! A script runtime calls into the index with positional, loosely typed
//! arguments. [`HostIndex`] checks arity and types, converts keys and
//! vectors losslessly, and forwards to the typed [`Index`]. Results come back
//! as [`serde_json::Value`].
//!
//! ```
//! use annbridge::host::HostIndex;
//! use serde_json::json;
//!
//! # fn example() -> annbridge::error::Result<()> {
//! let mut index: HostIndex = HostIndex::construct(&[json!({ "dimensions": 2, "metric": "l2sq" })])?;
//! index.call("add", &[json!([1, 2]), json!([[0.0, 0.0], [3.0, 4.0]])])?;
//!
//! let found = index.call("search", &[json!([3.0, 4.0]), json!(1)])?;
//! assert_eq!(found["keys"], json!([2]));
//! assert_eq!(found["count"], json!(1));
//! # Ok(())
//! # }
//! ```

use serde_json::{Value, json};
use tracing::warn;

use crate::engine::{Engine, FlatEngine, Key};
use crate::error::{AnnBridgeError, Result};
use crate::index::Index;
use crate::marshal;
use crate::options::{CONFIG_USAGE, IndexOptions};

const INVALID_TYPES: &str = "Invalid argument type, expects integral key(s) and float vector(s)";
const KEY_USAGE: &str = "Keys must be unsigned integers";
const IDENTIFIER_MISSING: &str = "Expects an entry identifier";
const IDENTIFIER_USAGE: &str = "Identifier must be an unsigned integer";

/// Index wrapper taking host-runtime arguments.
#[derive(Debug)]
pub struct HostIndex<E: Engine = FlatEngine> {
    index: Index<E>,
}

impl<E: Engine> HostIndex<E> {
    /// Construct from exactly one configuration object.
    pub fn construct(args: &[Value]) -> Result<Self> {
        let [config] = args else {
            return Err(AnnBridgeError::invalid_argument(CONFIG_USAGE));
        };
        let options = IndexOptions::from_config(config)?;
        Ok(Self {
            index: Index::new(options)?,
        })
    }

    /// Borrow the typed index.
    pub fn index(&self) -> &Index<E> {
        &self.index
    }

    /// Number of components in every vector.
    pub fn dimensions(&self) -> u64 {
        self.index.dimensions() as u64
    }

    /// Number of live entries.
    pub fn size(&self) -> u64 {
        self.index.size() as u64
    }

    /// Entries that fit before the next reservation.
    pub fn capacity(&self) -> u64 {
        self.index.capacity() as u64
    }

    /// Graph degree reported by the engine.
    pub fn connectivity(&self) -> u64 {
        self.index.connectivity() as u64
    }

    /// Insert `(key, vector)` or `([keys], [vectors])`.
    ///
    /// In the batch form every entry is handled on its own: entries that fail
    /// are logged and skipped, the rest are inserted, and the first failure
    /// in batch order is returned once the whole batch has been processed.
    pub fn add(&mut self, args: &[Value]) -> Result<()> {
        let [keys, vectors, ..] = args else {
            return Err(AnnBridgeError::invalid_argument(
                "Expects at least two arguments",
            ));
        };

        match (keys, vectors) {
            (Value::Number(_), Value::Array(_)) => {
                let key = marshal::to_key(keys, KEY_USAGE)?;
                let vector = marshal::to_vector(vectors)?;
                self.index.add(key, &vector)
            }
            (Value::Array(keys), Value::Array(vectors)) => self.add_batch(keys, vectors),
            _ => Err(AnnBridgeError::invalid_argument(INVALID_TYPES)),
        }
    }

    fn add_batch(&mut self, keys: &[Value], vectors: &[Value]) -> Result<()> {
        if keys.len() != vectors.len() {
            return Err(AnnBridgeError::invalid_argument(
                "The number of keys must match the number of vectors",
            ));
        }
        if keys.is_empty() {
            return Ok(());
        }
        self.index.ensure_capacity(keys.len())?;

        let mut first_failure: Option<(usize, AnnBridgeError)> = None;
        let mut positions = Vec::with_capacity(keys.len());
        let mut valid_keys: Vec<Key> = Vec::with_capacity(keys.len());
        let mut valid_vectors: Vec<Vec<f32>> = Vec::with_capacity(keys.len());

        for (position, (key, vector)) in keys.iter().zip(vectors).enumerate() {
            let converted = marshal::to_key(key, KEY_USAGE)
                .and_then(|key| Ok((key, marshal::to_vector(vector)?)));
            match converted {
                Ok((key, vector)) => {
                    positions.push(position);
                    valid_keys.push(key);
                    valid_vectors.push(vector);
                }
                Err(error) => {
                    warn!(position, %error, "skipping malformed batch entry");
                    first_failure.get_or_insert((position, error));
                }
            }
        }

        let outcome = self.index.insert_each(&valid_keys, &valid_vectors);
        if let Some(failure) = outcome.failures.into_iter().next() {
            let position = positions[failure.position];
            if first_failure
                .as_ref()
                .is_none_or(|(earliest, _)| position < *earliest)
            {
                first_failure = Some((position, failure.error));
            }
        }

        match first_failure {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }

    /// Search with `(vector, k)`, returning `{keys, distances, count}`.
    pub fn search(&self, args: &[Value]) -> Result<Value> {
        let [query, wanted, ..] = args else {
            return Err(AnnBridgeError::invalid_argument(
                "Expects a query vector and the number of results",
            ));
        };

        let query = marshal::to_vector(query)?;
        let wanted = marshal::to_usize(wanted, "Number of results must be an unsigned integer")?;
        let matches = self.index.search(&query, wanted)?;
        Ok(serde_json::to_value(&matches)?)
    }

    pub fn remove(&mut self, args: &[Value]) -> Result<bool> {
        let key = single_identifier(args)?;
        self.index.remove(key)
    }

    pub fn rename(&mut self, args: &[Value]) -> Result<bool> {
        let [from, to] = args else {
            return Err(AnnBridgeError::invalid_argument(
                "Expects two entry identifiers",
            ));
        };
        let from = marshal::to_key(from, IDENTIFIER_USAGE)?;
        let to = marshal::to_key(to, IDENTIFIER_USAGE)?;
        self.index.rename(from, to)
    }

    pub fn contains(&self, args: &[Value]) -> Result<bool> {
        let key = single_identifier(args)?;
        self.index.contains(key)
    }

    pub fn count(&self, args: &[Value]) -> Result<u64> {
        let key = single_identifier(args)?;
        Ok(self.index.count(key)? as u64)
    }

    /// The stored vector as an array of numbers, or `null` when absent.
    pub fn get(&self, args: &[Value]) -> Result<Value> {
        let key = single_identifier(args)?;
        Ok(match self.index.get(key)? {
            Some(vector) => json!(vector),
            None => Value::Null,
        })
    }

    /// An independent in-memory copy of this index.
    pub fn copy(&self) -> Result<Self> {
        Ok(Self {
            index: self.index.copy()?,
        })
    }

    pub fn save(&self, args: &[Value]) -> Result<()> {
        self.index.save(marshal::to_path(args)?)
    }

    pub fn load(&mut self, args: &[Value]) -> Result<()> {
        self.index.load(marshal::to_path(args)?)
    }

    pub fn view(&mut self, args: &[Value]) -> Result<()> {
        self.index.view(marshal::to_path(args)?)
    }

    /// Dispatch a call by method name.
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<Value> {
        match method {
            "dimensions" => Ok(json!(self.dimensions())),
            "size" => Ok(json!(self.size())),
            "capacity" => Ok(json!(self.capacity())),
            "connectivity" => Ok(json!(self.connectivity())),
            "add" => self.add(args).map(|()| Value::Null),
            "search" => self.search(args),
            "remove" => self.remove(args).map(Value::Bool),
            "rename" => self.rename(args).map(Value::Bool),
            "contains" => self.contains(args).map(Value::Bool),
            "count" => self.count(args).map(|count| json!(count)),
            "get" => self.get(args),
            "save" => self.save(args).map(|()| Value::Null),
            "load" => self.load(args).map(|()| Value::Null),
            "view" => self.view(args).map(|()| Value::Null),
            other => Err(AnnBridgeError::invalid_argument(format!(
                "Unknown method: {other}"
            ))),
        }
    }
}

fn single_identifier(args: &[Value]) -> Result<Key> {
    let [key] = args else {
        return Err(AnnBridgeError::invalid_argument(IDENTIFIER_MISSING));
    };
    marshal::to_key(key, IDENTIFIER_USAGE)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCategory;

    fn host(config: Value) -> HostIndex {
        HostIndex::construct(&[config]).unwrap()
    }

    #[test]
    fn test_construct_arity() {
        let err = HostIndex::<FlatEngine>::construct(&[]).unwrap_err();
        assert_eq!(err.to_string(), CONFIG_USAGE);

        let config = json!({ "dimensions": 2 });
        assert!(HostIndex::<FlatEngine>::construct(&[config.clone(), config]).is_err());
        assert!(HostIndex::<FlatEngine>::construct(&[json!("dimensions=2")]).is_err());
    }

    #[test]
    fn test_construct_reserves_capacity() {
        let index = host(json!({ "dimensions": 3, "capacity": 10, "connectivity": 4 }));
        assert_eq!(index.dimensions(), 3);
        assert_eq!(index.capacity(), 10);
        assert_eq!(index.connectivity(), 4);
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_add_argument_errors() {
        let mut index = host(json!({ "dimensions": 2 }));

        let err = index.add(&[json!(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Expects at least two arguments");

        let err = index.add(&[json!("1"), json!([1.0, 2.0])]).unwrap_err();
        assert_eq!(err.to_string(), INVALID_TYPES);

        let err = index.add(&[json!(1.5), json!([1.0, 2.0])]).unwrap_err();
        assert_eq!(err.to_string(), KEY_USAGE);

        let err = index.add(&[json!(-1), json!([1.0, 2.0])]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument);

        let err = index.add(&[json!(1), json!([1.0])]).unwrap_err();
        assert!(matches!(
            err,
            AnnBridgeError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_integral_float_key_accepted() {
        let mut index = host(json!({ "dimensions": 2 }));
        index.add(&[json!(7.0), json!([1.0, 0.0])]).unwrap();
        assert!(index.contains(&[json!(7)]).unwrap());
    }

    #[test]
    fn test_batch_continues_past_bad_entries() {
        let mut index = host(json!({ "dimensions": 2, "metric": "l2sq" }));

        let err = index
            .add(&[
                json!([1, 2.5, 3, 4]),
                json!([[0.0, 0.0], [1.0, 1.0], [2.0], [3.0, 3.0]]),
            ])
            .unwrap_err();
        assert_eq!(err.to_string(), KEY_USAGE);

        assert_eq!(index.size(), 2);
        assert!(index.contains(&[json!(1)]).unwrap());
        assert!(index.contains(&[json!(4)]).unwrap());
        assert!(!index.contains(&[json!(3)]).unwrap());
    }

    #[test]
    fn test_batch_reports_engine_failure_in_order() {
        let mut index = host(json!({ "dimensions": 1 }));
        index.add(&[json!(5), json!([1.0])]).unwrap();

        let err = index
            .add(&[json!([6, 5, 7]), json!([[1.0], [2.0], [3.0]])])
            .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate keys are not allowed");
        assert_eq!(index.size(), 3);
    }

    #[test]
    fn test_batch_reserves_for_every_entry() {
        let mut index = host(json!({ "dimensions": 1 }));
        assert!(index.add(&[json!([1, 1.5]), json!([[1.0], [2.0]])]).is_err());
        assert_eq!(index.size(), 1);
        assert_eq!(index.capacity(), 2);

        let mut index = host(json!({ "dimensions": 1 }));
        let err = index
            .add(&[json!([-1, -2, -3]), json!([[1.0], [2.0], [3.0]])])
            .unwrap_err();
        assert_eq!(err.to_string(), KEY_USAGE);
        assert_eq!(index.size(), 0);
        assert_eq!(index.capacity(), 4);
    }

    #[test]
    fn test_out_of_range_components_rejected() {
        let mut index = host(json!({ "dimensions": 1, "metric": "l2sq" }));
        let err = index.add(&[json!(1), json!([1e300])]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument);
        assert_eq!(index.size(), 0);

        assert!(index.add(&[json!([1, 2]), json!([[1e300], [2.0]])]).is_err());
        assert_eq!(index.size(), 1);
        assert!(index.search(&[json!([-1e39]), json!(1)]).is_err());
    }

    #[test]
    fn test_get_count_and_copy() {
        let mut index = host(json!({ "dimensions": 2 }));
        index.add(&[json!(3), json!([0.5, -2.0])]).unwrap();

        assert_eq!(index.call("get", &[json!(3)]).unwrap(), json!([0.5, -2.0]));
        assert_eq!(index.call("get", &[json!(4)]).unwrap(), Value::Null);
        assert_eq!(index.call("count", &[json!(3)]).unwrap(), json!(1));
        assert!(index.get(&[json!(1.5)]).is_err());

        let mut copy = index.copy().unwrap();
        copy.add(&[json!(4), json!([1.0, 1.0])]).unwrap();
        assert_eq!(copy.size(), 2);
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_batch_length_mismatch() {
        let mut index = host(json!({ "dimensions": 1 }));
        assert!(index.add(&[json!([1, 2]), json!([[1.0]])]).is_err());
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_search_projection() {
        let mut index = host(json!({ "dimensions": 2, "metric": "l2sq" }));
        index
            .add(&[json!([1, 2, 3]), json!([[0.0, 0.0], [1.0, 0.0], [5.0, 0.0]])])
            .unwrap();

        let found = index.search(&[json!([0.0, 0.0]), json!(2)]).unwrap();
        assert_eq!(found["keys"], json!([1, 2]));
        assert_eq!(found["distances"], json!([0.0, 1.0]));
        assert_eq!(found["count"], json!(2));

        let empty = index.search(&[json!([0.0, 0.0]), json!(0)]).unwrap();
        assert_eq!(empty["count"], json!(0));

        assert!(index.search(&[json!([0.0, 0.0]), json!(1.5)]).is_err());
        assert!(index.search(&[json!([0.0, 0.0])]).is_err());
    }

    #[test]
    fn test_identifier_arguments() {
        let mut index = host(json!({ "dimensions": 1 }));
        index.add(&[json!(1), json!([1.0])]).unwrap();

        assert_eq!(
            index.remove(&[]).unwrap_err().to_string(),
            IDENTIFIER_MISSING
        );
        assert_eq!(
            index.contains(&[json!("1")]).unwrap_err().to_string(),
            IDENTIFIER_USAGE
        );
        assert!(index.rename(&[json!(1)]).is_err());

        assert!(index.rename(&[json!(1), json!(2)]).unwrap());
        assert!(!index.remove(&[json!(1)]).unwrap());
        assert!(index.remove(&[json!(2)]).unwrap());
    }

    #[test]
    fn test_path_arguments_checked_first() {
        let mut index = host(json!({ "dimensions": 1 }));
        for args in [vec![], vec![json!(3)], vec![json!("")]] {
            let err = index.save(&args).unwrap_err();
            assert_eq!(err.to_string(), "Function expects a string path argument");
            assert!(index.load(&args).is_err());
            assert!(index.view(&args).is_err());
        }
    }

    #[test]
    fn test_call_dispatch() {
        let mut index = host(json!({ "dimensions": 2 }));
        assert_eq!(
            index.call("add", &[json!(1), json!([1.0, 0.0])]).unwrap(),
            Value::Null
        );
        assert_eq!(index.call("size", &[]).unwrap(), json!(1));
        assert_eq!(index.call("contains", &[json!(1)]).unwrap(), json!(true));

        let err = index.call("compact", &[]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument);
    }
}
