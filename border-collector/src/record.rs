//! Key-value records of metrics.
//!
//! A [`Record`] holds named values produced during collection, such as the
//! number of collected steps or the mean episode return. Records are merged
//! and logged by the caller.
//!
//! ```rust
//! use border_collector::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("n_collected_steps", 100.0);
//! record.insert("returns", RecordValue::Array1(vec![1.0, 2.0]));
//! assert_eq!(record.get_scalar("n_collected_steps").unwrap(), 100.0);
//! ```
use crate::error::CollectorError;
use std::{
    collections::{
        btree_map::{Iter, Keys},
        BTreeMap,
    },
    fmt,
};

/// Possible types of values stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value.
    Scalar(f32),

    /// A 1-dimensional array of floating-point values.
    Array1(Vec<f32>),
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Scalar(v) => write!(f, "{}", v),
            RecordValue::Array1(v) => write!(f, "{:?}", v),
        }
    }
}

/// A container of key-value pairs, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        let mut record = Self::empty();
        record.insert(name, RecordValue::Scalar(value));
        record
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys in the record.
    pub fn keys(&self) -> Keys<'_, String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records, consuming both.
    ///
    /// Values of the second record overwrite those of the first under the
    /// same key.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Gets a scalar value from the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the value is not a
    /// scalar.
    pub fn get_scalar(&self, k: &str) -> Result<f32, CollectorError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(CollectorError::RecordValueType("Scalar".to_string())),
            None => Err(CollectorError::RecordKey(k.to_string())),
        }
    }

    /// Returns `true` if the record contains no key-value pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Formats the record as `key = value` pairs on one line, for logging.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.0.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_getter_checks_key_and_type() {
        let record = Record::from_slice(&[
            ("a", RecordValue::Scalar(1.5)),
            ("b", RecordValue::Array1(vec![1.0, 2.0])),
        ]);
        assert_eq!(record.get_scalar("a").unwrap(), 1.5);
        assert!(matches!(
            record.get_scalar("b"),
            Err(CollectorError::RecordValueType(_))
        ));
        assert!(matches!(
            record.get_scalar("z"),
            Err(CollectorError::RecordKey(_))
        ));
    }

    #[test]
    fn merge_overwrites_and_displays_in_key_order() {
        let record = Record::from_scalar("b", 1.0)
            .merge(Record::from_scalar("a", 2.0))
            .merge(Record::from_scalar("b", 3.0));
        assert_eq!(record.get_scalar("b").unwrap(), 3.0);
        assert_eq!(record.to_string(), "a = 2, b = 3");
    }
}
