//! The record container.
use super::{Index, Value};
use crate::error::{index_err, type_err, value_err, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{
        btree_map::{IntoIter, Iter, Keys, ValuesMut},
        BTreeMap, BTreeSet,
    },
    iter::FromIterator,
};

/// A schema-free, nested, columnar record.
///
/// Maps string keys to [`Value`]s that share a leading batch axis. Nested
/// records are stored as [`Value::Batch`], so `info` and `policy` sub-records
/// with arbitrary keys are just more columns.
///
/// # Examples
///
/// ```rust
/// use border_buffer::{batch, Batch};
///
/// let b = batch! {
///     "obs" => vec![0.0, 1.0, 2.0],
///     "info" => batch! { "id" => vec![7, 8, 9] },
/// };
/// assert_eq!(b.len().unwrap(), 3);
///
/// let row = b.get_item(-1).unwrap();
/// assert_eq!(row.info().unwrap().get("id").unwrap().item().unwrap(), 9.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch(BTreeMap<String, Value>);

impl Batch {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Mutable value stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Keys<'_, String, Value> {
        self.0.keys()
    }

    /// Key-value pairs in key order.
    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.0.iter()
    }

    pub(crate) fn values_mut(&mut self) -> ValuesMut<'_, String, Value> {
        self.0.values_mut()
    }

    /// Returns `true` if the record holds no data, looking through nested
    /// records.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty_batch())
    }

    /// Number of rows.
    ///
    /// This is the minimum length over all length-bearing fields; scalars and
    /// empty nested records are ignored. An empty record has length 0, and a
    /// record with data but no length-bearing field is an error.
    pub fn len(&self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        match self.0.values().filter_map(|v| v.len()).min() {
            Some(n) => Ok(n),
            None => type_err("record has no field with a length"),
        }
    }

    /// Selects rows along the batch axis.
    ///
    /// The index is checked against every length-bearing field. Empty nested
    /// records and zero-sized fields pass through unchanged; scalar fields
    /// are dropped from the result.
    pub fn get_item(&self, index: impl Into<Index>) -> Result<Batch> {
        let index = index.into();
        if self.0.is_empty() {
            return index_err("cannot index an empty record");
        }
        let mut out = BTreeMap::new();
        for (k, v) in &self.0 {
            if v.is_empty_batch() {
                out.insert(k.clone(), Value::Batch(Batch::new()));
                continue;
            }
            match v.len() {
                None => {}
                Some(0) => {
                    out.insert(k.clone(), v.clone());
                }
                Some(n) => {
                    let ix = index.resolve(n)?;
                    out.insert(k.clone(), v.take(&ix)?);
                }
            }
        }
        Ok(Batch(out))
    }

    /// Allocates a record with `n` zero rows and this record's layout, taking
    /// this record as a single row.
    pub fn alloc_rows(&self, n: usize) -> Result<Batch> {
        self.0
            .iter()
            .map(|(k, v)| Ok((k.clone(), Value::alloc_rows(v, n)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Batch)
    }

    /// Allocates columns of `n` zero rows for every key of `row` not present
    /// yet, recursing into nested records.
    ///
    /// Rows written before a key first appears therefore read as zero (or
    /// `None`, or an empty record) for that key.
    pub fn alloc_missing(&mut self, row: &Batch, n: usize) -> Result<()> {
        for (k, v) in &row.0 {
            match self.0.get_mut(k) {
                None => {
                    self.0.insert(k.clone(), Value::alloc_rows(v, n)?);
                }
                Some(col) => {
                    if col.is_empty_batch() && !matches!(v, Value::Batch(_)) {
                        *col = Value::alloc_rows(v, n)?;
                    } else if let (Value::Batch(b), Value::Batch(rb)) = (col, v) {
                        b.alloc_missing(rb, n)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes `row` into row `i`.
    ///
    /// Columns the row does not provide are reset to zero in that row. Every
    /// non-empty field of `row` must already have a column, see
    /// [`Batch::alloc_missing`].
    pub fn set_row(&mut self, i: usize, row: &Batch) -> Result<()> {
        if let Some((k, _)) = row
            .0
            .iter()
            .find(|(k, v)| !v.is_empty_batch() && !self.0.contains_key(*k))
        {
            return value_err(format!("no column allocated for key '{}'", k));
        }
        for (k, col) in self.0.iter_mut() {
            if col.is_empty_batch() {
                continue;
            }
            match row.0.get(k) {
                Some(v) if !v.is_empty_batch() => col.set_row(i, v)?,
                _ => col.zero_row(i)?,
            }
        }
        Ok(())
    }

    /// Writes the rows of `rows` into positions `ix`, in order.
    pub fn set_rows(&mut self, ix: &[usize], rows: &Batch) -> Result<()> {
        for (j, &i) in ix.iter().enumerate() {
            self.set_row(i, &rows.get_item(j)?)?;
        }
        Ok(())
    }

    /// Resets row `i` of every column to zero.
    pub fn zero_row(&mut self, i: usize) -> Result<()> {
        for col in self.0.values_mut() {
            if !col.is_empty_batch() {
                col.zero_row(i)?;
            }
        }
        Ok(())
    }

    /// Concatenates `other` onto this record along the batch axis, in place.
    ///
    /// Keys only present in `other` are copied over.
    pub fn cat_(&mut self, other: &Batch) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        let mut merged = Vec::with_capacity(other.0.len());
        for (k, v) in &other.0 {
            let value = match self.0.get(k) {
                None => v.clone(),
                Some(mine) => mine.concat(v)?,
            };
            merged.push((k.clone(), value));
        }
        self.0.extend(merged);
        Ok(())
    }

    /// Concatenates records along the batch axis.
    pub fn cat(batches: &[Batch]) -> Result<Batch> {
        let mut out = Batch::new();
        for b in batches {
            out.cat_(b)?;
        }
        Ok(out)
    }

    /// Stacks records along a new leading axis.
    ///
    /// A key missing from some records is filled with zero rows for them.
    pub fn stack(batches: &[Batch]) -> Result<Batch> {
        let refs: Vec<&Batch> = batches.iter().collect();
        Self::stack_axis(&refs, 0)
    }

    /// Stacks records along a new axis `axis`.
    pub fn stack_axis(batches: &[&Batch], axis: usize) -> Result<Batch> {
        let n = batches.len();
        let keys: BTreeSet<&String> = batches.iter().flat_map(|b| b.0.keys()).collect();
        let mut out = BTreeMap::new();
        for k in keys {
            let present: Vec<(usize, &Value)> = batches
                .iter()
                .enumerate()
                .filter_map(|(j, b)| b.0.get(k).map(|v| (j, v)))
                .collect();
            let value = if present.len() == n {
                let values: Vec<&Value> = present.iter().map(|(_, v)| *v).collect();
                Value::stack(&values, axis)?
            } else if axis != 0 {
                return value_err(format!(
                    "key '{}' is missing from some records stacked along axis {}",
                    k, axis
                ));
            } else if let Value::Batch(_) = present[0].1 {
                let empty = Batch::new();
                let subs = batches
                    .iter()
                    .map(|b| match b.0.get(k) {
                        Some(Value::Batch(s)) => Ok(s),
                        Some(v) => type_err(format!("cannot stack a record with {}", v.kind())),
                        None => Ok(&empty),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Batch(Self::stack_axis(&subs, 0)?)
            } else {
                let mut col = Value::alloc_rows(present[0].1, n)?;
                for (j, v) in present {
                    col.set_row(j, v)?;
                }
                col
            };
            out.insert(k.clone(), value);
        }
        Ok(Batch(out))
    }

    /// Observations.
    pub fn obs(&self) -> Option<&Value> {
        self.get("obs")
    }

    /// Actions.
    pub fn act(&self) -> Option<&Value> {
        self.get("act")
    }

    /// Rewards.
    pub fn rew(&self) -> Option<&Value> {
        self.get("rew")
    }

    /// Episode-end flags.
    pub fn done(&self) -> Option<&Value> {
        self.get("done")
    }

    /// Next observations.
    pub fn obs_next(&self) -> Option<&Value> {
        self.get("obs_next")
    }

    /// The `info` sub-record.
    pub fn info(&self) -> Option<&Batch> {
        self.get("info").and_then(Value::as_batch)
    }

    /// The `policy` sub-record.
    pub fn policy(&self) -> Option<&Batch> {
        self.get("policy").and_then(Value::as_batch)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Batch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Batch(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Batch {
    type Item = (String, Value);
    type IntoIter = IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, Value>> for Batch {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Batch(m)
    }
}

/// Builds a [`Batch`] from `key => value` pairs.
///
/// Values go through [`Value`]'s `From` conversions.
#[macro_export]
macro_rules! batch {
    () => {
        $crate::Batch::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut b = $crate::Batch::new();
        $( b.insert($key, $value); )+
        b
    }};
}
