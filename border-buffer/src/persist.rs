//! Hierarchical on-disk format of buffers.
//!
//! A saved buffer is a tree of [`Group`]s. Every array field of the record
//! is a [`Node`] under its key path; nested records become nested groups.
//! Scalar metadata is kept in the attributes of the root group, including the
//! name of the buffer type under [`CLASS_ATTR`].
//!
//! Fields that are not plain numeric or boolean arrays (object arrays, lists)
//! are stored as [`Node::Serialized`] blobs. Values that cannot be serialized
//! at all, such as opaque object handles, fail with
//! [`BufferError::Serialization`].
//!
//! The tree is written with `bincode`.
use crate::{
    batch::{Batch, Value},
    error::{BufferError, Result},
};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Attribute naming the buffer type that wrote a file.
pub const CLASS_ATTR: &str = "__class__";

/// Scalar metadata attached to a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Attr {
    /// An integer.
    Int(i64),

    /// A float.
    Float(f64),

    /// A string.
    Str(String),

    /// A list of integers.
    Ints(Vec<i64>),

    /// A list of floats.
    Floats(Vec<f64>),
}

/// An entry of a [`Group`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// A nested group.
    Group(Group),

    /// A float array in row-major order.
    Float {
        /// Shape of the array.
        shape: Vec<usize>,
        /// Elements.
        data: Vec<f64>,
    },

    /// An integer array in row-major order.
    Int {
        /// Shape of the array.
        shape: Vec<usize>,
        /// Elements.
        data: Vec<i64>,
    },

    /// A boolean array in row-major order.
    Bool {
        /// Shape of the array.
        shape: Vec<usize>,
        /// Elements.
        data: Vec<bool>,
    },

    /// A value without a native array form, serialized with `bincode`.
    Serialized(Vec<u8>),
}

/// A group of named nodes with attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Attributes.
    pub attrs: BTreeMap<String, Attr>,

    /// Child nodes.
    pub nodes: BTreeMap<String, Node>,
}

fn ser_err(e: impl std::fmt::Display) -> BufferError {
    BufferError::Serialization(e.to_string())
}

fn missing(key: &str) -> BufferError {
    BufferError::Serialization(format!("attribute '{}' is missing or has a wrong type", key))
}

impl Group {
    /// An empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, attr: Attr) {
        self.attrs.insert(key.into(), attr);
    }

    /// Integer attribute.
    pub fn attr_int(&self, key: &str) -> Result<i64> {
        match self.attrs.get(key) {
            Some(Attr::Int(v)) => Ok(*v),
            _ => Err(missing(key)),
        }
    }

    /// Float attribute.
    pub fn attr_float(&self, key: &str) -> Result<f64> {
        match self.attrs.get(key) {
            Some(Attr::Float(v)) => Ok(*v),
            _ => Err(missing(key)),
        }
    }

    /// String attribute.
    pub fn attr_str(&self, key: &str) -> Result<&str> {
        match self.attrs.get(key) {
            Some(Attr::Str(v)) => Ok(v),
            _ => Err(missing(key)),
        }
    }

    /// Float list attribute.
    pub fn attr_floats(&self, key: &str) -> Result<&[f64]> {
        match self.attrs.get(key) {
            Some(Attr::Floats(v)) => Ok(v),
            _ => Err(missing(key)),
        }
    }

    /// Fails unless the group was written by one of the `expected` types.
    pub fn check_class(&self, expected: &[&str]) -> Result<()> {
        let class = self.attr_str(CLASS_ATTR)?;
        if !expected.contains(&class) {
            return Err(BufferError::Serialization(format!(
                "file holds a {}, expected one of {:?}",
                class, expected
            )));
        }
        Ok(())
    }
}

fn flat<A: Clone>(a: &ArrayD<A>) -> (Vec<usize>, Vec<A>) {
    (a.shape().to_vec(), a.iter().cloned().collect())
}

fn unflat<A>(shape: &[usize], data: Vec<A>) -> Result<ArrayD<A>> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(ser_err)
}

fn value_to_node(v: &Value) -> Result<Node> {
    Ok(match v {
        Value::Float(a) => {
            let (shape, data) = flat(a);
            Node::Float { shape, data }
        }
        Value::Int(a) => {
            let (shape, data) = flat(a);
            Node::Int { shape, data }
        }
        Value::Bool(a) => {
            let (shape, data) = flat(a);
            Node::Bool { shape, data }
        }
        Value::Batch(b) => Node::Group(batch_to_group(b)?),
        Value::Tensor(_) => value_to_node(&Value::Float(v.to_f64()?))?,
        Value::Object(_) | Value::List(_) => Node::Serialized(bincode::serialize(v).map_err(ser_err)?),
    })
}

fn node_to_value(node: &Node) -> Result<Value> {
    Ok(match node {
        Node::Float { shape, data } => Value::Float(unflat(shape, data.clone())?),
        Node::Int { shape, data } => Value::Int(unflat(shape, data.clone())?),
        Node::Bool { shape, data } => Value::Bool(unflat(shape, data.clone())?),
        Node::Group(g) => Value::Batch(group_to_batch(g)?),
        Node::Serialized(bytes) => bincode::deserialize(bytes).map_err(ser_err)?,
    })
}

/// Converts a record into a group, one node per key.
pub fn batch_to_group(batch: &Batch) -> Result<Group> {
    let mut group = Group::new();
    for (k, v) in batch.iter() {
        group.nodes.insert(k.clone(), value_to_node(v)?);
    }
    Ok(group)
}

/// Converts the nodes of a group back into a record. Attributes are ignored.
pub fn group_to_batch(group: &Group) -> Result<Batch> {
    let mut batch = Batch::new();
    for (k, node) in &group.nodes {
        batch.insert(k.clone(), node_to_value(node)?);
    }
    Ok(batch)
}

/// Writes a group to `path`.
pub fn write_group(path: impl AsRef<Path>, group: &Group) -> Result<()> {
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), group).map_err(ser_err)
}

/// Reads a group from `path`.
pub fn read_group(path: impl AsRef<Path>) -> Result<Group> {
    let file = File::open(path)?;
    bincode::deserialize_from(BufReader::new(file)).map_err(ser_err)
}
