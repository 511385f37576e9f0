//! Unbounded list of records.
use super::BufferKind;
use crate::{
    batch::{Batch, Index, Resolved},
    error::{BufferError, Result},
    persist::{self, Attr, Group, Node},
};
use log::info;
use std::path::Path;

/// An append-only list of records.
///
/// Records are kept as given, without a fixed layout, so that records of
/// different shapes can share the buffer. There is no index arithmetic and
/// no sampling; [`ListReplayBuffer::sample`] and [`ListReplayBuffer::update`]
/// always fail.
#[derive(Clone, Debug, Default)]
pub struct ListReplayBuffer {
    rows: Vec<Batch>,
}

impl ListReplayBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no record was added.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a record and returns its index.
    pub fn add(&mut self, row: impl Into<Batch>) -> usize {
        self.rows.push(row.into());
        self.rows.len() - 1
    }

    /// The record at an integer index, or the records at several indices
    /// stacked along a new leading axis.
    pub fn get_item(&self, index: impl Into<Index>) -> Result<Batch> {
        match index.into().resolve(self.rows.len())? {
            Resolved::One(i) => Ok(self.rows[i].clone()),
            Resolved::Many(ix) => {
                let rows: Vec<Batch> = ix.iter().map(|&i| self.rows[i].clone()).collect();
                Batch::stack(&rows)
            }
        }
    }

    /// Always fails: records are not sampled from a list.
    pub fn sample(&mut self, _batch_size: isize) -> Result<(Batch, Vec<usize>)> {
        Err(BufferError::NotSupported(
            "ListReplayBuffer cannot be sampled".to_string(),
        ))
    }

    /// Always fails: a list cannot be filled from another buffer.
    pub fn update(&mut self, _other: &ListReplayBuffer) -> Result<Vec<usize>> {
        Err(BufferError::NotSupported(
            "ListReplayBuffer cannot be updated from another buffer".to_string(),
        ))
    }

    /// Removes every record.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    /// Saves the records, one group per record.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut root = Group::new();
        root.set_attr(
            persist::CLASS_ATTR,
            Attr::Str(BufferKind::ListReplayBuffer.name().to_string()),
        );
        root.set_attr("len", Attr::Int(self.rows.len() as i64));
        for (i, row) in self.rows.iter().enumerate() {
            root.nodes
                .insert(i.to_string(), Node::Group(persist::batch_to_group(row)?));
        }
        persist::write_group(path.as_ref(), &root)?;
        info!("Save ListReplayBuffer with {} records to {:?}", self.len(), path.as_ref());
        Ok(())
    }

    /// Loads a buffer saved by [`ListReplayBuffer::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let root = persist::read_group(path.as_ref())?;
        let buf = Self::from_group(&root)?;
        info!("Load ListReplayBuffer from {:?}", path.as_ref());
        Ok(buf)
    }

    pub(crate) fn from_group(root: &Group) -> Result<Self> {
        root.check_class(&[BufferKind::ListReplayBuffer.name()])?;
        let n = root.attr_int("len")? as usize;
        let rows = (0..n)
            .map(|i| match root.nodes.get(&i.to_string()) {
                Some(Node::Group(g)) => persist::group_to_batch(g),
                _ => Err(BufferError::Serialization(format!("record {} is missing", i))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }
}
