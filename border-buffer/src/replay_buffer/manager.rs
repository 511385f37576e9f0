//! Buffers composed of several children.
use super::{
    config::ReplayBufferConfig, cursor::Cursor, store::Store, AddOutcome, BufferKind,
    ReplayBuffer, ReplayBufferBase,
};
use crate::{
    batch::{Batch, Index, Value},
    error::{BufferError, Result},
    persist::{self, Group},
};
use log::info;
use std::path::Path;

/// Child buffers sharing one global index space.
///
/// Child `i` owns the slots `[offset_i, offset_i + maxsize_i)`. All children
/// write into the manager's storage; [`BufferView`]s give read access to a
/// single child. Sampling is uniform over the valid transitions of all
/// children, or proportional to priorities over all of them when the
/// configuration carries a [`PerConfig`](super::PerConfig).
pub struct ReplayBufferManager {
    pub(crate) store: Store,
}

impl ReplayBufferManager {
    /// Composes empty buffers with identical options.
    pub fn new(children: Vec<ReplayBuffer>) -> Result<Self> {
        let first = match children.first() {
            Some(b) => b,
            None => {
                return Err(BufferError::Precondition(
                    "a manager needs at least one buffer".to_string(),
                ))
            }
        };
        let config = first.config().clone();
        for b in children.iter() {
            if !b.is_empty() {
                return Err(BufferError::Precondition(
                    "buffers must be empty to be managed".to_string(),
                ));
            }
            if !b.config().same_options(&config) {
                return Err(BufferError::Precondition(
                    "managed buffers must share their options".to_string(),
                ));
            }
        }
        let sizes: Vec<usize> = children.iter().map(|b| b.maxsize()).collect();
        Ok(Self {
            store: Store::new(config, &sizes)?,
        })
    }

    /// `buffer_num` children of `ceil(total_size / buffer_num)` slots each.
    ///
    /// `config.capacity` is ignored; the other fields apply to every child.
    pub fn vector(total_size: usize, buffer_num: usize, config: &ReplayBufferConfig) -> Result<Self> {
        if buffer_num == 0 {
            return Err(BufferError::Precondition(
                "buffer_num must be positive".to_string(),
            ));
        }
        let size = (total_size + buffer_num - 1) / buffer_num;
        let config = config.clone().capacity(size);
        Ok(Self {
            store: Store::new(config, &vec![size; buffer_num])?,
        })
    }

    pub(crate) fn with_sizes(config: ReplayBufferConfig, sizes: &[usize]) -> Result<Self> {
        Ok(Self {
            store: Store::new(config, sizes)?,
        })
    }

    /// Read-only views of the children.
    pub fn buffers(&self) -> Vec<BufferView<'_>> {
        (0..self.store.cursors.len())
            .map(|id| BufferView {
                store: &self.store,
                cursor: &self.store.cursors[id],
            })
            .collect()
    }

    /// View of child `id`.
    pub fn buffer(&self, id: usize) -> Option<BufferView<'_>> {
        self.store.cursors.get(id).map(|cursor| BufferView {
            store: &self.store,
            cursor,
        })
    }

    /// Adds transitions with explicit priorities `|weight|`.
    pub fn add_with_weight(
        &mut self,
        batch: &Batch,
        buffer_ids: Option<&[usize]>,
        weight: &[f64],
    ) -> Result<Vec<AddOutcome>> {
        let ids = self.ids(batch, buffer_ids)?;
        self.store.add(batch, &ids, true, Some(weight))
    }

    /// Stored priorities, `|w|^alpha`, of a prioritized manager.
    pub fn weight(&self, index: impl Into<Index>) -> Result<Vec<f64>> {
        self.store.weight(&self.store.wrap(&index.into()))
    }

    /// Replaces the storage of every child. The record must have `maxsize`
    /// rows.
    pub fn set_batch(&mut self, batch: Batch) -> Result<()> {
        self.store.set_batch(batch)
    }

    /// Mutable access to the storage shared by the children.
    pub fn meta_mut(&mut self) -> &mut Batch {
        &mut self.store.meta
    }

    fn ids(&self, batch: &Batch, buffer_ids: Option<&[usize]>) -> Result<Vec<usize>> {
        Ok(match buffer_ids {
            Some(ids) => ids.to_vec(),
            None => (0..batch.len()?).collect(),
        })
    }

    /// Loads a manager saved by [`ReplayBufferBase::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let root = persist::read_group(path.as_ref())?;
        let buf = Self::from_group(&root)?;
        info!("Load {} from {:?}", buf.kind().name(), path.as_ref());
        Ok(buf)
    }

    pub(crate) fn from_group(root: &Group) -> Result<Self> {
        root.check_class(&[
            BufferKind::ReplayBufferManager.name(),
            BufferKind::PrioritizedReplayBufferManager.name(),
        ])?;
        Ok(Self {
            store: Store::from_group(root)?,
        })
    }
}

impl ReplayBufferBase for ReplayBufferManager {
    fn kind(&self) -> BufferKind {
        if self.store.per.is_some() {
            BufferKind::PrioritizedReplayBufferManager
        } else {
            BufferKind::ReplayBufferManager
        }
    }

    fn config(&self) -> &ReplayBufferConfig {
        &self.store.config
    }

    fn maxsize(&self) -> usize {
        self.store.maxsize
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn buffer_num(&self) -> usize {
        self.store.cursors.len()
    }

    fn meta(&self) -> &Batch {
        &self.store.meta
    }

    fn add(&mut self, batch: &Batch, buffer_ids: Option<&[usize]>) -> Result<Vec<AddOutcome>> {
        let ids = self.ids(batch, buffer_ids)?;
        self.store.add(batch, &ids, true, None)
    }

    fn prev(&self, index: impl Into<Index>) -> Vec<usize> {
        self.store.prev(&self.store.wrap(&index.into()))
    }

    fn next(&self, index: impl Into<Index>) -> Vec<usize> {
        self.store.next(&self.store.wrap(&index.into()))
    }

    fn unfinished_index(&self) -> Vec<usize> {
        self.store.unfinished_index()
    }

    fn valid_index(&self) -> Vec<usize> {
        self.store.valid_index()
    }

    fn sample_index(&mut self, batch_size: isize) -> Vec<usize> {
        self.store.sample_index(batch_size)
    }

    fn get(&self, index: &[usize], key: &str, stack_num: Option<usize>) -> Result<Value> {
        self.store.get(index, key, stack_num)
    }

    fn get_item(&self, index: impl Into<Index>) -> Result<Batch> {
        self.store.get_item(&index.into())
    }

    fn reset(&mut self, keep_statistics: bool) -> Result<()> {
        self.store.reset(keep_statistics)
    }

    fn update(&mut self, _other: &dyn ReplayBufferBase) -> Result<Vec<usize>> {
        Err(BufferError::NotSupported(format!(
            "{} cannot be updated from another buffer",
            self.kind().name()
        )))
    }

    fn update_weight(&mut self, index: &[usize], new_weight: &[f64]) -> Result<()> {
        self.store.update_weight(index, new_weight)
    }

    fn set_beta(&mut self, beta: f64) -> Result<()> {
        self.store.set_beta(beta)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let kind = self.kind();
        persist::write_group(path, &self.store.to_group(kind.name())?)?;
        info!("Save {} with {} transitions to {:?}", kind.name(), self.len(), path);
        Ok(())
    }
}

/// Read access to one child of a manager.
///
/// Local indices run over `[0, maxsize)` of the child. Reads go through the
/// manager's storage, so they see every write made through the manager.
pub struct BufferView<'a> {
    store: &'a Store,
    cursor: &'a Cursor,
}

impl<'a> BufferView<'a> {
    /// First global index of the child.
    pub fn offset(&self) -> usize {
        self.cursor.offset()
    }

    /// Capacity of the child.
    pub fn maxsize(&self) -> usize {
        self.cursor.maxsize()
    }

    /// Number of valid transitions.
    pub fn len(&self) -> usize {
        self.cursor.len()
    }

    /// Returns `true` if the child holds no valid transition.
    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    /// Next local write position.
    pub fn index(&self) -> usize {
        self.cursor.index()
    }

    fn global(&self, index: impl Into<Index>) -> Vec<usize> {
        let offset = self.cursor.offset();
        index
            .into()
            .resolve_wrapping(self.cursor.maxsize())
            .to_vec()
            .into_iter()
            .map(|i| i + offset)
            .collect()
    }

    fn local(&self, ix: Vec<usize>) -> Vec<usize> {
        let offset = self.cursor.offset();
        ix.into_iter().map(|g| g - offset).collect()
    }

    /// Rows of `key` owned by the child.
    pub fn column(&self, key: &str) -> Result<Value> {
        let ix: Vec<usize> = (0..self.cursor.maxsize()).map(|i| i + self.offset()).collect();
        self.store.get(&ix, key, Some(1))
    }

    /// Values of `key` at local `index`, with frame stacking.
    pub fn get(&self, index: impl Into<Index>, key: &str) -> Result<Value> {
        self.store.get(&self.global(index), key, None)
    }

    /// Transitions at local `index`.
    pub fn get_item(&self, index: impl Into<Index>) -> Result<Batch> {
        let index = index.into();
        let ix: Vec<isize> = self.global(index.clone()).into_iter().map(|g| g as isize).collect();
        match index {
            Index::Int(_) => self.store.get_item(&Index::Int(ix[0])),
            _ => self.store.get_item(&Index::List(ix)),
        }
    }

    /// Local index of the previous transition of the same episode.
    pub fn prev(&self, index: impl Into<Index>) -> Vec<usize> {
        self.local(self.store.prev(&self.global(index)))
    }

    /// Local index of the next transition of the same episode.
    pub fn next(&self, index: impl Into<Index>) -> Vec<usize> {
        self.local(self.store.next(&self.global(index)))
    }

    /// Valid local indices, oldest first.
    pub fn valid_index(&self) -> Vec<usize> {
        self.local(self.cursor.chronological())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch;

    #[test]
    fn vector_rounds_child_size_up() -> Result<()> {
        let buf = ReplayBufferManager::vector(10, 3, &ReplayBufferConfig::default())?;
        assert_eq!(buf.maxsize(), 12);
        assert_eq!(buf.buffers().iter().map(|b| b.offset()).collect::<Vec<_>>(), vec![0, 4, 8]);
        assert!(ReplayBufferManager::vector(10, 0, &ReplayBufferConfig::default()).is_err());
        Ok(())
    }

    #[test]
    fn children_must_be_empty_and_alike() -> Result<()> {
        let config = ReplayBufferConfig::default().capacity(3);
        let mut used = ReplayBuffer::build(&config)?;
        used.add_transition(crate::Transition::new(0, 0, 0.0))?;
        assert!(ReplayBufferManager::new(vec![ReplayBuffer::build(&config)?, used]).is_err());
        let stacked = ReplayBuffer::build(&config.clone().stack_num(2))?;
        assert!(ReplayBufferManager::new(vec![ReplayBuffer::build(&config)?, stacked]).is_err());
        assert!(ReplayBufferManager::new(vec![]).is_err());
        Ok(())
    }

    #[test]
    fn views_read_through_the_manager() -> Result<()> {
        let mut buf = ReplayBufferManager::vector(6, 2, &ReplayBufferConfig::default())?;
        let rows = batch! {
            "obs" => vec![1, 2], "act" => vec![0, 0], "rew" => vec![0.0, 0.0],
            "done" => vec![false, true],
        };
        let out = buf.add(&rows, None)?;
        assert_eq!(out.iter().map(|o| o.ptr).collect::<Vec<_>>(), vec![0, 3]);
        assert!(buf.update(&ReplayBuffer::build(&ReplayBufferConfig::default())?).is_err());

        let mut meta = buf.meta().clone();
        meta.insert("info", batch! { "n" => vec![0, 0, 0, 0, 7, 0] });
        buf.set_batch(meta)?;

        let views = buf.buffers();
        assert_eq!(views[1].column("info")?.as_batch().unwrap().get("n").unwrap(), &Value::from(vec![0, 7, 0]));
        assert_eq!(views[1].get_item(0)?.obs().unwrap(), &Value::from(2));
        assert_eq!(views[1].valid_index(), vec![0]);
        assert_eq!(views[0].next(0), vec![0]);
        Ok(())
    }
}
