//! Main buffer fed by per-environment caches.
use super::{
    config::ReplayBufferConfig, manager::BufferView, store::Store, AddOutcome, BufferKind,
    ReplayBuffer, ReplayBufferBase, ReplayBufferManager,
};
use crate::{
    batch::{Batch, Index, Value},
    error::{BufferError, Result},
    persist::{self, Attr, Group},
};
use log::{debug, info};
use std::path::Path;

/// A main buffer plus one cache per environment.
///
/// Transitions of environment `i` are written to cache `i` until its episode
/// ends. The finished episode is then copied to the main buffer, oldest step
/// first, and the cache is cleared, so the main buffer only ever holds
/// complete episodes. The main buffer is child 0 of the underlying
/// [`ReplayBufferManager`] and cache `i` is child `i + 1`; indices are global
/// over all of them.
///
/// A main buffer of size 0 keeps nothing: finished episodes are dropped
/// from their caches.
pub struct CachedReplayBuffer {
    manager: ReplayBufferManager,
    cached_buffer_num: usize,
}

impl CachedReplayBuffer {
    /// Builds `cached_buffer_num` caches of `max_episode_length` slots with
    /// the options of `main`, which must be empty.
    pub fn new(main: ReplayBuffer, cached_buffer_num: usize, max_episode_length: usize) -> Result<Self> {
        if cached_buffer_num == 0 || max_episode_length == 0 {
            return Err(BufferError::Precondition(
                "a cached buffer needs at least one cache of positive size".to_string(),
            ));
        }
        if !main.is_empty() {
            return Err(BufferError::Precondition(
                "the main buffer must be empty".to_string(),
            ));
        }
        let mut sizes = vec![main.maxsize()];
        sizes.extend(std::iter::repeat(max_episode_length).take(cached_buffer_num));
        let config = main.config().clone();
        Ok(Self {
            manager: ReplayBufferManager::with_sizes(config, &sizes)?,
            cached_buffer_num,
        })
    }

    /// View of the main buffer.
    pub fn main_buffer(&self) -> BufferView<'_> {
        self.manager.buffers().remove(0)
    }

    /// Views of the caches.
    pub fn cached_buffers(&self) -> Vec<BufferView<'_>> {
        self.manager.buffers().into_iter().skip(1).collect()
    }

    /// Stored priorities, `|w|^alpha`, of a prioritized buffer.
    pub fn weight(&self, index: impl Into<Index>) -> Result<Vec<f64>> {
        self.manager.weight(index)
    }

    /// Replaces the storage of the main buffer and the caches.
    pub fn set_batch(&mut self, batch: Batch) -> Result<()> {
        self.manager.set_batch(batch)
    }

    /// Moves the episode that just ended in segment `seg` to the main buffer.
    ///
    /// Returns the first and last main-buffer indices written to, or `None`
    /// when the main buffer cannot hold anything.
    fn flush(&mut self, seg: usize) -> Result<Option<(usize, usize)>> {
        let store = &mut self.manager.store;
        let moved = if store.cursors[0].maxsize() > 0 {
            let ix = store.cursors[seg].chronological();
            let rows = store.meta.get_item(ix.clone())?;
            let local: Vec<usize> = (0..ix.len()).collect();
            let written = store.append_from(0, &rows, &local)?;
            debug!("moved {} transitions from cache {} to the main buffer", written.len(), seg - 1);
            match (written.first(), written.last()) {
                (Some(&first), Some(&last)) => Some((first, last)),
                _ => None,
            }
        } else {
            None
        };
        store.reset_segment(seg, false)?;
        Ok(moved)
    }

    /// Loads a buffer saved by [`ReplayBufferBase::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let root = persist::read_group(path.as_ref())?;
        let buf = Self::from_group(&root)?;
        info!("Load {} from {:?}", buf.kind().name(), path.as_ref());
        Ok(buf)
    }

    pub(crate) fn from_group(root: &Group) -> Result<Self> {
        root.check_class(&[
            BufferKind::CachedReplayBuffer.name(),
            BufferKind::PrioritizedCachedReplayBuffer.name(),
        ])?;
        let cached_buffer_num = root.attr_int("cached_buffer_num")? as usize;
        let manager = ReplayBufferManager {
            store: Store::from_group(root)?,
        };
        if manager.buffer_num() != cached_buffer_num + 1 {
            return Err(BufferError::Serialization(format!(
                "{} segments saved for {} caches",
                manager.buffer_num(),
                cached_buffer_num
            )));
        }
        Ok(Self {
            manager,
            cached_buffer_num,
        })
    }
}

impl ReplayBufferBase for CachedReplayBuffer {
    fn kind(&self) -> BufferKind {
        if self.manager.kind().is_prioritized() {
            BufferKind::PrioritizedCachedReplayBuffer
        } else {
            BufferKind::CachedReplayBuffer
        }
    }

    fn config(&self) -> &ReplayBufferConfig {
        self.manager.config()
    }

    fn maxsize(&self) -> usize {
        self.manager.maxsize()
    }

    fn len(&self) -> usize {
        self.manager.len()
    }

    fn buffer_num(&self) -> usize {
        self.cached_buffer_num
    }

    fn meta(&self) -> &Batch {
        self.manager.meta()
    }

    /// Adds one row per cache; ids name caches, not children of the
    /// underlying manager.
    ///
    /// For a row that ends an episode, `ptr` is the main-buffer index of the
    /// episode's last step and `ep_idx` that of its first step, not the
    /// cache slots the row was written to. `ep_len` and `ep_rew` describe
    /// the finished episode. With a main buffer of size zero the episode is
    /// dropped and both indices stay in the cache.
    fn add(&mut self, batch: &Batch, buffer_ids: Option<&[usize]>) -> Result<Vec<AddOutcome>> {
        let ids: Vec<usize> = match buffer_ids {
            Some(ids) => ids.iter().map(|id| id + 1).collect(),
            None => (1..=self.cached_buffer_num).collect(),
        };
        let mut out = self.manager.add(batch, Some(&ids))?;
        for (o, &seg) in out.iter_mut().zip(ids.iter()) {
            if o.ep_len == 0 {
                continue;
            }
            if let Some((first, last)) = self.flush(seg)? {
                o.ptr = last;
                o.ep_idx = first;
            }
        }
        Ok(out)
    }

    fn prev(&self, index: impl Into<Index>) -> Vec<usize> {
        self.manager.prev(index)
    }

    fn next(&self, index: impl Into<Index>) -> Vec<usize> {
        self.manager.next(index)
    }

    fn unfinished_index(&self) -> Vec<usize> {
        self.manager.unfinished_index()
    }

    fn valid_index(&self) -> Vec<usize> {
        self.manager.valid_index()
    }

    fn sample_index(&mut self, batch_size: isize) -> Vec<usize> {
        self.manager.sample_index(batch_size)
    }

    fn get(&self, index: &[usize], key: &str, stack_num: Option<usize>) -> Result<Value> {
        self.manager.get(index, key, stack_num)
    }

    fn get_item(&self, index: impl Into<Index>) -> Result<Batch> {
        self.manager.get_item(index)
    }

    fn reset(&mut self, keep_statistics: bool) -> Result<()> {
        self.manager.reset(keep_statistics)
    }

    fn update(&mut self, _other: &dyn ReplayBufferBase) -> Result<Vec<usize>> {
        Err(BufferError::NotSupported(format!(
            "{} cannot be updated from another buffer",
            self.kind().name()
        )))
    }

    fn update_weight(&mut self, index: &[usize], new_weight: &[f64]) -> Result<()> {
        self.manager.update_weight(index, new_weight)
    }

    fn set_beta(&mut self, beta: f64) -> Result<()> {
        self.manager.set_beta(beta)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let kind = self.kind();
        let mut root = self.manager.store.to_group(kind.name())?;
        root.set_attr("cached_buffer_num", Attr::Int(self.cached_buffer_num as i64));
        persist::write_group(path, &root)?;
        info!("Save {} with {} transitions to {:?}", kind.name(), self.len(), path);
        Ok(())
    }
}
