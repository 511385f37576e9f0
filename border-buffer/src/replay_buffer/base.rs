//! Circular replay buffer.
use super::{
    config::ReplayBufferConfig, store::Store, AddOutcome, BufferKind, ReplayBufferBase,
};
use crate::{
    batch::{Batch, Index, Value},
    error::{index_err, Result},
    persist::{self, Group},
};
use log::info;
use std::path::Path;

/// A circular buffer of transitions.
///
/// Transitions are written at a cursor that wraps around, so that once the
/// buffer is full the oldest transition is overwritten. With a
/// [`PerConfig`](super::PerConfig) in its configuration the buffer samples
/// proportionally to priorities and attaches importance sampling weights,
/// `weight`, to sampled records.
///
/// # Examples
///
/// ```rust
/// use border_buffer::{ReplayBuffer, ReplayBufferBase, ReplayBufferConfig, Transition};
///
/// let mut buf = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(3)).unwrap();
/// for i in 0..4 {
///     buf.add_transition(Transition::new(i, 0, 1.0).terminated(i == 1)).unwrap();
/// }
/// assert_eq!(buf.len(), 3);
/// assert_eq!(buf.sample_index(0), vec![1, 2, 0]);
/// ```
pub struct ReplayBuffer {
    store: Store,
}

impl ReplayBuffer {
    /// Creates an empty buffer of `config.capacity` slots.
    pub fn build(config: &ReplayBufferConfig) -> Result<Self> {
        Ok(Self {
            store: Store::new(config.clone(), &[config.capacity])?,
        })
    }

    /// Adds a single transition.
    pub fn add_transition(&mut self, transition: impl Into<Batch>) -> Result<AddOutcome> {
        let mut out = self.store.add(&transition.into(), &[0], false, None)?;
        Ok(out.remove(0))
    }

    /// Adds a single transition with the priority `|weight|`.
    pub fn add_with_weight(&mut self, transition: impl Into<Batch>, weight: f64) -> Result<AddOutcome> {
        let mut out = self
            .store
            .add(&transition.into(), &[0], false, Some(&[weight]))?;
        Ok(out.remove(0))
    }

    /// Stored priorities, `|w|^alpha`, of a prioritized buffer.
    pub fn weight(&self, index: impl Into<Index>) -> Result<Vec<f64>> {
        self.store.weight(&self.store.wrap(&index.into()))
    }

    /// Replaces the storage. The record must have `maxsize` rows.
    pub fn set_batch(&mut self, batch: Batch) -> Result<()> {
        self.store.set_batch(batch)
    }

    /// Mutable access to the storage.
    pub fn meta_mut(&mut self) -> &mut Batch {
        &mut self.store.meta
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
            BufferKind::ReplayBuffer.name(),
            BufferKind::PrioritizedReplayBuffer.name(),
        ])?;
        Ok(Self {
            store: Store::from_group(root)?,
        })
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

impl ReplayBufferBase for ReplayBuffer {
    fn kind(&self) -> BufferKind {
        if self.store.per.is_some() {
            BufferKind::PrioritizedReplayBuffer
        } else {
            BufferKind::ReplayBuffer
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
        1
    }

    fn meta(&self) -> &Batch {
        &self.store.meta
    }

    fn add(&mut self, batch: &Batch, buffer_ids: Option<&[usize]>) -> Result<Vec<AddOutcome>> {
        match buffer_ids {
            None => self.store.add(batch, &[0], false, None),
            Some(ids) => {
                if let Some(&id) = ids.iter().find(|&&id| id != 0) {
                    return index_err(format!("buffer id {} given to a single buffer", id));
                }
                self.store.add(batch, ids, true, None)
            }
        }
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

    fn update(&mut self, other: &dyn ReplayBufferBase) -> Result<Vec<usize>> {
        if other.is_empty() || self.store.maxsize == 0 {
            return Ok(vec![]);
        }
        let ix = other.valid_index();
        self.store.append_from(0, other.meta(), &ix)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{batch, replay_buffer::Transition, PerConfig};

    fn buffer(capacity: usize) -> ReplayBuffer {
        ReplayBuffer::build(&ReplayBufferConfig::default().capacity(capacity)).unwrap()
    }

    #[test]
    fn sample_index_zero_is_every_written_slot() -> Result<()> {
        let mut buf = buffer(5);
        for i in 0..3 {
            buf.add_transition(Transition::new(i, 0, 0.0))?;
        }
        assert_eq!(buf.sample_index(0), vec![0, 1, 2]);
        for i in 3..7 {
            buf.add_transition(Transition::new(i, 0, 0.0))?;
        }
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.sample_index(0), vec![2, 3, 4, 0, 1]);
        assert!(buf.sample_index(-1).is_empty());
        assert!(buf.sample_index(10).iter().all(|&i| i < 5));
        Ok(())
    }

    #[test]
    fn episodes_are_reported_when_closed() -> Result<()> {
        let mut buf = buffer(10);
        let out = buf.add_transition(Transition::new(0, 0, 1.0))?;
        assert_eq!((out.ptr, out.ep_len, out.ep_idx), (0, 0, 0));
        let out = buf.add_transition(Transition::new(1, 0, 2.0))?;
        assert_eq!((out.ptr, out.ep_len, out.ep_idx), (1, 0, 1));
        let out = buf.add_transition(Transition::new(2, 0, 3.0).terminated(true))?;
        assert_eq!((out.ptr, out.ep_len, out.ep_idx), (2, 3, 0));
        assert_eq!(out.ep_rew.sum(), 6.0);
        assert!(buf.unfinished_index().is_empty());
        Ok(())
    }

    #[test]
    fn reset_rewinds_the_cursor() -> Result<()> {
        let mut buf = buffer(4);
        for i in 0..3 {
            buf.add_transition(Transition::new(i, 0, 0.0))?;
        }
        buf.reset(false)?;
        assert!(buf.is_empty());
        assert_eq!(buf.add_transition(Transition::new(9, 0, 0.0))?.ptr, 0);
        Ok(())
    }

    #[test]
    fn reward_shape_is_fixed_by_the_first_add() -> Result<()> {
        let mut buf = buffer(4);
        buf.add_transition(Transition::new(0, 0, vec![1.0, 2.0]).terminated(true))?;
        let err = buf.add_transition(Transition::new(0, 0, 1.0));
        assert!(matches!(err, Err(crate::BufferError::Value(_))));
        assert_eq!(buf.len(), 1);
        Ok(())
    }

    #[test]
    fn new_info_keys_are_backfilled() -> Result<()> {
        let mut buf = buffer(3);
        buf.add_transition(Transition::new(0, 0, 0.0))?;
        buf.add_transition(Transition::new(1, 0, 0.0).info(batch! { "id" => 5 }))?;
        let b = buf.get_item(vec![0, 1])?;
        assert_eq!(b.info().unwrap().get("id").unwrap(), &Value::from(vec![0, 5]));
        Ok(())
    }

    #[test]
    fn stacked_add_accepts_only_id_zero() -> Result<()> {
        let mut buf = buffer(3);
        let rows = batch! {
            "obs" => vec![1], "act" => vec![0], "rew" => vec![0.0], "done" => vec![false],
        };
        assert_eq!(buf.add(&rows, Some(&[0]))?[0].ptr, 0);
        assert!(buf.add(&rows, Some(&[1])).is_err());
        Ok(())
    }

    #[test]
    fn prioritized_weights() -> Result<()> {
        let config = ReplayBufferConfig::default()
            .capacity(4)
            .per_config(Some(PerConfig::default().alpha(0.5).beta(0.5)));
        let mut buf = ReplayBuffer::build(&config)?;
        assert_eq!(buf.kind(), BufferKind::PrioritizedReplayBuffer);
        for i in 0..3 {
            buf.add_transition(Transition::new(i, 0, 0.0))?;
        }
        assert_eq!(buf.weight(vec![0, 1, 2])?, vec![1.0; 3]);
        let (b, ix) = buf.sample(8)?;
        assert_eq!(ix.len(), 8);
        assert_eq!(b.get("weight").unwrap(), &Value::from(vec![1.0; 8]));

        buf.update_weight(&[1], &[-3.0])?;
        let w = buf.weight(1)?;
        assert!((w[0] - (3.0 + f32::EPSILON as f64).sqrt()).abs() < 1e-12);
        buf.add_with_weight(Transition::new(3, 0, 0.0), 0.25)?;
        assert!((buf.weight(3)?[0] - 0.5).abs() < 1e-12);

        let unweighted = buffer(2);
        assert!(unweighted.weight(0).is_err());
        Ok(())
    }
}
