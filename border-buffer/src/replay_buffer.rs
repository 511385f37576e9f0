//! Replay buffers.
//!
//! Every buffer stores transitions as rows of a [`Batch`] whose columns span
//! the buffer's whole index space. The family shares one capability trait,
//! [`ReplayBufferBase`]:
//!
//! - [`ReplayBuffer`]: a circular buffer, prioritized when its configuration
//!   carries a [`PerConfig`]
//! - [`ReplayBufferManager`]: several child buffers laid out back to back in a
//!   single global index space; [`ReplayBufferManager::vector`] builds the
//!   usual one-child-per-environment layout
//! - [`CachedReplayBuffer`]: a main buffer plus per-environment caches; an
//!   episode moves to the main buffer once it is finished
//! - [`ListReplayBuffer`]: an unbounded list of records without sampling
//!
//! Index arithmetic (wrapping, stepping within an episode, frame windows)
//! lives in [`Cursor`], shared by all of them.
mod base;
mod cached;
mod config;
mod cursor;
mod list;
mod manager;
mod per;
mod store;
mod transition;
use crate::{
    batch::{Batch, Index, Value},
    error::{BufferError, Result},
    persist,
};
pub use base::ReplayBuffer;
pub use cached::CachedReplayBuffer;
pub use config::{PerConfig, ReplayBufferConfig};
pub use cursor::Cursor;
pub use list::ListReplayBuffer;
use log::info;
pub use manager::{BufferView, ReplayBufferManager};
use ndarray::ArrayD;
use std::path::Path;
pub use transition::{Transition, RESERVED_KEYS};

/// Result of adding one transition.
///
/// `ep_len` is 0 and `ep_rew` is zero unless the transition closed an
/// episode; `ep_idx` is then the index of the episode's first transition,
/// otherwise the insertion index.
#[derive(Clone, Debug, PartialEq)]
pub struct AddOutcome {
    /// Index the transition was written to.
    pub ptr: usize,

    /// Length of the closed episode.
    pub ep_len: usize,

    /// Return of the closed episode.
    pub ep_rew: ArrayD<f64>,

    /// Start of the closed episode.
    pub ep_idx: usize,
}

/// Concrete type of a buffer, stored in saved files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// [`ReplayBuffer`] with uniform sampling.
    ReplayBuffer,

    /// [`ReplayBuffer`] with prioritized sampling.
    PrioritizedReplayBuffer,

    /// [`ReplayBufferManager`] with uniform sampling.
    ReplayBufferManager,

    /// [`ReplayBufferManager`] with prioritized sampling.
    PrioritizedReplayBufferManager,

    /// [`CachedReplayBuffer`] with uniform sampling.
    CachedReplayBuffer,

    /// [`CachedReplayBuffer`] with prioritized sampling.
    PrioritizedCachedReplayBuffer,

    /// [`ListReplayBuffer`].
    ListReplayBuffer,
}

impl BufferKind {
    const ALL: [BufferKind; 7] = [
        BufferKind::ReplayBuffer,
        BufferKind::PrioritizedReplayBuffer,
        BufferKind::ReplayBufferManager,
        BufferKind::PrioritizedReplayBufferManager,
        BufferKind::CachedReplayBuffer,
        BufferKind::PrioritizedCachedReplayBuffer,
        BufferKind::ListReplayBuffer,
    ];

    /// Name written to saved files.
    pub fn name(&self) -> &'static str {
        match self {
            BufferKind::ReplayBuffer => "ReplayBuffer",
            BufferKind::PrioritizedReplayBuffer => "PrioritizedReplayBuffer",
            BufferKind::ReplayBufferManager => "ReplayBufferManager",
            BufferKind::PrioritizedReplayBufferManager => "PrioritizedReplayBufferManager",
            BufferKind::CachedReplayBuffer => "CachedReplayBuffer",
            BufferKind::PrioritizedCachedReplayBuffer => "PrioritizedCachedReplayBuffer",
            BufferKind::ListReplayBuffer => "ListReplayBuffer",
        }
    }

    /// Inverse of [`BufferKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Returns `true` for prioritized buffers.
    pub fn is_prioritized(&self) -> bool {
        matches!(
            self,
            BufferKind::PrioritizedReplayBuffer
                | BufferKind::PrioritizedReplayBufferManager
                | BufferKind::PrioritizedCachedReplayBuffer
        )
    }
}

/// Interface of buffers that store transitions by index.
///
/// Indices are global: for composed buffers they run over all children.
/// Methods taking an [`Index`] accept integers, lists and ranges; negative
/// positions count from the end of the index space.
pub trait ReplayBufferBase {
    /// Concrete type of the buffer.
    fn kind(&self) -> BufferKind;

    /// Storage options.
    fn config(&self) -> &ReplayBufferConfig;

    /// Size of the index space.
    fn maxsize(&self) -> usize;

    /// Number of valid transitions.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no valid transition.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids accepted by [`ReplayBufferBase::add`].
    fn buffer_num(&self) -> usize;

    /// The underlying storage, one row per index.
    fn meta(&self) -> &Batch;

    /// Adds transitions.
    ///
    /// With `buffer_ids`, `batch` holds one row per id and each row goes to
    /// the child with that id. Without, a plain buffer takes `batch` as a
    /// single transition and composed buffers send row `i` to child `i`.
    fn add(&mut self, batch: &Batch, buffer_ids: Option<&[usize]>) -> Result<Vec<AddOutcome>>;

    /// Index of the previous transition of the same episode.
    fn prev(&self, index: impl Into<Index>) -> Vec<usize>
    where
        Self: Sized;

    /// Index of the next transition of the same episode.
    fn next(&self, index: impl Into<Index>) -> Vec<usize>
    where
        Self: Sized;

    /// Last written index of every child whose episode is still open.
    fn unfinished_index(&self) -> Vec<usize>;

    /// Every valid index, child by child, oldest first.
    fn valid_index(&self) -> Vec<usize>;

    /// Indices to sample.
    ///
    /// A positive `batch_size` draws that many indices with replacement, 0
    /// returns every valid index and a negative size returns none.
    fn sample_index(&mut self, batch_size: isize) -> Vec<usize>;

    /// Values of `key` at `index`, stacked over `stack_num` frames (by
    /// default the configured number).
    fn get(&self, index: &[usize], key: &str, stack_num: Option<usize>) -> Result<Value>;

    /// Transitions at `index`, with stacked observations and `obs_next`.
    fn get_item(&self, index: impl Into<Index>) -> Result<Batch>
    where
        Self: Sized;

    /// Samples transitions, returning them with their indices.
    fn sample(&mut self, batch_size: isize) -> Result<(Batch, Vec<usize>)>
    where
        Self: Sized,
    {
        let ix = self.sample_index(batch_size);
        let batch = self.get_item(ix.clone())?;
        Ok((batch, ix))
    }

    /// Clears the buffer.
    ///
    /// With `keep_statistics`, the accumulators of open episodes survive.
    fn reset(&mut self, keep_statistics: bool) -> Result<()>;

    /// Copies every valid transition of `other`, oldest first, and returns
    /// the indices written to.
    fn update(&mut self, other: &dyn ReplayBufferBase) -> Result<Vec<usize>>;

    /// Sets new priorities, `(|w| + eps)^alpha`, for prioritized buffers.
    fn update_weight(&mut self, _index: &[usize], _new_weight: &[f64]) -> Result<()> {
        Err(BufferError::NotSupported(format!(
            "{} is not prioritized",
            self.kind().name()
        )))
    }

    /// Sets the importance sampling exponent of prioritized buffers.
    fn set_beta(&mut self, _beta: f64) -> Result<()> {
        Err(BufferError::NotSupported(format!(
            "{} is not prioritized",
            self.kind().name()
        )))
    }

    /// Saves the buffer.
    fn save(&self, path: &Path) -> Result<()>;
}

/// A buffer of any type, as returned by [`load_buffer`].
pub enum AnyBuffer {
    /// A plain or prioritized buffer.
    Plain(ReplayBuffer),

    /// A manager.
    Manager(ReplayBufferManager),

    /// A cached buffer.
    Cached(CachedReplayBuffer),

    /// A list buffer.
    List(ListReplayBuffer),
}

impl AnyBuffer {
    /// Concrete type of the loaded buffer.
    pub fn kind(&self) -> BufferKind {
        match self {
            AnyBuffer::Plain(b) => b.kind(),
            AnyBuffer::Manager(b) => b.kind(),
            AnyBuffer::Cached(b) => b.kind(),
            AnyBuffer::List(_) => BufferKind::ListReplayBuffer,
        }
    }
}

/// Loads a buffer saved by any buffer type.
pub fn load_buffer(path: impl AsRef<Path>) -> Result<AnyBuffer> {
    let root = persist::read_group(path.as_ref())?;
    let class = root.attr_str(persist::CLASS_ATTR)?;
    let kind = BufferKind::from_name(class).ok_or_else(|| {
        BufferError::Serialization(format!("unknown buffer type '{}'", class))
    })?;
    info!("Load {} from {:?}", kind.name(), path.as_ref());
    Ok(match kind {
        BufferKind::ReplayBuffer | BufferKind::PrioritizedReplayBuffer => {
            AnyBuffer::Plain(ReplayBuffer::from_group(&root)?)
        }
        BufferKind::ReplayBufferManager | BufferKind::PrioritizedReplayBufferManager => {
            AnyBuffer::Manager(ReplayBufferManager::from_group(&root)?)
        }
        BufferKind::CachedReplayBuffer | BufferKind::PrioritizedCachedReplayBuffer => {
            AnyBuffer::Cached(CachedReplayBuffer::from_group(&root)?)
        }
        BufferKind::ListReplayBuffer => AnyBuffer::List(ListReplayBuffer::from_group(&root)?),
    })
}
