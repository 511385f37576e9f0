#![warn(missing_docs)]
//! Records and replay buffers for reinforcement learning.
//!
//! [`Batch`] is a nested, columnar record. Replay buffers store transitions
//! as rows of a [`Batch`] and sample them uniformly or, with a
//! [`SegmentTree`] of priorities, proportionally to their priorities.
//!
//! ```rust
//! use border_buffer::{ReplayBufferBase, ReplayBufferConfig, ReplayBufferManager, batch};
//!
//! let config = ReplayBufferConfig::default();
//! let mut buf = ReplayBufferManager::vector(20, 4, &config).unwrap();
//! buf.add(
//!     &batch! {
//!         "obs" => vec![1, 2, 3], "act" => vec![1, 2, 3], "rew" => vec![1, 2, 3],
//!         "done" => vec![false, false, true],
//!     },
//!     Some(&[0, 1, 2]),
//! )
//! .unwrap();
//! assert_eq!(buf.sample_index(0), vec![0, 5, 10]);
//! assert_eq!(buf.unfinished_index(), vec![0, 5]);
//! ```
pub mod batch;
pub mod error;
pub mod persist;
pub mod replay_buffer;
pub mod segtree;

pub use batch::{Batch, Index, Object, Resolved, Split, Value};
pub use error::{BufferError, Result};
pub use replay_buffer::{
    load_buffer, AddOutcome, AnyBuffer, BufferKind, BufferView, CachedReplayBuffer, Cursor,
    ListReplayBuffer, PerConfig, ReplayBuffer, ReplayBufferBase, ReplayBufferConfig,
    ReplayBufferManager, Transition, RESERVED_KEYS,
};
pub use segtree::SegmentTree;
