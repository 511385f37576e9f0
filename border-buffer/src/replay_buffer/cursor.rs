//! Circular index arithmetic shared by every buffer.
//!
//! A buffer is one or more contiguous segments of a global index space. Each
//! segment is a ring with its own write cursor and open-episode accumulator.
//! Stepping backward or forward never leaves a segment, never crosses an
//! episode end (`done`), and never wraps past the most recent write.
use super::AddOutcome;
use crate::error::{value_err, Result};
use ndarray::{ArrayD, ArrayView1, IxDyn};
use serde::{Deserialize, Serialize};

/// Write cursor and episode accumulator of one ring segment.
///
/// All positions except `offset` are local to the segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub(crate) offset: usize,
    pub(crate) maxsize: usize,
    pub(crate) index: usize,
    pub(crate) size: usize,
    pub(crate) last_index: usize,
    pub(crate) ep_rew: ArrayD<f64>,
    pub(crate) ep_len: usize,
    pub(crate) ep_idx: usize,
}

fn zero_reward() -> ArrayD<f64> {
    ArrayD::zeros(IxDyn(&[]))
}

fn is_done(done: &ArrayView1<'_, bool>, g: usize) -> bool {
    done.get(g).copied().unwrap_or(false)
}

impl Cursor {
    /// An empty segment of `maxsize` slots starting at global `offset`.
    pub fn new(offset: usize, maxsize: usize) -> Self {
        Self {
            offset,
            maxsize,
            index: 0,
            size: 0,
            last_index: 0,
            ep_rew: zero_reward(),
            ep_len: 0,
            ep_idx: 0,
        }
    }

    /// Global offset of the segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Capacity of the segment.
    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Number of written slots.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if nothing has been written since the last reset.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Next local write position.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` if global index `g` belongs to this segment.
    pub fn contains(&self, g: usize) -> bool {
        self.offset <= g && g < self.offset + self.maxsize
    }

    /// Clears the cursor. The accumulators survive if `keep_statistics`.
    pub fn reset(&mut self, keep_statistics: bool) {
        self.index = 0;
        self.size = 0;
        self.last_index = 0;
        if !keep_statistics {
            self.ep_rew = zero_reward();
            self.ep_len = 0;
            self.ep_idx = 0;
        }
    }

    /// Fails if `rew` cannot be added to the open episode's reward.
    pub(crate) fn check_reward(&self, rew: &ArrayD<f64>) -> Result<()> {
        if self.ep_len > 0 && self.ep_rew.shape() != rew.shape() {
            return value_err(format!(
                "reward of shape {:?} does not match the episode reward of shape {:?}",
                rew.shape(),
                self.ep_rew.shape()
            ));
        }
        Ok(())
    }

    /// Claims the next slot and updates the open episode.
    ///
    /// Returns local positions; an episode that is still open reports
    /// `ep_len == 0`, a zero reward and the insertion position as `ep_idx`.
    pub(crate) fn advance(&mut self, rew: &ArrayD<f64>, done: bool) -> Result<AddOutcome> {
        if self.maxsize == 0 {
            return value_err("cannot write to a segment of size 0");
        }
        self.check_reward(rew)?;

        let ptr = self.index;
        self.last_index = ptr;
        self.size = (self.size + 1).min(self.maxsize);
        self.index = (self.index + 1) % self.maxsize;
        self.ep_rew = if self.ep_len == 0 {
            rew.clone()
        } else {
            &self.ep_rew + rew
        };
        self.ep_len += 1;

        if done {
            let out = AddOutcome {
                ptr,
                ep_len: self.ep_len,
                ep_rew: std::mem::replace(&mut self.ep_rew, zero_reward()),
                ep_idx: self.ep_idx,
            };
            self.ep_len = 0;
            self.ep_idx = self.index;
            Ok(out)
        } else {
            Ok(AddOutcome {
                ptr,
                ep_len: 0,
                ep_rew: rew.mapv(|_| 0.0),
                ep_idx: ptr,
            })
        }
    }

    /// Global index of the previous step in the same episode.
    ///
    /// `done` is the global done column.
    pub(crate) fn prev(&self, g: usize, done: &ArrayView1<'_, bool>) -> usize {
        if self.size == 0 {
            return self.offset;
        }
        let local = g - self.offset;
        let j = (local + self.size - 1) % self.size;
        let end = is_done(done, self.offset + j) || j == self.last_index;
        self.offset + (j + end as usize) % self.size
    }

    /// Global index of the next step in the same episode.
    pub(crate) fn next(&self, g: usize, done: &ArrayView1<'_, bool>) -> usize {
        if self.size == 0 {
            return self.offset;
        }
        let local = g - self.offset;
        let end = is_done(done, g) || local == self.last_index;
        self.offset + (local + 1 - end as usize) % self.size
    }

    /// Written global indices, oldest first.
    pub(crate) fn chronological(&self) -> Vec<usize> {
        (self.index..self.size)
            .chain(0..self.index.min(self.size))
            .map(|i| i + self.offset)
            .collect()
    }

    /// Global index of the latest write if its episode is still open.
    pub(crate) fn unfinished(&self, done: &ArrayView1<'_, bool>) -> Option<usize> {
        if self.size == 0 {
            return None;
        }
        let last = self.offset + (self.index + self.size - 1) % self.size;
        if is_done(done, last) {
            None
        } else {
            Some(last)
        }
    }

    /// Written global indices with `stack_num` frames of history available.
    pub(crate) fn avail(&self, stack_num: usize, done: &ArrayView1<'_, bool>) -> Vec<usize> {
        let all = self.chronological();
        all.into_iter()
            .filter(|&g| {
                let mut p = g;
                for _ in 0..stack_num.saturating_sub(2) {
                    p = self.prev(p, done);
                }
                p != self.prev(p, done)
            })
            .collect()
    }
}
