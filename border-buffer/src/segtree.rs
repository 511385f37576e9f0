//! Segment tree for prioritized sampling.
//!
//! An array-backed binary tree whose internal nodes hold the sum of their
//! subtree. Leaves live in the second half of an array of length `2 * bound`,
//! where `bound` is the smallest power of two not less than the number of
//! leaves; node `i` has children `2i` and `2i + 1`, and the root is node 1.
use crate::error::{index_err, BufferError, Result};

/// Sum segment tree over `size` non-negative weights.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentTree {
    size: usize,
    bound: usize,
    value: Vec<f64>,
}

impl SegmentTree {
    /// Creates a tree of `size` leaves, all zero.
    pub fn new(size: usize) -> Self {
        let bound = size.max(1).next_power_of_two();
        Self {
            size,
            bound,
            value: vec![0.0; 2 * bound],
        }
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn check(&self, i: usize) -> Result<()> {
        if i >= self.size {
            return index_err(format!(
                "index {} is out of range for a tree of size {}",
                i, self.size
            ));
        }
        Ok(())
    }

    /// Weight of leaf `i`.
    pub fn get(&self, i: usize) -> Result<f64> {
        self.check(i)?;
        Ok(self.value[i + self.bound])
    }

    /// Weights of several leaves.
    pub fn get_many(&self, ix: &[usize]) -> Result<Vec<f64>> {
        ix.iter().map(|&i| self.get(i)).collect()
    }

    /// All leaf weights.
    pub fn leaves(&self) -> &[f64] {
        &self.value[self.bound..self.bound + self.size]
    }

    /// Sets leaf `i` to `v` and recomputes its ancestors.
    pub fn set(&mut self, i: usize, v: f64) -> Result<()> {
        self.check(i)?;
        let mut ix = i + self.bound;
        self.value[ix] = v;
        while ix > 1 {
            ix /= 2;
            self.value[ix] = self.value[2 * ix] + self.value[2 * ix + 1];
        }
        Ok(())
    }

    /// Sets several leaves; with duplicated indices the last write wins.
    pub fn set_many(&mut self, ix: &[usize], vs: &[f64]) -> Result<()> {
        if ix.len() != vs.len() {
            return Err(BufferError::Precondition(format!(
                "{} indices but {} values",
                ix.len(),
                vs.len()
            )));
        }
        if let Some(&i) = ix.iter().find(|&&i| i >= self.size) {
            self.check(i)?;
        }
        for (&i, &v) in ix.iter().zip(vs.iter()) {
            self.set(i, v)?;
        }
        Ok(())
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.value[1]
    }

    /// Sum of weights over `[start, end)`.
    ///
    /// Negative bounds count from the end; bounds are then clamped to
    /// `[0, size]`, and an empty range sums to zero. `end = None` means `size`.
    pub fn reduce(&self, start: isize, end: Option<isize>) -> f64 {
        let n = self.size as isize;
        let norm = |v: isize| (if v < 0 { v + n } else { v }).max(0).min(n) as usize;
        let start = norm(start);
        let end = end.map_or(self.size, norm);
        if start >= end {
            return 0.0;
        }
        if start == 0 && end == self.size {
            return self.sum();
        }

        let mut result = 0.0;
        let mut s = start + self.bound - 1;
        let mut e = end + self.bound;
        while e - s > 1 {
            if s % 2 == 0 {
                result += self.value[s + 1];
            }
            s /= 2;
            if e % 2 == 1 {
                result += self.value[e - 1];
            }
            e /= 2;
        }
        result
    }

    /// Smallest index whose inclusive prefix sum covers `s`.
    ///
    /// Requires `0 <= s < self.sum()`. Descends from the root, going left
    /// whenever the left subtree's sum is at least the remaining scalar, so a
    /// scalar exactly on a boundary resolves to the smaller index.
    pub fn get_prefix_sum_idx(&self, s: f64) -> Result<usize> {
        let total = self.sum();
        if !(s >= 0.0 && s < total) {
            return Err(BufferError::Precondition(format!(
                "prefix-sum scalar {} is outside [0, {})",
                s, total
            )));
        }
        Ok(self.descend(s))
    }

    /// Vectorized [`SegmentTree::get_prefix_sum_idx`].
    pub fn get_prefix_sum_indices(&self, ss: &[f64]) -> Result<Vec<usize>> {
        ss.iter().map(|&s| self.get_prefix_sum_idx(s)).collect()
    }

    pub(crate) fn descend(&self, mut s: f64) -> usize {
        let mut ix = 1;
        while ix < self.bound {
            ix *= 2;
            let left = self.value[ix];
            if left < s {
                s -= left;
                ix += 1;
            }
        }
        (ix - self.bound).min(self.size.saturating_sub(1))
    }
}
