//! State of prioritized experience replay.
use super::config::PerConfig;
use crate::{
    error::{BufferError, Result},
    SegmentTree,
};
use rand::{rngs::StdRng, Rng};

/// Minimum over the positive leaves of a [`SegmentTree`].
///
/// Zero leaves (unwritten or cleared slots) are kept as infinity so they
/// never become the minimum.
#[derive(Clone, Debug)]
struct MinTree {
    bound: usize,
    value: Vec<f64>,
}

impl MinTree {
    fn new(size: usize) -> Self {
        let bound = size.max(1).next_power_of_two();
        Self {
            bound,
            value: vec![f64::INFINITY; 2 * bound],
        }
    }

    fn set(&mut self, i: usize, v: f64) {
        let mut ix = i + self.bound;
        self.value[ix] = if v > 0.0 { v } else { f64::INFINITY };
        while ix > 1 {
            ix /= 2;
            self.value[ix] = self.value[2 * ix].min(self.value[2 * ix + 1]);
        }
    }

    /// `None` if no leaf is positive.
    fn min(&self) -> Option<f64> {
        Some(self.value[1]).filter(|m| m.is_finite())
    }
}

/// Priorities over the whole index space of a buffer.
///
/// Leaves hold `priority^alpha`. `max_prio` tracks the largest raw priority
/// seen so far; new transitions get `max_prio^alpha`. The minimum used for
/// importance weights is taken over the live leaves.
#[derive(Clone, Debug)]
pub(crate) struct PerState {
    pub(crate) tree: SegmentTree,
    min_tree: MinTree,
    pub(crate) alpha: f64,
    pub(crate) beta: f64,
    pub(crate) eps: f64,
    pub(crate) max_prio: f64,
}

impl PerState {
    pub(crate) fn new(size: usize, config: &PerConfig) -> Self {
        Self {
            tree: SegmentTree::new(size),
            min_tree: MinTree::new(size),
            alpha: config.alpha,
            beta: config.beta,
            eps: config.eps,
            max_prio: 1.0,
        }
    }

    /// Writes leaves of both trees.
    pub(crate) fn set_leaves(&mut self, ix: &[usize], leaves: &[f64]) -> Result<()> {
        self.tree.set_many(ix, leaves)?;
        for (&i, &v) in ix.iter().zip(leaves.iter()) {
            self.min_tree.set(i, v);
        }
        Ok(())
    }

    /// Smallest positive leaf, i.e. the minimum of `priority^alpha` over the
    /// stored transitions.
    pub(crate) fn min_leaf(&self) -> Option<f64> {
        self.min_tree.min()
    }

    /// Priority of a freshly written slot.
    pub(crate) fn init_weight(&mut self, i: usize, weight: Option<f64>) -> Result<()> {
        let p = match weight {
            Some(w) => w.abs(),
            None => self.max_prio,
        };
        self.max_prio = self.max_prio.max(p);
        self.set_leaves(&[i], &[p.powf(self.alpha)])
    }

    /// Sets `|w| + eps` as the priority of each index.
    pub(crate) fn update_weight(&mut self, ix: &[usize], new_weight: &[f64]) -> Result<()> {
        if ix.len() != new_weight.len() {
            return Err(BufferError::Precondition(format!(
                "{} indices but {} weights",
                ix.len(),
                new_weight.len()
            )));
        }
        let ps: Vec<f64> = new_weight.iter().map(|w| w.abs() + self.eps).collect();
        let leaves: Vec<f64> = ps.iter().map(|p| p.powf(self.alpha)).collect();
        self.set_leaves(ix, &leaves)?;
        self.max_prio = ps.into_iter().fold(self.max_prio, f64::max);
        Ok(())
    }

    /// Importance sampling weights, 1 for the least prioritized transition.
    pub(crate) fn is_weight(&self, ix: &[usize]) -> Result<Vec<f64>> {
        let denom = self.min_leaf().unwrap_or(1.0);
        Ok(self
            .tree
            .get_many(ix)?
            .into_iter()
            .map(|p| (p / denom).powf(-self.beta))
            .collect())
    }

    /// Draws `n` indices proportionally to their priority.
    ///
    /// Returns `None` if every priority is zero.
    pub(crate) fn sample(&self, rng: &mut StdRng, n: usize) -> Option<Vec<usize>> {
        let total = self.tree.sum();
        if !(total > 0.0) {
            return None;
        }
        Some(
            (0..n)
                .map(|_| self.tree.descend(rng.gen::<f64>() * total))
                .collect(),
        )
    }

    /// Zeroes the priorities of `[start, end)`.
    pub(crate) fn clear(&mut self, start: usize, end: usize) -> Result<()> {
        let ix: Vec<usize> = (start..end).collect();
        let zeros = vec![0.0; ix.len()];
        self.set_leaves(&ix, &zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn weights_follow_updates() -> Result<()> {
        let mut per = PerState::new(4, &PerConfig::default().alpha(0.5).beta(0.5));
        for i in 0..4 {
            per.init_weight(i, None)?;
        }
        per.update_weight(&[0, 1], &[-4.0, 0.25])?;
        assert!((per.tree.get(0)? - (4.0 + per.eps).sqrt()).abs() < 1e-12);
        assert!(per.max_prio > 4.0);
        assert!((per.min_leaf().unwrap() - (0.25 + per.eps).sqrt()).abs() < 1e-12);

        let w = per.is_weight(&[1, 0])?;
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!(w[1] < 1.0);
        Ok(())
    }

    #[test]
    fn least_priority_has_unit_weight_above_one() -> Result<()> {
        let mut per = PerState::new(3, &PerConfig::default().alpha(0.5).beta(0.5));
        for i in 0..3 {
            per.init_weight(i, None)?;
        }
        per.update_weight(&[0, 1, 2], &[4.0, 9.0, 16.0])?;
        let w = per.is_weight(&[0, 1, 2])?;
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!(w[1] < 1.0 && w[2] < w[1]);

        // the minimum follows overwrites and clears
        per.update_weight(&[0], &[25.0])?;
        assert!((per.is_weight(&[1])?[0] - 1.0).abs() < 1e-12);
        per.clear(1, 2)?;
        assert!((per.is_weight(&[2])?[0] - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn sampling_skips_zero_priorities() -> Result<()> {
        let mut per = PerState::new(5, &PerConfig::default());
        per.init_weight(3, None)?;
        let mut rng = StdRng::seed_from_u64(0);
        let ix = per.sample(&mut rng, 100).unwrap_or_default();
        assert!(ix.iter().all(|&i| i == 3));
        per.clear(0, 5)?;
        assert!(per.sample(&mut rng, 1).is_none());
        Ok(())
    }
}
