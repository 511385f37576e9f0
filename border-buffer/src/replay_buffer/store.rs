//! Column storage shared by the buffer family.
//!
//! A [`Store`] owns the columns of the whole global index space and one
//! [`Cursor`] per segment. A plain buffer is a store with one segment;
//! managers and the cached buffer use one segment per child, so children
//! never hold data of their own.
use super::{
    config::ReplayBufferConfig,
    cursor::Cursor,
    per::PerState,
    transition::{prepare_row, StoredRow},
    AddOutcome,
};
use crate::{
    batch::{Batch, Index, Value},
    error::{index_err, value_err, BufferError, Result},
    persist::{self, Attr, Group, CLASS_ATTR},
};
use log::trace;
use ndarray::{ArrayView1, Ix1};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, SeedableRng,
};

/// Fields read without frame stacking.
const FLAT_KEYS: [&str; 5] = ["act", "rew", "done", "terminated", "truncated"];

pub(crate) struct Store {
    pub(crate) config: ReplayBufferConfig,
    pub(crate) cursors: Vec<Cursor>,
    pub(crate) maxsize: usize,
    pub(crate) meta: Batch,
    pub(crate) per: Option<PerState>,
    pub(crate) rng: StdRng,
}

impl Store {
    /// Segments of the given sizes laid out back to back.
    pub(crate) fn new(config: ReplayBufferConfig, sizes: &[usize]) -> Result<Self> {
        config.validate()?;
        let mut cursors = Vec::with_capacity(sizes.len());
        let mut offset = 0;
        for &n in sizes {
            cursors.push(Cursor::new(offset, n));
            offset += n;
        }
        let per = config
            .per_config
            .as_ref()
            .map(|per_config| PerState::new(offset, per_config));
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            cursors,
            maxsize: offset,
            meta: Batch::new(),
            per,
            rng,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.cursors.iter().map(Cursor::len).sum()
    }

    fn segment_of(&self, g: usize) -> Option<&Cursor> {
        self.cursors.iter().find(|c| c.contains(g))
    }

    fn done_view(&self) -> ArrayView1<'_, bool> {
        self.meta
            .done()
            .and_then(Value::as_bool)
            .and_then(|a| a.view().into_dimensionality::<Ix1>().ok())
            .unwrap_or_else(|| ArrayView1::from(&[] as &[bool]))
    }

    /// Wraps an index into the global index space.
    pub(crate) fn wrap(&self, index: &Index) -> Vec<usize> {
        index.resolve_wrapping(self.maxsize).to_vec()
    }

    pub(crate) fn prev(&self, ix: &[usize]) -> Vec<usize> {
        let done = self.done_view();
        ix.iter()
            .map(|&g| self.segment_of(g).map_or(g, |c| c.prev(g, &done)))
            .collect()
    }

    pub(crate) fn next(&self, ix: &[usize]) -> Vec<usize> {
        let done = self.done_view();
        ix.iter()
            .map(|&g| self.segment_of(g).map_or(g, |c| c.next(g, &done)))
            .collect()
    }

    pub(crate) fn unfinished_index(&self) -> Vec<usize> {
        let done = self.done_view();
        self.cursors
            .iter()
            .filter_map(|c| c.unfinished(&done))
            .collect()
    }

    /// Every written index, segment by segment, oldest first.
    pub(crate) fn valid_index(&self) -> Vec<usize> {
        self.cursors.iter().flat_map(Cursor::chronological).collect()
    }

    fn avail_index(&self) -> Vec<usize> {
        let done = self.done_view();
        let stack_num = self.config.stack_num;
        self.cursors
            .iter()
            .flat_map(|c| c.avail(stack_num, &done))
            .collect()
    }

    pub(crate) fn sample_index(&mut self, batch_size: isize) -> Vec<usize> {
        if batch_size < 0 {
            return vec![];
        }
        let n = batch_size as usize;

        if self.config.sample_avail && self.config.stack_num > 1 {
            let all = self.avail_index();
            if n == 0 || all.is_empty() {
                return if n == 0 { all } else { vec![] };
            }
            // Priorities restricted to the available indices
            if let Some(per) = &self.per {
                let dist = per
                    .tree
                    .get_many(&all)
                    .ok()
                    .and_then(|w| WeightedIndex::new(&w).ok());
                if let Some(dist) = dist {
                    return (0..n).map(|_| all[dist.sample(&mut self.rng)]).collect();
                }
            }
            return (0..n)
                .map(|_| all[self.rng.gen_range(0..all.len())])
                .collect();
        }

        if n > 0 && self.len() > 0 {
            if let Some(per) = &self.per {
                if let Some(ix) = per.sample(&mut self.rng, n) {
                    return ix;
                }
            }
        }

        if n == 0 {
            return self.valid_index();
        }

        // Segments are drawn proportionally to their length, then slots
        // uniformly within each segment.
        let sizes: Vec<usize> = self.cursors.iter().map(Cursor::len).collect();
        let dist = match WeightedIndex::new(&sizes) {
            Ok(dist) => dist,
            Err(_) => return vec![],
        };
        let mut counts = vec![0usize; sizes.len()];
        for _ in 0..n {
            counts[dist.sample(&mut self.rng)] += 1;
        }
        let mut ix = Vec::with_capacity(n);
        for (c, &k) in self.cursors.iter().zip(counts.iter()) {
            for _ in 0..k {
                ix.push(c.offset + self.rng.gen_range(0..c.size));
            }
        }
        ix
    }

    /// Values of `key` at `ix`, stacked over `stack_num` frames.
    ///
    /// Frames are ordered oldest first along axis 1. A missing key reads as
    /// an empty record.
    pub(crate) fn get(&self, ix: &[usize], key: &str, stack_num: Option<usize>) -> Result<Value> {
        let col = match self.meta.get(key) {
            Some(col) if !col.is_empty_batch() => col,
            _ => return Ok(Value::Batch(Batch::new())),
        };
        let stack_num = stack_num.unwrap_or(self.config.stack_num);
        if stack_num <= 1 {
            return col.select(ix);
        }

        let mut frames = Vec::with_capacity(stack_num);
        let mut cur = ix.to_vec();
        for _ in 0..stack_num {
            frames.push(col.select(&cur)?);
            cur = self.prev(&cur);
        }
        frames.reverse();
        let refs: Vec<&Value> = frames.iter().collect();
        Value::stack(&refs, 1)
    }

    pub(crate) fn get_item(&self, index: &Index) -> Result<Batch> {
        let ix = match index {
            Index::Slice {
                start: None,
                end: None,
            } => self.valid_index(),
            Index::Slice { .. } => index.resolve(self.len())?.to_vec(),
            _ => index.resolve(self.maxsize)?.to_vec(),
        };

        let mut out = Batch::new();
        out.insert("obs", self.get(&ix, "obs", None)?);
        let obs_next = if self.config.save_obs_next() {
            self.get(&ix, "obs_next", None)?
        } else {
            self.get(&self.next(&ix), "obs", None)?
        };
        out.insert("obs_next", obs_next);
        for key in FLAT_KEYS.iter() {
            if let Some(col) = self.meta.get(key) {
                if !col.is_empty_batch() {
                    out.insert(*key, col.select(&ix)?);
                }
            }
        }
        out.insert("info", self.get(&ix, "info", None)?);
        out.insert("policy", self.get(&ix, "policy", None)?);
        if let Some(per) = &self.per {
            out.insert("weight", per.is_weight(&ix)?);
        }

        if index.is_int() {
            out.get_item(0)
        } else {
            Ok(out)
        }
    }

    fn check_segment(&self, seg: usize) -> Result<()> {
        if seg >= self.cursors.len() {
            return index_err(format!(
                "buffer id {} is out of range for {} buffers",
                seg,
                self.cursors.len()
            ));
        }
        Ok(())
    }

    /// Writes a prepared row at the cursor of segment `seg`.
    pub(crate) fn append_row(
        &mut self,
        seg: usize,
        stored: &StoredRow,
        weight: Option<f64>,
    ) -> Result<AddOutcome> {
        self.check_segment(seg)?;
        let cursor = &self.cursors[seg];
        if cursor.maxsize == 0 {
            return value_err("cannot add to a buffer of size 0");
        }
        cursor.check_reward(&stored.rew)?;
        if let Some(Value::Float(col)) = self.meta.rew() {
            if col.shape().get(1..) != Some(stored.rew.shape()) {
                return value_err(format!(
                    "reward of shape {:?} does not match the stored rewards of shape {:?}",
                    stored.rew.shape(),
                    col.shape()
                ));
            }
        }

        let g = cursor.offset + cursor.index;
        if self.meta.is_empty() {
            self.meta = stored.row.alloc_rows(self.maxsize)?;
        } else {
            self.meta.alloc_missing(&stored.row, self.maxsize)?;
        }
        self.meta.set_row(g, &stored.row)?;

        let cursor = &mut self.cursors[seg];
        let mut out = cursor.advance(&stored.rew, stored.done)?;
        out.ptr += cursor.offset;
        out.ep_idx += cursor.offset;
        if let Some(per) = self.per.as_mut() {
            per.init_weight(out.ptr, weight)?;
        }
        trace!("stored a transition at {}", out.ptr);
        Ok(out)
    }

    /// Writes transitions to the given segments.
    ///
    /// With `stacked`, `batch` holds one row per id; otherwise it is a single
    /// transition and `ids` has one element. Every row is checked before the
    /// first one is written.
    pub(crate) fn add(
        &mut self,
        batch: &Batch,
        ids: &[usize],
        stacked: bool,
        weight: Option<&[f64]>,
    ) -> Result<Vec<AddOutcome>> {
        let rows: Vec<Batch> = if stacked {
            let n = batch.len()?;
            if n != ids.len() {
                return value_err(format!("{} rows for {} buffer ids", n, ids.len()));
            }
            (0..n).map(|j| batch.get_item(j)).collect::<Result<_>>()?
        } else {
            if ids.len() != 1 {
                return value_err("a single transition needs exactly one buffer id");
            }
            vec![batch.clone()]
        };
        if let Some(w) = weight {
            if w.len() != rows.len() {
                return Err(BufferError::Precondition(format!(
                    "{} weights for {} rows",
                    w.len(),
                    rows.len()
                )));
            }
        }
        for &id in ids {
            self.check_segment(id)?;
        }
        let stored = rows
            .iter()
            .map(|row| prepare_row(row, &self.config))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(stored.len());
        for (j, (row, &id)) in stored.iter().zip(ids.iter()).enumerate() {
            out.push(self.append_row(id, row, weight.map(|w| w[j]))?);
        }
        Ok(out)
    }

    /// Copies the rows at `ix` of another buffer's storage to segment `seg`.
    pub(crate) fn append_from(&mut self, seg: usize, meta: &Batch, ix: &[usize]) -> Result<Vec<usize>> {
        let mut out = Vec::with_capacity(ix.len());
        for &i in ix {
            let stored = StoredRow::from_stored(meta.get_item(i)?, &self.config)?;
            out.push(self.append_row(seg, &stored, None)?.ptr);
        }
        Ok(out)
    }

    pub(crate) fn reset(&mut self, keep_statistics: bool) -> Result<()> {
        for seg in 0..self.cursors.len() {
            self.reset_segment(seg, keep_statistics)?;
        }
        Ok(())
    }

    /// Clears the cursor of one segment. Rows stay in place but are no
    /// longer valid.
    pub(crate) fn reset_segment(&mut self, seg: usize, keep_statistics: bool) -> Result<()> {
        self.check_segment(seg)?;
        let cursor = &mut self.cursors[seg];
        cursor.reset(keep_statistics);
        let (start, end) = (cursor.offset, cursor.offset + cursor.maxsize);
        if let Some(per) = self.per.as_mut() {
            per.clear(start, end)?;
        }
        Ok(())
    }

    pub(crate) fn set_batch(&mut self, batch: Batch) -> Result<()> {
        let n = batch.len()?;
        if n != self.maxsize {
            return value_err(format!(
                "record of length {} does not fit a buffer of size {}",
                n, self.maxsize
            ));
        }
        self.meta = batch;
        Ok(())
    }

    fn per_mut(&mut self) -> Result<&mut PerState> {
        self.per
            .as_mut()
            .ok_or_else(|| BufferError::NotSupported("the buffer is not prioritized".to_string()))
    }

    pub(crate) fn update_weight(&mut self, ix: &[usize], new_weight: &[f64]) -> Result<()> {
        self.per_mut()?.update_weight(ix, new_weight)
    }

    pub(crate) fn set_beta(&mut self, beta: f64) -> Result<()> {
        self.per_mut()?.beta = beta;
        Ok(())
    }

    pub(crate) fn weight(&self, ix: &[usize]) -> Result<Vec<f64>> {
        match &self.per {
            Some(per) => per.tree.get_many(ix),
            None => Err(BufferError::NotSupported(
                "the buffer is not prioritized".to_string(),
            )),
        }
    }

    /// The persisted form, tagged with `class`.
    pub(crate) fn to_group(&self, class: &str) -> Result<Group> {
        let mut root = persist::batch_to_group(&self.meta)?;
        root.set_attr(CLASS_ATTR, Attr::Str(class.to_string()));
        root.set_attr("maxsize", Attr::Int(self.maxsize as i64));
        root.set_attr("stack_num", Attr::Int(self.config.stack_num as i64));
        root.set_attr(
            "_index",
            Attr::Ints(self.cursors.iter().map(|c| c.index as i64).collect()),
        );
        root.set_attr(
            "_size",
            Attr::Ints(self.cursors.iter().map(|c| c.size as i64).collect()),
        );
        root.set_attr("_config", Attr::Str(serde_yaml::to_string(&self.config)?));
        root.set_attr("_cursors", Attr::Str(serde_yaml::to_string(&self.cursors)?));
        if let Some(per) = &self.per {
            root.set_attr("_weight", Attr::Floats(per.tree.leaves().to_vec()));
            root.set_attr("_alpha", Attr::Float(per.alpha));
            root.set_attr("_beta", Attr::Float(per.beta));
            root.set_attr("_eps", Attr::Float(per.eps));
            root.set_attr("_max_prio", Attr::Float(per.max_prio));
        }
        Ok(root)
    }

    pub(crate) fn from_group(root: &Group) -> Result<Self> {
        let config: ReplayBufferConfig = serde_yaml::from_str(root.attr_str("_config")?)?;
        let cursors: Vec<Cursor> = serde_yaml::from_str(root.attr_str("_cursors")?)?;
        let sizes: Vec<usize> = cursors.iter().map(Cursor::maxsize).collect();
        let mut store = Store::new(config, &sizes)?;
        store.cursors = cursors;
        store.meta = persist::group_to_batch(root)?;

        if let Some(per) = store.per.as_mut() {
            let leaves = root.attr_floats("_weight")?;
            let ix: Vec<usize> = (0..leaves.len()).collect();
            per.set_leaves(&ix, leaves)?;
            per.alpha = root.attr_float("_alpha")?;
            per.beta = root.attr_float("_beta")?;
            per.eps = root.attr_float("_eps")?;
            per.max_prio = root.attr_float("_max_prio")?;
        }
        Ok(store)
    }
}
