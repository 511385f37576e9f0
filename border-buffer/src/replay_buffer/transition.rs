//! Single transitions and their stored form.
use super::config::ReplayBufferConfig;
use crate::{
    batch::{Batch, Value},
    error::{value_err, Result},
};
use ndarray::ArrayD;

/// Keys a buffer stores; other keys of incoming records are dropped.
pub const RESERVED_KEYS: [&str; 9] = [
    "obs",
    "act",
    "rew",
    "terminated",
    "truncated",
    "done",
    "obs_next",
    "info",
    "policy",
];

/// Builder of the single-row record accepted by buffers.
///
/// # Examples
///
/// ```rust
/// use border_buffer::{Batch, Transition};
///
/// let row: Batch = Transition::new(vec![0.0, 1.0], 1, 0.5)
///     .terminated(true)
///     .obs_next(vec![1.0, 2.0])
///     .into();
/// assert!(row.done().unwrap().item().unwrap() > 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct Transition {
    batch: Batch,
    terminated: bool,
    truncated: bool,
    done: Option<bool>,
}

impl Transition {
    /// A non-terminal transition.
    pub fn new(obs: impl Into<Value>, act: impl Into<Value>, rew: impl Into<Value>) -> Self {
        let mut batch = Batch::new();
        batch.insert("obs", obs);
        batch.insert("act", act);
        batch.insert("rew", rew);
        Self {
            batch,
            terminated: false,
            truncated: false,
            done: None,
        }
    }

    /// Sets the termination flag.
    pub fn terminated(mut self, v: bool) -> Self {
        self.terminated = v;
        self
    }

    /// Sets the truncation flag.
    pub fn truncated(mut self, v: bool) -> Self {
        self.truncated = v;
        self
    }

    /// Sets the episode-end flag directly, overriding `terminated | truncated`.
    pub fn done(mut self, v: bool) -> Self {
        self.done = Some(v);
        self
    }

    /// Sets the next observation.
    pub fn obs_next(mut self, v: impl Into<Value>) -> Self {
        self.batch.insert("obs_next", v);
        self
    }

    /// Sets the `info` sub-record.
    pub fn info(mut self, v: Batch) -> Self {
        self.batch.insert("info", v);
        self
    }

    /// Sets the `policy` sub-record.
    pub fn policy(mut self, v: Batch) -> Self {
        self.batch.insert("policy", v);
        self
    }
}

impl From<Transition> for Batch {
    fn from(t: Transition) -> Self {
        let mut b = t.batch;
        let done = t.done.unwrap_or(t.terminated || t.truncated);
        b.insert("done", done);
        b.insert("terminated", t.terminated || (done && !t.truncated));
        b.insert("truncated", t.truncated);
        b
    }
}

/// A row in the form it is written to storage.
pub(crate) struct StoredRow {
    pub(crate) row: Batch,
    pub(crate) rew: ArrayD<f64>,
    pub(crate) done: bool,
}

impl StoredRow {
    /// A row read back from another buffer's storage, which is already in
    /// stored form apart from `obs_next`.
    pub(crate) fn from_stored(mut row: Batch, config: &ReplayBufferConfig) -> Result<Self> {
        if config.ignore_obs_next {
            row.remove("obs_next");
        }
        let rew = match row.rew() {
            Some(v) => v.to_f64()?,
            None => return value_err("stored row has no 'rew'"),
        };
        let done = flag(&row, "done")?.unwrap_or(false);
        Ok(Self { row, rew, done })
    }
}

fn flag(row: &Batch, key: &str) -> Result<Option<bool>> {
    match row.get(key) {
        None => Ok(None),
        Some(v) => Ok(Some(v.to_bool()?.iter().any(|&b| b))),
    }
}

fn last_frame(v: &Value) -> Result<Value> {
    match v.len() {
        Some(n) if n > 0 => v.row(n - 1),
        _ => value_err("cannot take the last frame of an observation without frames"),
    }
}

/// Reduces an incoming row to the stored keys and the buffer's storage
/// options.
///
/// `done` is derived from `terminated | truncated` when missing. A missing
/// `truncated` is `false` and a missing `terminated` is `done && !truncated`.
/// Rewards are stored as floats and tensors as arrays.
pub(crate) fn prepare_row(row: &Batch, config: &ReplayBufferConfig) -> Result<StoredRow> {
    let mut out: Batch = row
        .iter()
        .filter(|(k, _)| RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    out.to_array()?;
    for key in ["obs", "act", "rew"].iter() {
        if !out.contains_key(key) {
            return value_err(format!("transition has no '{}'", key));
        }
    }

    let terminated = flag(&out, "terminated")?;
    let truncated = flag(&out, "truncated")?;
    let done = match (flag(&out, "done")?, terminated, truncated) {
        (Some(d), _, _) => d,
        (None, None, None) => return value_err("transition has no 'done' flag"),
        (None, t, u) => t.unwrap_or(false) || u.unwrap_or(false),
    };
    out.insert("done", done);
    let truncated = truncated.unwrap_or(false);
    out.insert("terminated", terminated.unwrap_or(done && !truncated));
    out.insert("truncated", truncated);

    let rew = match out.rew() {
        Some(v) => v.to_f64()?,
        None => return value_err("transition has no 'rew'"),
    };
    out.insert("rew", rew.clone());

    if config.save_only_last_obs {
        if let Some(obs) = out.obs() {
            let v = last_frame(obs)?;
            out.insert("obs", v);
        }
    }
    if config.ignore_obs_next {
        out.remove("obs_next");
    } else if config.save_only_last_obs {
        if let Some(obs_next) = out.obs_next() {
            let v = last_frame(obs_next)?;
            out.insert("obs_next", v);
        }
    }

    Ok(StoredRow {
        row: out,
        rew,
        done,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch;

    #[test]
    fn done_is_derived_from_flags() -> Result<()> {
        let config = ReplayBufferConfig::default();
        let row = batch! {
            "obs" => 0, "act" => 0, "rew" => 1,
            "truncated" => true, "extra" => 3.0,
        };
        let stored = prepare_row(&row, &config)?;
        assert!(stored.done);
        assert!(!stored.row.contains_key("extra"));
        assert_eq!(stored.row.get("terminated").unwrap(), &Value::from(false));
        assert_eq!(stored.row.rew().unwrap(), &Value::from(1.0));

        assert!(prepare_row(&batch! { "obs" => 0, "act" => 0, "rew" => 1 }, &config).is_err());
        Ok(())
    }

    #[test]
    fn storage_options_apply() -> Result<()> {
        let config = ReplayBufferConfig::default()
            .save_only_last_obs(true)
            .ignore_obs_next(true);
        let row = batch! {
            "obs" => vec![1, 2, 3], "act" => 0, "rew" => 0.0,
            "done" => false, "obs_next" => vec![2, 3, 4],
        };
        let stored = prepare_row(&row, &config)?;
        assert_eq!(stored.row.obs().unwrap(), &Value::from(3));
        assert!(stored.row.obs_next().is_none());
        Ok(())
    }

    #[test]
    fn transition_builder_sets_flags() {
        let b: Batch = Transition::new(1, 0, 0.0).truncated(true).into();
        assert_eq!(b.done().unwrap(), &Value::from(true));
        assert_eq!(b.get("terminated").unwrap(), &Value::from(false));

        let b: Batch = Transition::new(1, 0, 0.0).done(true).into();
        assert_eq!(b.get("terminated").unwrap(), &Value::from(true));
    }
}
