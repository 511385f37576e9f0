//! Environments.
//!
//! [`Env`] is a single environment instance. [`VectorEnv`] runs several
//! instances side by side and is what the collectors drive. Two
//! implementations are provided:
//!
//! - [`DummyVectorEnv`] steps its instances one after another on the calling
//!   thread
//! - [`ThreadedVectorEnv`] runs each instance in a worker thread; when asked
//!   to wait for fewer results than it has instances, it returns whichever
//!   instances finished first
mod dummy_vec;
mod threaded;
use crate::{error::CollectorError, space::Space};
use anyhow::Result;
use border_buffer::{Batch, Value};
pub use dummy_vec::DummyVectorEnv;
pub use threaded::ThreadedVectorEnv;

/// Outcome of one step of a single environment.
#[derive(Clone, Debug)]
pub struct Step {
    /// Observation after the step.
    pub obs: Value,

    /// Reward, a scalar or a vector for multi-reward environments.
    pub rew: Value,

    /// The episode reached a terminal state.
    pub terminated: bool,

    /// The episode was cut short, e.g. by a time limit.
    pub truncated: bool,

    /// Additional information.
    pub info: Batch,
}

/// Represents an environment, typically an MDP.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Set of valid actions.
    fn action_space(&self) -> Space;

    /// Starts a new episode and returns its first observation and info.
    fn reset(&mut self) -> Result<(Value, Batch)>;

    /// Performs an environment step.
    fn step(&mut self, act: &Value) -> Result<Step>;
}

/// Outcome of one step of a [`VectorEnv`], one row per environment that
/// produced a result.
#[derive(Clone, Debug)]
pub struct VecStep {
    /// Ids of the environments the rows belong to, in ascending order.
    pub env_ids: Vec<usize>,

    /// Observations after the step.
    pub obs_next: Value,

    /// Rewards.
    pub rew: Value,

    /// Termination flags.
    pub terminated: Vec<bool>,

    /// Truncation flags.
    pub truncated: Vec<bool>,

    /// Information; every row carries its `env_id`.
    pub info: Batch,
}

impl VecStep {
    /// Stacks the steps of single environments.
    pub(crate) fn from_steps(steps: Vec<(usize, Step)>) -> Result<Self> {
        let env_ids: Vec<usize> = steps.iter().map(|(id, _)| *id).collect();
        let obs: Vec<&Value> = steps.iter().map(|(_, s)| &s.obs).collect();
        let rew: Vec<&Value> = steps.iter().map(|(_, s)| &s.rew).collect();
        let info: Vec<Batch> = steps
            .iter()
            .map(|(id, s)| with_env_id(s.info.clone(), *id))
            .collect();
        Ok(Self {
            obs_next: Value::stack(&obs, 0)?,
            rew: Value::stack(&rew, 0)?,
            terminated: steps.iter().map(|(_, s)| s.terminated).collect(),
            truncated: steps.iter().map(|(_, s)| s.truncated).collect(),
            info: Batch::stack(&info)?,
            env_ids,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.env_ids.len()
    }

    /// Returns `true` if no environment produced a result.
    pub fn is_empty(&self) -> bool {
        self.env_ids.is_empty()
    }

    /// `terminated | truncated` per row.
    pub fn done(&self) -> Vec<bool> {
        self.terminated
            .iter()
            .zip(self.truncated.iter())
            .map(|(&t, &u)| t || u)
            .collect()
    }
}

/// Several environment instances addressed by id.
pub trait VectorEnv {
    /// Number of environment instances.
    fn len(&self) -> usize;

    /// Returns `true` if there is no environment instance.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if [`VectorEnv::step`] may return results for a subset
    /// of the stepped environments, or for environments stepped earlier.
    fn is_async(&self) -> bool;

    /// Action space of environment `id`.
    fn action_space(&self, id: usize) -> Result<&Space>;

    /// Resets the given environments, all of them if `ids` is `None`.
    ///
    /// Returns their first observations and infos stacked in the order of
    /// `ids`.
    fn reset(&mut self, ids: Option<&[usize]>) -> Result<(Value, Batch)>;

    /// Steps environments `ids` with the rows of `act`.
    fn step(&mut self, act: &Value, ids: &[usize]) -> Result<VecStep>;
}

pub(crate) fn with_env_id(mut info: Batch, id: usize) -> Batch {
    info.insert("env_id", id);
    info
}

/// Checks that `ids` are distinct ids of `n` environments.
pub(crate) fn check_ids(ids: &[usize], n: usize) -> Result<()> {
    for (k, &id) in ids.iter().enumerate() {
        if id >= n {
            return Err(CollectorError::Precondition(format!(
                "environment id {} is out of range for {} environments",
                id, n
            ))
            .into());
        }
        if ids[..k].contains(&id) {
            return Err(
                CollectorError::Precondition(format!("environment id {} is repeated", id)).into(),
            );
        }
    }
    Ok(())
}

/// Checks that `act` has one row per id.
pub(crate) fn check_actions(act: &Value, ids: &[usize]) -> Result<()> {
    match act.len() {
        Some(n) if n == ids.len() => Ok(()),
        n => Err(CollectorError::Precondition(format!(
            "{:?} actions for {} environments",
            n,
            ids.len()
        ))
        .into()),
    }
}

pub(crate) fn all_ids(ids: Option<&[usize]>, n: usize) -> Vec<usize> {
    match ids {
        Some(ids) => ids.to_vec(),
        None => (0..n).collect(),
    }
}
