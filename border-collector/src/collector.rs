//! Collectors filling replay buffers from vectorized environments.
//!
//! Every iteration of a collection loop computes actions for the ready
//! environments, steps them and adds one transition per returned
//! environment to the buffer, under the environment's id. Environments that
//! finish an episode are reset right away.
//!
//! - [`Collector`] steps every ready environment each iteration and needs a
//!   synchronous [`VectorEnv`](crate::VectorEnv)
//! - [`AsyncCollector`] only advances the environments that returned a
//!   result, so it works with environments that return out of order
mod async_collector;
mod base;
use crate::error::CollectorError;
use anyhow::Result;
pub use async_collector::AsyncCollector;
pub use base::Collector;
use border_buffer::{Batch, BufferError, Value};
use ndarray::ArrayD;

/// Converts the return of an episode, a scalar or a vector for
/// multi-reward environments, to a scalar.
pub type RewardMetric = Box<dyn Fn(&ArrayD<f64>) -> Result<f64>>;

/// Accepts single-component returns.
pub fn default_reward_metric(rew: &ArrayD<f64>) -> Result<f64> {
    match rew.len() {
        1 => Ok(rew.iter().sum()),
        n => Err(BufferError::Value(format!(
            "an episode return with {} components needs a reward metric",
            n
        ))
        .into()),
    }
}

/// Collection quota of one call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Quota {
    Steps(usize),
    Episodes(usize),
}

impl Quota {
    pub(crate) fn new(n_step: Option<usize>, n_episode: Option<usize>) -> Result<Self> {
        match (n_step, n_episode) {
            (Some(n), None) if n > 0 => Ok(Quota::Steps(n)),
            (None, Some(n)) if n > 0 => Ok(Quota::Episodes(n)),
            (Some(_), Some(_)) | (None, None) => Err(CollectorError::Precondition(format!(
                "exactly one of n_step and n_episode must be given, got n_step={:?}, n_episode={:?}",
                n_step, n_episode
            ))
            .into()),
            _ => Err(CollectorError::Precondition(
                "n_step and n_episode must be positive".to_string(),
            )
            .into()),
        }
    }

    pub(crate) fn reached(&self, steps: usize, episodes: usize) -> bool {
        match self {
            Quota::Steps(n) => steps >= *n,
            Quota::Episodes(n) => episodes >= *n,
        }
    }
}

/// Actions for the ready environments.
pub(crate) struct Action {
    /// Actions as stored in the buffer.
    pub(crate) act: Value,

    /// Actions sent to the environments.
    pub(crate) act_env: Value,

    /// Per-step policy data.
    pub(crate) policy: Option<Batch>,

    /// Next hidden state.
    pub(crate) state: Option<Value>,
}

/// Completed episodes of one call.
#[derive(Default)]
pub(crate) struct Episodes {
    pub(crate) returns: Vec<f64>,
    pub(crate) lens: Vec<usize>,
    pub(crate) count: usize,
}

pub(crate) fn stack_rows<'a>(rows: impl IntoIterator<Item = &'a Value>) -> Result<Value> {
    let rows: Vec<&Value> = rows.into_iter().collect();
    Ok(Value::stack(&rows, 0)?)
}

/// A zero row shaped like `row`.
pub(crate) fn zeroed(row: &Value) -> Result<Value> {
    Ok(Value::alloc_rows(row, 1)?.row(0)?)
}

/// Stacks hidden states; missing ones are zero.
pub(crate) fn stack_states(states: &[Option<&Value>]) -> Result<Option<Value>> {
    let template = match states.iter().flatten().next() {
        Some(s) => zeroed(s)?,
        None => return Ok(None),
    };
    let rows: Vec<&Value> = states.iter().map(|s| s.unwrap_or(&template)).collect();
    Ok(Some(Value::stack(&rows, 0)?))
}

/// The record added to the buffer for one iteration.
pub(crate) fn transition_batch(
    obs: Value,
    act: Value,
    policy: Option<Batch>,
    step: &crate::env::VecStep,
) -> Batch {
    let mut batch = Batch::new();
    batch.insert("obs", obs);
    batch.insert("act", act);
    batch.insert("rew", step.rew.clone());
    batch.insert("terminated", step.terminated.clone());
    batch.insert("truncated", step.truncated.clone());
    batch.insert("done", step.done());
    batch.insert("obs_next", step.obs_next.clone());
    batch.insert("info", step.info.clone());
    if let Some(policy) = policy {
        batch.insert("policy", policy);
    }
    batch
}
