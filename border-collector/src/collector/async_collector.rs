//! Asynchronous collector.
use super::{stack_rows, Collector, Episodes, Quota};
use crate::{
    config::CollectorConfig, error::CollectorError, policy::Policy, stats::CollectStats,
    VectorEnv,
};
use anyhow::Result;
use border_buffer::{Batch, ReplayBufferBase, Value};
use log::warn;
use ndarray::ArrayD;
use std::time::Instant;

/// Collects from environments that may return out of order.
///
/// Each iteration computes actions for the environments that returned in
/// the previous iteration and steps them; the environments that return
/// from this step are the ones whose transitions are stored, completed and
/// reset. The action and policy data of an environment are kept until its
/// result arrives, so every stored transition pairs an observation with the
/// action taken on it.
///
/// Since several environments may return at once, a call can collect more
/// steps or episodes than requested.
pub struct AsyncCollector<P, V, B> {
    inner: Collector<P, V, B>,
    ready: Vec<usize>,
    act: Vec<Option<Value>>,
    policy: Vec<Option<Batch>>,
}

impl<P, V, B> AsyncCollector<P, V, B>
where
    P: Policy,
    V: VectorEnv,
    B: ReplayBufferBase,
{
    /// Builds a collector and resets the environments.
    pub fn new(policy: P, env: V, buffer: B, config: CollectorConfig) -> Result<Self> {
        warn!("Asynchronous collection may store more transitions than requested");
        let inner = Collector::new(policy, env, buffer, config)?;
        let n = inner.env.len();
        Ok(Self {
            inner,
            ready: (0..n).collect(),
            act: vec![None; n],
            policy: vec![None; n],
        })
    }

    /// Replaces the conversion of episode returns to scalars.
    pub fn with_reward_metric(
        mut self,
        reward_metric: impl Fn(&ArrayD<f64>) -> Result<f64> + 'static,
    ) -> Self {
        self.inner = self.inner.with_reward_metric(reward_metric);
        self
    }

    /// Resets the environments, and optionally the buffer and the counters.
    pub fn reset(&mut self, reset_buffer: bool, reset_stats: bool) -> Result<()> {
        self.reset_env()?;
        if reset_buffer {
            self.reset_buffer(false)?;
        }
        if reset_stats {
            self.reset_stat();
        }
        Ok(())
    }

    /// Resets all environments, dropping the results still in flight.
    pub fn reset_env(&mut self) -> Result<()> {
        self.inner.reset_env()?;
        let n = self.inner.env.len();
        self.ready = (0..n).collect();
        self.act = vec![None; n];
        self.policy = vec![None; n];
        Ok(())
    }

    /// Resets the counters.
    pub fn reset_stat(&mut self) {
        self.inner.reset_stat();
    }

    /// Resets the buffer.
    pub fn reset_buffer(&mut self, keep_statistics: bool) -> Result<()> {
        self.inner.reset_buffer(keep_statistics)
    }

    /// Collects at least `n_step` steps or at least `n_episode` episodes;
    /// exactly one of them must be given.
    ///
    /// Trajectories continue across calls in both modes.
    pub fn collect(
        &mut self,
        n_step: Option<usize>,
        n_episode: Option<usize>,
        random: bool,
    ) -> Result<CollectStats> {
        let quota = Quota::new(n_step, n_episode)?;
        let start = Instant::now();
        let mut step_count = 0;
        let mut episodes = Episodes::default();
        loop {
            let ready = self.ready.clone();
            let action = self.inner.compute_action(random, &ready)?;
            self.inner.store_states(&action, &ready)?;
            for (j, &id) in ready.iter().enumerate() {
                self.act[id] = Some(action.act.row(j)?);
                self.policy[id] = match &action.policy {
                    Some(p) => Some(p.get_item(j)?),
                    None => None,
                };
            }

            let step = self.inner.env.step(&action.act_env, &ready)?;
            let ids = step.env_ids.clone();
            let obs = stack_rows(ids.iter().map(|&id| &self.inner.obs[id]))?;
            let mut acts = Vec::with_capacity(ids.len());
            for &id in ids.iter() {
                match &self.act[id] {
                    Some(a) => acts.push(a),
                    None => {
                        return Err(CollectorError::AsyncEnv(format!(
                            "environment {} returned without being stepped",
                            id
                        ))
                        .into())
                    }
                }
            }
            let act = stack_rows(acts)?;
            let policy = self.pending_policy(&ids)?;
            let batch = super::transition_batch(obs, act, policy, &step);
            let outs = self.inner.buffer.add(&batch, Some(&ids[..]))?;
            step_count += ids.len();
            self.inner.advance(step, &outs, &mut episodes)?;
            for &id in ids.iter() {
                self.act[id] = None;
                self.policy[id] = None;
            }
            self.ready = ids;

            if quota.reached(step_count, episodes.count) {
                break;
            }
        }
        Ok(self.inner.finish(start, step_count, episodes))
    }

    /// Policy data of the returned environments, if every one of them has
    /// some.
    fn pending_policy(&self, ids: &[usize]) -> Result<Option<Batch>> {
        let rows: Option<Vec<Batch>> = ids.iter().map(|&id| self.policy[id].clone()).collect();
        match rows {
            Some(rows) => Ok(Some(Batch::stack(&rows)?)),
            None => Ok(None),
        }
    }

    /// Ids of the environments the next iteration will step.
    pub fn ready_ids(&self) -> &[usize] {
        &self.ready
    }

    /// Total number of collected steps.
    pub fn collect_step(&self) -> usize {
        self.inner.collect_step()
    }

    /// Total number of completed episodes.
    pub fn collect_episode(&self) -> usize {
        self.inner.collect_episode()
    }

    /// Total collection time in seconds.
    pub fn collect_time(&self) -> f64 {
        self.inner.collect_time()
    }

    /// The buffer.
    pub fn buffer(&self) -> &B {
        self.inner.buffer()
    }

    /// The buffer, mutably.
    pub fn buffer_mut(&mut self) -> &mut B {
        self.inner.buffer_mut()
    }

    /// The policy.
    pub fn policy(&self) -> &P {
        self.inner.policy()
    }

    /// The environments.
    pub fn env(&self) -> &V {
        self.inner.env()
    }

    /// Takes the buffer out of the collector.
    pub fn into_buffer(self) -> B {
        self.inner.into_buffer()
    }
}
