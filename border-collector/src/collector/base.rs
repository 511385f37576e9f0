//! Synchronous collector.
use super::{
    default_reward_metric, stack_rows, stack_states, transition_batch, zeroed, Action, Episodes,
    Quota, RewardMetric,
};
use crate::{
    config::CollectorConfig, env::VecStep, error::CollectorError, policy::Policy,
    stats::CollectStats, VectorEnv,
};
use anyhow::Result;
use border_buffer::{batch, AddOutcome, Batch, BufferKind, ReplayBufferBase, Value};
use log::{debug, info, warn};
use ndarray::ArrayD;
use rand::{rngs::StdRng, SeedableRng};
use std::time::Instant;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Collects an exact number of steps or episodes.
///
/// In every iteration of [`Collector::collect()`], objects interact as shown
/// below:
///
/// ```mermaid
/// graph LR
///     A[Policy]-->|act|B[VectorEnv]
///     B -->|VecStep|C[Collector]
///     C -->|obs, info, state|A
///     C -->|"Batch, buffer ids"|D[ReplayBufferBase]
///     D -->|AddOutcome|C
/// ```
///
/// Transitions of environment `i` are added to the buffer with buffer id
/// `i`, so a buffer used with `E` environments must have at least `E`
/// children (or caches); a plain buffer only works with a single
/// environment.
///
/// The last observation, info and hidden state of every environment are
/// kept between calls, so that a call with `n_step` continues the
/// trajectories of the previous call.
pub struct Collector<P, V, B> {
    pub(crate) policy: P,
    pub(crate) env: V,
    pub(crate) buffer: B,
    pub(crate) config: CollectorConfig,
    pub(crate) rng: StdRng,
    pub(crate) obs: Vec<Value>,
    pub(crate) info: Vec<Batch>,
    pub(crate) state: Vec<Option<Value>>,
    reward_metric: RewardMetric,
    collect_step: usize,
    collect_episode: usize,
    collect_time: f64,
}

impl<P, V, B> Collector<P, V, B>
where
    P: Policy,
    V: VectorEnv,
    B: ReplayBufferBase,
{
    /// Builds a collector and resets the environments.
    ///
    /// The buffer is not reset.
    pub fn new(policy: P, env: V, buffer: B, config: CollectorConfig) -> Result<Self> {
        let env_num = env.len();
        if env_num == 0 {
            return Err(
                CollectorError::Precondition("no environment to collect from".to_string()).into(),
            );
        }
        check_buffer(&buffer, env_num)?;
        let mut collector = Self {
            policy,
            env,
            buffer,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            obs: vec![],
            info: vec![],
            state: vec![],
            reward_metric: Box::new(default_reward_metric),
            collect_step: 0,
            collect_episode: 0,
            collect_time: 0.0,
        };
        collector.reset_env()?;
        info!(
            "Build collector for {} environments with a {} of size {}",
            env_num,
            collector.buffer.kind().name(),
            collector.buffer.maxsize()
        );
        Ok(collector)
    }

    /// Replaces the conversion of episode returns to scalars.
    pub fn with_reward_metric(
        mut self,
        reward_metric: impl Fn(&ArrayD<f64>) -> Result<f64> + 'static,
    ) -> Self {
        self.reward_metric = Box::new(reward_metric);
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

    /// Resets all environments and forgets the hidden states.
    pub fn reset_env(&mut self) -> Result<()> {
        let n = self.env.len();
        let (obs, info) = self.env.reset(None)?;
        self.obs = (0..n).map(|i| obs.row(i)).collect::<border_buffer::Result<_>>()?;
        self.info = (0..n)
            .map(|i| info.get_item(i))
            .collect::<border_buffer::Result<_>>()?;
        self.state = vec![None; n];
        Ok(())
    }

    /// Resets the counters.
    pub fn reset_stat(&mut self) {
        self.collect_step = 0;
        self.collect_episode = 0;
        self.collect_time = 0.0;
    }

    /// Resets the buffer.
    pub fn reset_buffer(&mut self, keep_statistics: bool) -> Result<()> {
        Ok(self.buffer.reset(keep_statistics)?)
    }

    /// Collects `n_step` steps or `n_episode` episodes; exactly one of them
    /// must be given.
    ///
    /// With `n_step`, every environment steps in every iteration until at
    /// least `n_step` transitions are collected; the count is exact when
    /// `n_step` is a multiple of the number of environments.
    ///
    /// With `n_episode`, at most `n_episode` environments take part. An
    /// environment that finishes an episode leaves the loop once the other
    /// ones are enough to complete the remaining episodes, so every
    /// participating environment contributes at least one episode and
    /// exactly `n_episode` episodes are collected. The environments are
    /// reset at the end of the call.
    ///
    /// With `random`, actions are sampled from the action spaces instead
    /// of the policy.
    pub fn collect(
        &mut self,
        n_step: Option<usize>,
        n_episode: Option<usize>,
        random: bool,
    ) -> Result<CollectStats> {
        if self.env.is_async() {
            return Err(CollectorError::AsyncEnv(
                "use AsyncCollector to collect from asynchronous environments".to_string(),
            )
            .into());
        }
        let env_num = self.env.len();
        let quota = Quota::new(n_step, n_episode)?;
        let mut ready: Vec<usize> = match quota {
            Quota::Steps(n) => {
                if n % env_num != 0 {
                    warn!(
                        "n_step={} is not a multiple of the number of environments ({}), \
                         extra transitions will be collected",
                        n, env_num
                    );
                }
                (0..env_num).collect()
            }
            Quota::Episodes(n) => {
                if env_num > n {
                    return Err(CollectorError::Precondition(format!(
                        "n_episode={} is smaller than the number of environments ({}), \
                         some of them could not complete an episode",
                        n, env_num
                    ))
                    .into());
                }
                (0..env_num).collect()
            }
        };

        let start = Instant::now();
        let mut step_count = 0;
        let mut episodes = Episodes::default();
        loop {
            let action = self.compute_action(random, &ready)?;
            self.store_states(&action, &ready)?;
            let step = self.env.step(&action.act_env, &ready)?;
            if step.env_ids != ready {
                return Err(CollectorError::AsyncEnv(format!(
                    "stepped environments {:?} but got results for {:?}",
                    ready, step.env_ids
                ))
                .into());
            }
            let obs = stack_rows(ready.iter().map(|&id| &self.obs[id]))?;
            let batch = transition_batch(obs, action.act, action.policy, &step);
            let outs = self.buffer.add(&batch, Some(&ready[..]))?;
            step_count += ready.len();
            let done_ids = self.advance(step, &outs, &mut episodes)?;

            if let Quota::Episodes(n) = quota {
                let remaining = n.saturating_sub(episodes.count);
                let surplus = ready.len().saturating_sub(remaining);
                if surplus > 0 && !done_ids.is_empty() {
                    let idle: Vec<usize> = done_ids.into_iter().take(surplus).collect();
                    debug!("Environments {:?} leave the collection", idle);
                    ready.retain(|id| !idle.contains(id));
                }
            }
            if quota.reached(step_count, episodes.count) {
                break;
            }
        }

        if let Quota::Episodes(_) = quota {
            self.reset_env()?;
        }
        Ok(self.finish(start, step_count, episodes))
    }

    /// Actions for the environments `ready`.
    pub(crate) fn compute_action(&mut self, random: bool, ready: &[usize]) -> Result<Action> {
        if random {
            let mut rows = Vec::with_capacity(ready.len());
            for &id in ready.iter() {
                rows.push(self.env.action_space(id)?.sample(&mut self.rng));
            }
            let act_env = stack_rows(rows.iter())?;
            let act = self.policy.map_action_inverse(&act_env)?;
            return Ok(Action {
                act,
                act_env,
                policy: None,
                state: None,
            });
        }

        let obs = stack_rows(ready.iter().map(|&id| &self.obs[id]))?;
        let info: Vec<Batch> = ready.iter().map(|&id| self.info[id].clone()).collect();
        let batch = batch! { "obs" => obs, "info" => Batch::stack(&info)? };
        let states: Vec<Option<&Value>> =
            ready.iter().map(|&id| self.state[id].as_ref()).collect();
        let state_in = stack_states(&states)?;
        let out = self.policy.forward(&batch, state_in.as_ref())?;

        let mut act = match out.act() {
            Some(act) => act.clone(),
            None => {
                return Err(
                    CollectorError::Precondition("policy output has no 'act'".to_string()).into(),
                )
            }
        };
        if self.config.exploration_noise {
            act = self.policy.exploration_noise(act, &batch)?;
        }
        let act_env = self.policy.map_action(&act)?;
        let mut policy = out.policy().filter(|p| !p.is_empty()).cloned();
        let state = out.get("state").cloned();
        if let Some(s) = &state {
            policy
                .get_or_insert_with(Batch::new)
                .insert("hidden_state", s.clone());
        }
        Ok(Action {
            act,
            act_env,
            policy,
            state,
        })
    }

    /// Keeps the hidden states computed for `ready`.
    pub(crate) fn store_states(&mut self, action: &Action, ready: &[usize]) -> Result<()> {
        for (j, &id) in ready.iter().enumerate() {
            self.state[id] = match &action.state {
                Some(s) => Some(s.row(j)?),
                None => None,
            };
        }
        Ok(())
    }

    /// Moves the returned environments to their next observation and
    /// resets those that finished an episode.
    ///
    /// Returns the ids of the finished environments, in row order.
    pub(crate) fn advance(
        &mut self,
        step: VecStep,
        outs: &[AddOutcome],
        episodes: &mut Episodes,
    ) -> Result<Vec<usize>> {
        let done = step.done();
        let mut done_ids = vec![];
        for (j, &id) in step.env_ids.iter().enumerate() {
            self.obs[id] = step.obs_next.row(j)?;
            self.info[id] = step.info.get_item(j)?;
            if done[j] {
                episodes.lens.push(outs[j].ep_len);
                episodes.returns.push((self.reward_metric)(&outs[j].ep_rew)?);
                episodes.count += 1;
                done_ids.push(id);
            }
        }
        if !done_ids.is_empty() {
            debug!("Reset environments {:?}", done_ids);
            let (obs, info) = self.env.reset(Some(&done_ids[..]))?;
            for (k, &id) in done_ids.iter().enumerate() {
                self.obs[id] = obs.row(k)?;
                self.info[id] = info.get_item(k)?;
                let state = match &self.state[id] {
                    Some(s) => Some(zeroed(s)?),
                    None => None,
                };
                self.state[id] = state;
            }
        }
        Ok(done_ids)
    }

    /// Updates the counters and logs the statistics of a call.
    pub(crate) fn finish(
        &mut self,
        start: Instant,
        steps: usize,
        episodes: Episodes,
    ) -> CollectStats {
        let collect_time = start.elapsed().as_secs_f64().max(1e-9);
        self.collect_step += steps;
        self.collect_episode += episodes.count;
        self.collect_time += collect_time;
        let stats = CollectStats::new(
            steps,
            episodes.count,
            collect_time,
            episodes.returns,
            episodes.lens,
        );
        info!("Collect: {}", stats.to_record());
        stats
    }

    /// Total number of collected steps since the last [`Collector::reset_stat`].
    pub fn collect_step(&self) -> usize {
        self.collect_step
    }

    /// Total number of completed episodes.
    pub fn collect_episode(&self) -> usize {
        self.collect_episode
    }

    /// Total collection time in seconds.
    pub fn collect_time(&self) -> f64 {
        self.collect_time
    }

    /// The buffer.
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// The buffer, mutably, e.g. to update priorities.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// The policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The policy, mutably.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// The environments.
    pub fn env(&self) -> &V {
        &self.env
    }

    /// Takes the buffer out of the collector.
    pub fn into_buffer(self) -> B {
        self.buffer
    }
}

/// Checks that transitions of `env_num` environments fit the buffer.
fn check_buffer<B: ReplayBufferBase>(buffer: &B, env_num: usize) -> Result<()> {
    match buffer.kind() {
        BufferKind::ReplayBuffer | BufferKind::PrioritizedReplayBuffer => {
            if buffer.maxsize() == 0 {
                return Err(
                    CollectorError::Precondition("the buffer has no capacity".to_string()).into(),
                );
            }
            if env_num > 1 {
                return Err(CollectorError::Precondition(format!(
                    "a {} of size {} cannot hold transitions of {} environments, use \
                     ReplayBufferManager::vector({}, {}, ..) instead",
                    buffer.kind().name(),
                    buffer.maxsize(),
                    env_num,
                    buffer.maxsize(),
                    env_num
                ))
                .into());
            }
        }
        kind => {
            if buffer.buffer_num() < env_num {
                return Err(CollectorError::Precondition(format!(
                    "a {} with {} buffers cannot hold transitions of {} environments",
                    kind.name(),
                    buffer.buffer_num(),
                    env_num
                ))
                .into());
            }
        }
    }
    Ok(())
}
