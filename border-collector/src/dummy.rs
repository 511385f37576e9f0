//! This module is used for tests.
use crate::{
    env::{Env, Step},
    policy::Policy,
    space::Space,
};
use anyhow::Result;
use border_buffer::{batch, Batch, Value};
use serde::{Deserialize, Serialize};
use std::{thread, time::Duration};

/// Configuration of [`CountingEnv`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CountingEnvConfig {
    /// Number of steps of an episode.
    pub episode_len: usize,

    /// Sleep per step, in milliseconds.
    pub delay_ms: u64,
}

impl Default for CountingEnvConfig {
    fn default() -> Self {
        Self {
            episode_len: 10,
            delay_ms: 0,
        }
    }
}

impl CountingEnvConfig {
    /// Sets the episode length.
    pub fn episode_len(mut self, v: usize) -> Self {
        self.episode_len = v;
        self
    }

    /// Sets the sleep per step.
    pub fn delay_ms(mut self, v: u64) -> Self {
        self.delay_ms = v;
        self
    }
}

/// Environment whose observation is the number of steps since the last
/// reset.
///
/// Every step gives reward 1 and info `step`. The episode terminates after
/// `episode_len` steps whatever the action.
pub struct CountingEnv {
    config: CountingEnvConfig,
    index: usize,
}

impl CountingEnv {
    /// Steps since the last reset.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Env for CountingEnv {
    type Config = CountingEnvConfig;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            index: 0,
        })
    }

    fn action_space(&self) -> Space {
        Space::Discrete(2)
    }

    fn reset(&mut self) -> Result<(Value, Batch)> {
        self.index = 0;
        Ok((Value::from(0), batch! { "step" => 0 }))
    }

    fn step(&mut self, _act: &Value) -> Result<Step> {
        if self.config.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.delay_ms));
        }
        self.index += 1;
        Ok(Step {
            obs: Value::from(self.index),
            rew: Value::from(1.0),
            terminated: self.index >= self.config.episode_len,
            truncated: false,
            info: batch! { "step" => self.index },
        })
    }
}

/// Policy returning the same action for every observation.
///
/// With `with_state`, its hidden state counts the calls since the state was
/// last zeroed, and `policy.logp` is stored along with every action.
#[derive(Clone, Debug, Default)]
pub struct FixedPolicy {
    act: i64,
    with_state: bool,
}

impl FixedPolicy {
    /// A stateless policy.
    pub fn new(act: i64) -> Self {
        Self {
            act,
            with_state: false,
        }
    }

    /// A policy with a hidden state.
    pub fn with_state(act: i64) -> Self {
        Self {
            act,
            with_state: true,
        }
    }
}

impl Policy for FixedPolicy {
    fn forward(&mut self, batch: &Batch, state: Option<&Value>) -> Result<Batch> {
        let n = batch.len()?;
        let mut out = batch! { "act" => vec![self.act; n] };
        if self.with_state {
            let next = match state {
                Some(s) => s.to_f64()? + 1.0,
                None => ndarray::ArrayD::from_elem(ndarray::IxDyn(&[n]), 1.0),
            };
            out.insert("state", next);
            out.insert("policy", batch! { "logp" => vec![0.0; n] });
        }
        Ok(out)
    }
}
