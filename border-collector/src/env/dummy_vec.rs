//! Sequential vectorized environment.
use super::{all_ids, check_actions, check_ids, with_env_id, Env, VecStep, VectorEnv};
use crate::{error::CollectorError, space::Space};
use anyhow::Result;
use border_buffer::{Batch, Value};
use log::info;

/// Steps its environments one after another on the calling thread.
///
/// Results always come back for exactly the stepped ids, so this
/// environment is never asynchronous.
pub struct DummyVectorEnv<E: Env> {
    envs: Vec<E>,
    spaces: Vec<Space>,
}

impl<E: Env> DummyVectorEnv<E> {
    /// Wraps already built environments.
    pub fn new(envs: Vec<E>) -> Result<Self> {
        if envs.is_empty() {
            return Err(CollectorError::Precondition(
                "a vectorized environment needs at least one environment".to_string(),
            )
            .into());
        }
        let spaces = envs.iter().map(|e| e.action_space()).collect();
        Ok(Self { envs, spaces })
    }

    /// Builds one environment per configuration. Environment `i` gets the
    /// seed `seed + i`.
    pub fn build(configs: &[E::Config], seed: i64) -> Result<Self> {
        let envs = configs
            .iter()
            .enumerate()
            .map(|(i, config)| E::build(config, seed + i as i64))
            .collect::<Result<Vec<_>>>()?;
        info!("Build DummyVectorEnv with {} environments", envs.len());
        Self::new(envs)
    }

    /// The wrapped environments.
    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<E: Env> VectorEnv for DummyVectorEnv<E> {
    fn len(&self) -> usize {
        self.envs.len()
    }

    fn is_async(&self) -> bool {
        false
    }

    fn action_space(&self, id: usize) -> Result<&Space> {
        self.spaces.get(id).ok_or_else(|| {
            CollectorError::Precondition(format!("no environment with id {}", id)).into()
        })
    }

    fn reset(&mut self, ids: Option<&[usize]>) -> Result<(Value, Batch)> {
        let ids = all_ids(ids, self.envs.len());
        check_ids(&ids, self.envs.len())?;
        let mut obs = Vec::with_capacity(ids.len());
        let mut info = Vec::with_capacity(ids.len());
        for &id in ids.iter() {
            let (o, i) = self.envs[id].reset()?;
            obs.push(o);
            info.push(with_env_id(i, id));
        }
        let obs: Vec<&Value> = obs.iter().collect();
        Ok((Value::stack(&obs, 0)?, Batch::stack(&info)?))
    }

    fn step(&mut self, act: &Value, ids: &[usize]) -> Result<VecStep> {
        check_ids(ids, self.envs.len())?;
        check_actions(act, ids)?;
        let mut steps = Vec::with_capacity(ids.len());
        for (j, &id) in ids.iter().enumerate() {
            steps.push((id, self.envs[id].step(&act.row(j)?)?));
        }
        steps.sort_by_key(|(id, _)| *id);
        VecStep::from_steps(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{CountingEnv, CountingEnvConfig};

    #[test]
    fn steps_only_the_given_ids() -> Result<()> {
        let configs = vec![CountingEnvConfig::default().episode_len(2); 3];
        let mut env = DummyVectorEnv::<CountingEnv>::build(&configs, 0)?;
        let (obs, info) = env.reset(None)?;
        assert_eq!(obs, Value::from(vec![0, 0, 0]));
        assert_eq!(info.get("env_id"), Some(&Value::from(vec![0, 1, 2])));

        let out = env.step(&Value::from(vec![1, 1]), &[2, 0])?;
        assert_eq!(out.env_ids, vec![0, 2]);
        assert_eq!(out.obs_next, Value::from(vec![1, 1]));
        let out = env.step(&Value::from(vec![1]), &[0])?;
        assert_eq!(out.done(), vec![true]);
        assert_eq!(env.envs()[1].index(), 0);

        assert!(env.step(&Value::from(vec![1]), &[0, 1]).is_err());
        assert!(env.action_space(3).is_err());
        Ok(())
    }
}
