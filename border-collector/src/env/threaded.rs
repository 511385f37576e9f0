//! Vectorized environment with one worker thread per instance.
use super::{all_ids, check_actions, check_ids, with_env_id, Env, Step, VecStep, VectorEnv};
use crate::{error::CollectorError, space::Space};
use anyhow::Result;
use border_buffer::{Batch, Value};
use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use log::{debug, info};
use std::{
    thread::JoinHandle,
    time::{Duration, Instant},
};

enum Command {
    Reset,
    Step(Value),
    Close,
}

enum Reply {
    Space(Space),
    Reset(Value, Batch),
    Step(Step),
}

struct Worker {
    commands: Sender<Command>,
    replies: Receiver<Result<Reply>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<E>(id: usize, config: E::Config, seed: i64) -> Self
    where
        E: Env + 'static,
        E::Config: Send + 'static,
    {
        let (commands, r_commands) = unbounded();
        let (s_replies, replies) = unbounded();
        let handle = std::thread::spawn(move || {
            let env = match E::build(&config, seed) {
                Ok(env) => env,
                Err(e) => {
                    let _ = s_replies.send(Err(e));
                    return;
                }
            };
            if s_replies.send(Ok(Reply::Space(env.action_space()))).is_ok() {
                run_worker(id, env, r_commands, s_replies);
            }
        });
        Self {
            commands,
            replies,
            handle: Some(handle),
        }
    }
}

fn run_worker<E: Env>(
    id: usize,
    mut env: E,
    commands: Receiver<Command>,
    replies: Sender<Result<Reply>>,
) {
    for command in commands.iter() {
        let reply = match command {
            Command::Reset => env.reset().map(|(obs, info)| Reply::Reset(obs, info)),
            Command::Step(act) => env.step(&act).map(Reply::Step),
            Command::Close => break,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("Stopped worker of environment {}", id);
}

/// Runs each environment in its own worker thread.
///
/// Stepped environments stay in flight until their results are returned.
/// [`VectorEnv::step`] waits for at least `wait_num` of the in-flight
/// environments, or until `timeout` has passed once one result is in, and
/// then also returns every other result that is already available. With
/// the defaults (`wait_num` equal to the number of environments, no
/// timeout) it waits for every stepped environment and behaves
/// synchronously.
///
/// Environments are built inside their workers, so they need not be
/// [`Send`].
pub struct ThreadedVectorEnv {
    workers: Vec<Worker>,
    spaces: Vec<Space>,
    waiting: Vec<usize>,
    wait_num: usize,
    timeout: Option<Duration>,
}

impl ThreadedVectorEnv {
    /// Builds one environment per configuration, each in a new worker
    /// thread. Environment `i` gets the seed `seed + i`.
    pub fn build<E>(configs: &[E::Config], seed: i64) -> Result<Self>
    where
        E: Env + 'static,
        E::Config: Send + 'static,
    {
        if configs.is_empty() {
            return Err(CollectorError::Precondition(
                "a vectorized environment needs at least one environment".to_string(),
            )
            .into());
        }
        let workers: Vec<Worker> = configs
            .iter()
            .enumerate()
            .map(|(i, config)| Worker::spawn::<E>(i, config.clone(), seed + i as i64))
            .collect();
        let mut env = Self {
            spaces: Vec::with_capacity(workers.len()),
            wait_num: workers.len(),
            workers,
            waiting: vec![],
            timeout: None,
        };
        for id in 0..env.workers.len() {
            match env.recv(id)? {
                Reply::Space(space) => env.spaces.push(space),
                _ => return Err(unexpected(id)),
            }
        }
        info!("Build ThreadedVectorEnv with {} workers", env.workers.len());
        Ok(env)
    }

    /// Sets the minimum number of results [`VectorEnv::step`] waits for.
    pub fn wait_num(mut self, wait_num: usize) -> Result<Self> {
        if wait_num == 0 || wait_num > self.workers.len() {
            return Err(CollectorError::Precondition(format!(
                "wait_num must be in 1..={}, got {}",
                self.workers.len(),
                wait_num
            ))
            .into());
        }
        self.wait_num = wait_num;
        Ok(self)
    }

    /// Sets how long [`VectorEnv::step`] waits for more results once one is
    /// in.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ids of the environments stepped but not yet returned.
    pub fn waiting_ids(&self) -> &[usize] {
        &self.waiting
    }

    fn recv(&self, id: usize) -> Result<Reply> {
        self.workers[id]
            .replies
            .recv()
            .map_err(|_| CollectorError::EnvClosed(id))?
    }

    fn send(&self, id: usize, command: Command) -> Result<()> {
        self.workers[id]
            .commands
            .send(command)
            .map_err(|_| CollectorError::EnvClosed(id).into())
    }

    /// Receives one result of an in-flight environment.
    ///
    /// Blocks without limit when `deadline` is `None`. Returns `None` once
    /// `deadline` has passed, or immediately if nothing is ready and
    /// `block` is false.
    fn select(&mut self, block: bool, deadline: Option<Instant>) -> Result<Option<(usize, Step)>> {
        let mut sel = Select::new();
        for &id in self.waiting.iter() {
            sel.recv(&self.workers[id].replies);
        }
        let oper = match (block, deadline) {
            (false, _) => match sel.try_select() {
                Ok(oper) => oper,
                Err(_) => return Ok(None),
            },
            (true, Some(deadline)) => match sel.select_deadline(deadline) {
                Ok(oper) => oper,
                Err(_) => return Ok(None),
            },
            (true, None) => sel.select(),
        };
        let k = oper.index();
        let id = self.waiting[k];
        let reply = oper
            .recv(&self.workers[id].replies)
            .map_err(|_| CollectorError::EnvClosed(id))??;
        self.waiting.remove(k);
        match reply {
            Reply::Step(step) => Ok(Some((id, step))),
            _ => Err(unexpected(id)),
        }
    }
}

fn unexpected(id: usize) -> anyhow::Error {
    CollectorError::AsyncEnv(format!("unexpected reply from environment {}", id)).into()
}

impl VectorEnv for ThreadedVectorEnv {
    fn len(&self) -> usize {
        self.workers.len()
    }

    fn is_async(&self) -> bool {
        self.wait_num < self.workers.len() || self.timeout.is_some()
    }

    fn action_space(&self, id: usize) -> Result<&Space> {
        self.spaces.get(id).ok_or_else(|| {
            CollectorError::Precondition(format!("no environment with id {}", id)).into()
        })
    }

    /// Results of in-flight environments among `ids` are discarded.
    fn reset(&mut self, ids: Option<&[usize]>) -> Result<(Value, Batch)> {
        let ids = all_ids(ids, self.workers.len());
        check_ids(&ids, self.workers.len())?;
        for &id in ids.iter() {
            if let Some(k) = self.waiting.iter().position(|&w| w == id) {
                self.waiting.remove(k);
                debug!("Discard the pending step of environment {}", id);
                self.recv(id)?;
            }
        }
        for &id in ids.iter() {
            self.send(id, Command::Reset)?;
        }
        let mut obs = Vec::with_capacity(ids.len());
        let mut info = Vec::with_capacity(ids.len());
        for &id in ids.iter() {
            match self.recv(id)? {
                Reply::Reset(o, i) => {
                    obs.push(o);
                    info.push(with_env_id(i, id));
                }
                _ => return Err(unexpected(id)),
            }
        }
        let obs: Vec<&Value> = obs.iter().collect();
        Ok((Value::stack(&obs, 0)?, Batch::stack(&info)?))
    }

    /// Stepping an environment that is still in flight is an error.
    fn step(&mut self, act: &Value, ids: &[usize]) -> Result<VecStep> {
        check_ids(ids, self.workers.len())?;
        check_actions(act, ids)?;
        if let Some(id) = ids.iter().find(|&&id| self.waiting.contains(&id)) {
            return Err(CollectorError::Precondition(format!(
                "environment {} is still stepping",
                id
            ))
            .into());
        }
        for (j, &id) in ids.iter().enumerate() {
            self.send(id, Command::Step(act.row(j)?))?;
            self.waiting.push(id);
        }
        if self.waiting.is_empty() {
            return Err(
                CollectorError::Precondition("no environment is stepping".to_string()).into(),
            );
        }

        let target = self.wait_num.min(self.waiting.len());
        let mut ready = vec![];
        let mut deadline = None;
        while !self.waiting.is_empty() {
            let next = if ready.is_empty() {
                self.select(true, None)?
            } else if ready.len() < target {
                self.select(true, deadline)?
            } else {
                self.select(false, None)?
            };
            match next {
                Some(result) => ready.push(result),
                None => break,
            }
            if deadline.is_none() {
                deadline = self.timeout.map(|t| Instant::now() + t);
            }
        }
        ready.sort_by_key(|(id, _)| *id);
        VecStep::from_steps(ready)
    }
}

impl Drop for ThreadedVectorEnv {
    fn drop(&mut self) {
        for worker in self.workers.iter() {
            let _ = worker.commands.send(Command::Close);
        }
        for worker in self.workers.iter_mut() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{CountingEnv, CountingEnvConfig};

    #[test]
    fn synchronous_by_default() -> Result<()> {
        let configs = vec![CountingEnvConfig::default().episode_len(3); 4];
        let mut env = ThreadedVectorEnv::build::<CountingEnv>(&configs, 0)?;
        assert!(!env.is_async());
        let (obs, _) = env.reset(None)?;
        assert_eq!(obs, Value::from(vec![0, 0, 0, 0]));

        let out = env.step(&Value::from(vec![0, 0, 0]), &[3, 1, 2])?;
        assert_eq!(out.env_ids, vec![1, 2, 3]);
        assert_eq!(out.obs_next, Value::from(vec![1, 1, 1]));
        assert!(env.waiting_ids().is_empty());
        assert_eq!(env.action_space(0)?, &Space::Discrete(2));
        Ok(())
    }

    #[test]
    fn slow_environments_stay_in_flight() -> Result<()> {
        let configs = vec![
            CountingEnvConfig::default(),
            CountingEnvConfig::default().delay_ms(300),
        ];
        let mut env = ThreadedVectorEnv::build::<CountingEnv>(&configs, 0)?.wait_num(1)?;
        assert!(env.is_async());
        env.reset(None)?;

        let out = env.step(&Value::from(vec![0, 0]), &[0, 1])?;
        assert_eq!(out.env_ids, vec![0]);
        assert_eq!(env.waiting_ids(), &[1]);
        assert!(env.step(&Value::from(vec![0]), &[1]).is_err());

        let out = env.step(&Value::from(vec![0]), &[0])?;
        assert!(out.env_ids.contains(&0));

        env.reset(None)?;
        assert!(env.waiting_ids().is_empty());
        Ok(())
    }

    #[test]
    fn wait_num_is_checked() -> Result<()> {
        let configs = vec![CountingEnvConfig::default(); 2];
        let env = ThreadedVectorEnv::build::<CountingEnv>(&configs, 0)?;
        assert!(env.wait_num(3).is_err());
        Ok(())
    }
}
