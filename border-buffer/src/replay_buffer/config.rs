//! Configuration of replay buffers.
//!
//! - [`ReplayBufferConfig`]: capacity, frame stacking, storage options and seed
//! - [`PerConfig`]: prioritized experience replay; setting it on a
//!   [`ReplayBufferConfig`] makes the buffer prioritized
use crate::error::{BufferError, Result};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration for Prioritized Experience Replay (PER).
///
/// # Examples
///
/// ```rust
/// use border_buffer::PerConfig;
///
/// let config = PerConfig::default().alpha(0.6).beta(0.4);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent for prioritization. A value of 0 results in uniform sampling.
    pub alpha: f64,

    /// Exponent of the importance sampling weight.
    pub beta: f64,

    /// Added to the magnitude of every updated priority, so that no
    /// transition ends up with zero probability.
    pub eps: f64,
}

impl Default for PerConfig {
    /// `alpha = 0.6`, `beta = 0.4` and `eps` the machine epsilon of `f32`.
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.4,
            eps: f32::EPSILON as f64,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the importance sampling exponent `beta`.
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Sets the priority floor `eps`.
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }
}

/// Configuration of a replay buffer.
///
/// `capacity` is the number of slots of a single buffer. Managers built with
/// [`ReplayBufferManager::vector`](super::ReplayBufferManager::vector) split a
/// total size among their children instead, taking the other fields from
/// here.
///
/// # Examples
///
/// ```rust
/// use border_buffer::{PerConfig, ReplayBufferConfig};
///
/// let config = ReplayBufferConfig::default()
///     .capacity(10000)
///     .stack_num(4)
///     .ignore_obs_next(true)
///     .per_config(Some(PerConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Maximum number of transitions. When the buffer is full, new
    /// transitions replace the oldest ones.
    pub capacity: usize,

    /// Number of frames stacked per retrieved observation.
    pub stack_num: usize,

    /// If `true`, `obs_next` is not stored and is read from the `obs` of the
    /// following slot.
    pub ignore_obs_next: bool,

    /// If `true`, only the last frame of stacked observations is stored.
    pub save_only_last_obs: bool,

    /// If `true`, sampling only returns indices with a full frame stack.
    pub sample_avail: bool,

    /// Random seed used for sampling.
    pub seed: u64,

    /// Optional configuration for prioritized experience replay. If `None`,
    /// transitions are sampled uniformly at random.
    pub per_config: Option<PerConfig>,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            stack_num: 1,
            ignore_obs_next: false,
            save_only_last_obs: false,
            sample_avail: false,
            seed: 42,
            per_config: None,
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The new capacity for the buffer
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of stacked frames.
    pub fn stack_num(mut self, stack_num: usize) -> Self {
        self.stack_num = stack_num;
        self
    }

    /// Sets whether `obs_next` is reconstructed instead of stored.
    pub fn ignore_obs_next(mut self, v: bool) -> Self {
        self.ignore_obs_next = v;
        self
    }

    /// Sets whether only the last frame of observations is stored.
    pub fn save_only_last_obs(mut self, v: bool) -> Self {
        self.save_only_last_obs = v;
        self
    }

    /// Sets whether sampling is restricted to full frame stacks.
    pub fn sample_avail(mut self, v: bool) -> Self {
        self.sample_avail = v;
        self
    }

    /// Sets the random seed for sampling.
    ///
    /// # Arguments
    ///
    /// * `seed` - The new random seed
    ///
    /// # Returns
    ///
    /// The modified configuration
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration for prioritized experience replay.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Returns `true` if `obs_next` is stored physically.
    pub fn save_obs_next(&self) -> bool {
        !self.ignore_obs_next
    }

    /// Checks the options shared by every buffer.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.stack_num == 0 {
            return Err(BufferError::Precondition(
                "stack_num must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `true` if both configurations store and read transitions
    /// identically, ignoring capacity and seed.
    pub(crate) fn same_options(&self, other: &Self) -> bool {
        self.stack_num == other.stack_num
            && self.ignore_obs_next == other.ignore_obs_next
            && self.save_only_last_obs == other.save_only_last_obs
            && self.sample_avail == other.sample_avail
            && self.per_config == other.per_config
    }

    /// Loads the configuration from a YAML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path where the configuration should be saved
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
