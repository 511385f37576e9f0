//! Configuration of collectors.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Collector`](crate::Collector) and
/// [`AsyncCollector`](crate::AsyncCollector).
///
/// # Examples
///
/// ```rust
/// use border_collector::CollectorConfig;
///
/// let config = CollectorConfig::default().exploration_noise(true).seed(7);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CollectorConfig {
    /// Apply [`Policy::exploration_noise`](crate::Policy::exploration_noise)
    /// to the actions of the policy.
    pub exploration_noise: bool,

    /// Seed of the generator of random actions.
    pub seed: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            exploration_noise: false,
            seed: 42,
        }
    }
}

impl CollectorConfig {
    /// Sets whether exploration noise is applied.
    pub fn exploration_noise(mut self, v: bool) -> Self {
        self.exploration_noise = v;
        self
    }

    /// Sets the seed of random actions.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let dir = TempDir::new("collector_config")?;
        let path = dir.path().join("collector.yaml");
        let config = CollectorConfig::default().exploration_noise(true).seed(3);
        config.save(&path)?;
        assert_eq!(CollectorConfig::load(&path)?, config);
        Ok(())
    }
}
