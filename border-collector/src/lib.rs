#![warn(missing_docs)]
//! Collectors driving vectorized environments and filling replay buffers.
//!
//! A [`Collector`] asks a [`Policy`] for actions, steps a [`VectorEnv`] and
//! adds the resulting transitions to a buffer of the `border-buffer` crate,
//! one buffer id per environment. [`AsyncCollector`] does the same for
//! environments that return results out of order, such as a
//! [`ThreadedVectorEnv`] waiting for only a part of its workers.
//!
//! ```rust
//! use border_buffer::{ReplayBufferBase, ReplayBufferConfig, ReplayBufferManager};
//! use border_collector::{
//!     dummy::{CountingEnv, CountingEnvConfig, FixedPolicy},
//!     Collector, CollectorConfig, DummyVectorEnv,
//! };
//!
//! let configs = vec![CountingEnvConfig::default().episode_len(3); 2];
//! let env = DummyVectorEnv::<CountingEnv>::build(&configs, 0).unwrap();
//! let buffer = ReplayBufferManager::vector(20, 2, &ReplayBufferConfig::default()).unwrap();
//! let mut collector =
//!     Collector::new(FixedPolicy::new(0), env, buffer, CollectorConfig::default()).unwrap();
//!
//! let stats = collector.collect(None, Some(4), false).unwrap();
//! assert_eq!(stats.n_collected_episodes, 4);
//! assert_eq!(collector.buffer().len(), 12);
//! ```
pub mod collector;
pub mod config;
pub mod dummy;
pub mod env;
pub mod error;
pub mod policy;
pub mod record;
pub mod space;
pub mod stats;

pub use collector::{default_reward_metric, AsyncCollector, Collector, RewardMetric};
pub use config::CollectorConfig;
pub use env::{DummyVectorEnv, Env, Step, ThreadedVectorEnv, VecStep, VectorEnv};
pub use error::CollectorError;
pub use policy::{ActionScaling, Policy};
pub use record::{Record, RecordValue};
pub use space::Space;
pub use stats::{CollectStats, SummaryStats};
