//! Statistics of collection calls.
use crate::record::{Record, RecordValue};
use std::fmt;

/// Mean, standard deviation, minimum and maximum of a sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryStats {
    /// Mean.
    pub mean: f64,

    /// Population standard deviation.
    pub std: f64,

    /// Minimum.
    pub min: f64,

    /// Maximum.
    pub max: f64,
}

impl SummaryStats {
    /// Statistics of `values`, `None` if it is empty.
    pub fn from_sequence<T: Copy + Into<f64>>(values: &[T]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let xs = values.iter().map(|&v| -> f64 { v.into() });
        let mean = xs.clone().sum::<f64>() / n;
        let var = xs.clone().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: var.sqrt(),
            min: xs.clone().fold(f64::INFINITY, f64::min),
            max: xs.fold(f64::NEG_INFINITY, f64::max),
        })
    }

    /// The four statistics as scalars named `<prefix>_mean`, `<prefix>_std`
    /// and so on.
    pub fn to_record(&self, prefix: &str) -> Record {
        let mut record = Record::empty();
        for (name, v) in [
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("max", self.max),
        ]
        .iter()
        {
            record.insert(format!("{}_{}", prefix, name), RecordValue::Scalar(*v as f32));
        }
        record
    }
}

impl fmt::Display for SummaryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} ± {:.3} [{:.3}, {:.3}]",
            self.mean, self.std, self.min, self.max
        )
    }
}

/// Statistics of one collection call.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectStats {
    /// Number of completed episodes.
    pub n_collected_episodes: usize,

    /// Number of transitions added to the buffer.
    pub n_collected_steps: usize,

    /// Wall-clock duration of the call in seconds.
    pub collect_time: f64,

    /// Transitions per second.
    pub collect_speed: f64,

    /// Returns of the completed episodes, in completion order.
    pub returns: Vec<f64>,

    /// Summary of `returns`.
    pub returns_stat: Option<SummaryStats>,

    /// Lengths of the completed episodes.
    pub lens: Vec<usize>,

    /// Summary of `lens`.
    pub lens_stat: Option<SummaryStats>,
}

impl CollectStats {
    pub(crate) fn new(
        n_collected_steps: usize,
        n_collected_episodes: usize,
        collect_time: f64,
        returns: Vec<f64>,
        lens: Vec<usize>,
    ) -> Self {
        let lens_f: Vec<f64> = lens.iter().map(|&l| l as f64).collect();
        Self {
            n_collected_episodes,
            n_collected_steps,
            collect_time,
            collect_speed: n_collected_steps as f64 / collect_time,
            returns_stat: SummaryStats::from_sequence(&returns),
            lens_stat: SummaryStats::from_sequence(&lens_f),
            returns,
            lens,
        }
    }

    /// Scalar metrics of the call.
    ///
    /// Summary keys (`returns_mean`, `lens_max`, ...) are present only if an
    /// episode was completed.
    pub fn to_record(&self) -> Record {
        let record = Record::from_slice(&[
            (
                "n_collected_steps",
                RecordValue::Scalar(self.n_collected_steps as f32),
            ),
            (
                "n_collected_episodes",
                RecordValue::Scalar(self.n_collected_episodes as f32),
            ),
            ("collect_time", RecordValue::Scalar(self.collect_time as f32)),
            ("collect_speed", RecordValue::Scalar(self.collect_speed as f32)),
        ]);
        [(&self.returns_stat, "returns"), (&self.lens_stat, "lens")]
            .iter()
            .filter_map(|(s, prefix)| s.map(|s| s.to_record(prefix)))
            .fold(record, Record::merge)
    }
}
