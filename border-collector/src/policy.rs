//! Policy.
use anyhow::Result;
use border_buffer::{Batch, Value};

/// A policy choosing actions for a batch of observations.
///
/// The collectors call [`Policy::forward`] with a record holding `obs` and
/// `info`, one row per environment, and the hidden state returned by the
/// previous call for those environments, if any. The returned record must
/// hold `act`; it may also hold
///
/// - `state`, the next hidden state, passed back on the next call and
///   stored in the buffer as `policy.hidden_state`
/// - `policy`, a record of per-step data stored in the buffer as is
///
/// Actions in `act` are in the policy's own form, which is what the buffer
/// stores. [`Policy::map_action`] turns them into what the environment
/// expects.
pub trait Policy {
    /// Computes actions.
    fn forward(&mut self, batch: &Batch, state: Option<&Value>) -> Result<Batch>;

    /// Maps actions to the form the environment expects.
    fn map_action(&self, act: &Value) -> Result<Value> {
        Ok(act.clone())
    }

    /// Inverse of [`Policy::map_action`], applied to actions sampled from the
    /// environment's action space.
    fn map_action_inverse(&self, act: &Value) -> Result<Value> {
        Ok(act.clone())
    }

    /// Adds exploration noise to actions computed by [`Policy::forward`].
    fn exploration_noise(&mut self, act: Value, _batch: &Batch) -> Result<Value> {
        Ok(act)
    }
}

/// Affine map between actions in `[-1, 1]` and the bounds of a box space.
///
/// Policies with bounded continuous outputs use it to implement
/// [`Policy::map_action`] and [`Policy::map_action_inverse`]. Actions are
/// clipped to `[-1, 1]` before being scaled.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionScaling {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl ActionScaling {
    /// Scaling to the bounds `low` and `high`.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Self {
        Self { low, high }
    }

    /// Maps `[-1, 1]` to `[low, high]`, along the last axis of `act`.
    pub fn map(&self, act: &Value) -> Result<Value> {
        let mut a = act.to_f64()?;
        let d = self.low.len();
        if d == 0 {
            return Ok(Value::Float(a));
        }
        for (k, x) in a.iter_mut().enumerate() {
            let (l, h) = (self.low[k % d], self.high[k % d]);
            *x = l + (h - l) * (x.max(-1.0).min(1.0) + 1.0) / 2.0;
        }
        Ok(Value::Float(a))
    }

    /// Maps `[low, high]` back to `[-1, 1]`.
    pub fn map_inverse(&self, act: &Value) -> Result<Value> {
        let mut a = act.to_f64()?;
        let d = self.low.len();
        if d == 0 {
            return Ok(Value::Float(a));
        }
        for (k, x) in a.iter_mut().enumerate() {
            let (l, h) = (self.low[k % d], self.high[k % d]);
            *x = if h > l { (*x - l) * 2.0 / (h - l) - 1.0 } else { 0.0 };
        }
        Ok(Value::Float(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scaling_maps_bounds() -> Result<()> {
        let scaling = ActionScaling::new(vec![0.0, -2.0], vec![10.0, 2.0]);
        let act = Value::from(array![[-1.0, 1.0], [0.0, 3.0]]);
        let mapped = scaling.map(&act)?;
        assert_eq!(mapped, Value::from(array![[0.0, 2.0], [5.0, 2.0]]));
        let back = scaling.map_inverse(&mapped)?;
        assert_eq!(back, Value::from(array![[-1.0, 1.0], [0.0, 1.0]]));
        Ok(())
    }
}
