//! Action spaces.
use border_buffer::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Set of valid actions of an environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// Integers `0..n`.
    Discrete(usize),

    /// Real vectors bounded elementwise by `low` and `high`.
    Box {
        /// Lower bounds.
        low: Vec<f64>,

        /// Upper bounds.
        high: Vec<f64>,
    },
}

impl Space {
    /// Draws an action uniformly.
    ///
    /// A discrete action is an integer scalar, a box action a float vector.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        match self {
            Space::Discrete(n) => Value::from(rng.gen_range(0..(*n).max(1)) as i64),
            Space::Box { low, high } => Value::from(
                low.iter()
                    .zip(high.iter())
                    .map(|(&l, &h)| if h > l { rng.gen_range(l..h) } else { l })
                    .collect::<Vec<f64>>(),
            ),
        }
    }

    /// Returns `true` if `act` is a single action of this space.
    pub fn contains(&self, act: &Value) -> bool {
        match self {
            Space::Discrete(n) => match act.as_int() {
                Some(a) if a.ndim() == 0 => a.iter().all(|&x| x >= 0 && (x as usize) < *n),
                _ => false,
            },
            Space::Box { low, high } => match act.as_float() {
                Some(a) if a.ndim() == 1 && a.len() == low.len() => a
                    .iter()
                    .zip(low.iter().zip(high.iter()))
                    .all(|(&x, (&l, &h))| l <= x && x <= h),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn samples_are_contained() {
        let mut rng = StdRng::seed_from_u64(42);
        let spaces = [
            Space::Discrete(3),
            Space::Box {
                low: vec![-1.0, 0.0],
                high: vec![1.0, 0.5],
            },
        ];
        for space in spaces.iter() {
            for _ in 0..50 {
                let act = space.sample(&mut rng);
                assert!(space.contains(&act), "{:?} not in {:?}", act, space);
            }
        }
        assert!(!Space::Discrete(3).contains(&Value::from(3)));
        assert!(!Space::Discrete(3).contains(&Value::from(vec![1])));
    }

    #[test]
    fn sampling_is_seeded() {
        let space = Space::Discrete(1000);
        let a: Vec<Value> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..5).map(|_| space.sample(&mut rng)).collect()
        };
        let b: Vec<Value> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..5).map(|_| space.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }
}
