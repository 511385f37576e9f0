//! Element-wise arithmetic and splitting.
use super::{Batch, Value};
use crate::error::{type_err, value_err, BufferError, Result};
use ndarray::ArrayD;
use rand::{seq::SliceRandom, thread_rng};
use std::ops::{Add, Div, Mul};

#[derive(Clone, Copy)]
enum Op {
    Add,
    Mul,
    Div,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }
}

fn same_shape<A, B>(a: &ArrayD<A>, b: &ArrayD<B>) -> Result<()> {
    if a.shape() != b.shape() {
        return value_err(format!(
            "shape mismatch: {:?} and {:?}",
            a.shape(),
            b.shape()
        ));
    }
    Ok(())
}

impl Value {
    fn scalar_op(&self, op: Op, x: f64) -> Result<Value> {
        match self {
            Value::Float(_) | Value::Int(_) | Value::Bool(_) => {
                Ok(Value::Float(self.to_f64()?.mapv(|v| op.apply(v, x))))
            }
            Value::List(l) => Ok(Value::List(
                l.iter().map(|v| v.scalar_op(op, x)).collect::<Result<_>>()?,
            )),
            Value::Batch(b) => Ok(Value::Batch(b.scalar_op(op, x)?)),
            Value::Tensor(t) => Ok(Value::Tensor(match op {
                Op::Add => t.affine(1.0, x)?,
                Op::Mul => t.affine(x, 0.0)?,
                Op::Div => t.affine(1.0 / x, 0.0)?,
            })),
            Value::Object(_) => type_err("arithmetic on an object array"),
        }
    }

    fn add_value(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                same_shape(a, b)?;
                Ok(Value::Int(a + b))
            }
            (Value::Batch(a), Value::Batch(b)) => Ok(Value::Batch(a.add_batch(b)?)),
            (Value::List(a), Value::List(b)) if a.len() == b.len() => Ok(Value::List(
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.add_value(y))
                    .collect::<Result<_>>()?,
            )),
            (Value::Tensor(a), Value::Tensor(b)) => Ok(Value::Tensor(a.broadcast_add(b)?)),
            (Value::Object(_), _) | (_, Value::Object(_)) => {
                type_err("arithmetic on an object array")
            }
            (Value::Float(_), _) | (Value::Int(_), _) | (Value::Bool(_), _) => {
                let (a, b) = (self.to_f64()?, other.to_f64()?);
                same_shape(&a, &b)?;
                Ok(Value::Float(a + b))
            }
            _ => type_err(format!("cannot add {} and {}", self.kind(), other.kind())),
        }
    }
}

impl Batch {
    fn scalar_op(&self, op: Op, x: f64) -> Result<Batch> {
        self.iter()
            .map(|(k, v)| Ok((k.clone(), v.scalar_op(op, x)?)))
            .collect::<Result<Vec<_>>>()
            .map(|kv| kv.into_iter().collect())
    }

    /// Adds two records key by key.
    ///
    /// Both records must have the same keys; integer fields stay integer when
    /// both sides are integer.
    pub fn add_batch(&self, other: &Batch) -> Result<Batch> {
        let mut out = Batch::new();
        for (k, v) in self.iter() {
            let w = other
                .get(k)
                .ok_or_else(|| BufferError::Value(format!("key '{}' missing on one side", k)))?;
            out.insert(k.clone(), v.add_value(w)?);
        }
        if let Some(k) = other.keys().find(|k| !self.contains_key(k)) {
            return value_err(format!("key '{}' missing on one side", k));
        }
        Ok(out)
    }

    /// Adds a scalar to every numeric field.
    pub fn add_scalar(&self, x: f64) -> Result<Batch> {
        self.scalar_op(Op::Add, x)
    }

    /// Multiplies every numeric field by a scalar.
    pub fn mul_scalar(&self, x: f64) -> Result<Batch> {
        self.scalar_op(Op::Mul, x)
    }

    /// Divides every numeric field by a scalar.
    pub fn div_scalar(&self, x: f64) -> Result<Batch> {
        self.scalar_op(Op::Div, x)
    }

    /// Splits the record into chunks of at most `size` rows.
    ///
    /// Each call yields every row exactly once. With `shuffle`, rows are drawn
    /// in a fresh random order per call. With `merge_last`, a short final chunk
    /// is merged into the one before it.
    pub fn split(&self, size: usize, shuffle: bool, merge_last: bool) -> Result<Split<'_>> {
        if size == 0 {
            return Err(BufferError::Precondition(
                "split size must be positive".to_string(),
            ));
        }
        let mut order: Vec<usize> = (0..self.len()?).collect();
        if shuffle {
            order.shuffle(&mut thread_rng());
        }
        Ok(Split {
            batch: self,
            order,
            size,
            merge_last,
            pos: 0,
        })
    }
}

/// Iterator returned by [`Batch::split`].
pub struct Split<'a> {
    batch: &'a Batch,
    order: Vec<usize>,
    size: usize,
    merge_last: bool,
    pos: usize,
}

impl<'a> Iterator for Split<'a> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.order.len();
        if self.pos >= len {
            return None;
        }
        let mut end = (self.pos + self.size).min(len);
        if self.merge_last && len - end < self.size {
            end = len;
        }
        let ix = self.order[self.pos..end].to_vec();
        self.pos = end;
        Some(self.batch.get_item(ix))
    }
}

impl Add<&Batch> for &Batch {
    type Output = Result<Batch>;

    fn add(self, rhs: &Batch) -> Result<Batch> {
        self.add_batch(rhs)
    }
}

impl Add<f64> for &Batch {
    type Output = Result<Batch>;

    fn add(self, rhs: f64) -> Result<Batch> {
        self.add_scalar(rhs)
    }
}

impl Mul<f64> for &Batch {
    type Output = Result<Batch>;

    fn mul(self, rhs: f64) -> Result<Batch> {
        self.mul_scalar(rhs)
    }
}

impl Div<f64> for &Batch {
    type Output = Result<Batch>;

    fn div(self, rhs: f64) -> Result<Batch> {
        self.div_scalar(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch;
    use ndarray::array;

    #[test]
    fn arithmetic_is_key_wise() -> Result<()> {
        let a = batch! { "x" => vec![1, 2], "y" => batch! { "z" => vec![1.0, 2.0] } };
        let s = (&a + &a)?;
        assert_eq!(s.get("x").unwrap(), &Value::from(vec![2, 4]));
        let h = (&s / 4.0)?;
        assert_eq!(h.get("x").unwrap(), &Value::from(vec![0.5, 1.0]));
        assert_eq!(
            h.get("y").unwrap().as_batch().unwrap().get("z").unwrap(),
            &Value::from(vec![0.5, 1.0])
        );
        assert_eq!((&a * 3.0)?.get("x").unwrap(), &Value::from(array![3.0, 6.0]));
        Ok(())
    }

    #[test]
    fn arithmetic_rejects_objects() {
        let a = batch! { "s" => vec![Value::from("a")], "n" => "b" };
        assert!(matches!(a.add_scalar(1.0), Err(BufferError::Type(_))));
    }

    #[test]
    fn mismatched_shapes_are_reported() {
        let a = batch! { "x" => vec![1, 2] };
        let b = batch! { "x" => vec![1, 2, 3] };
        match a.add_batch(&b) {
            Err(BufferError::Value(msg)) => assert!(msg.starts_with("shape mismatch")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn split_covers_every_row_once() -> Result<()> {
        let b = batch! { "x" => (0..10).collect::<Vec<i64>>() };
        for shuffle in [false, true].iter() {
            let mut seen = vec![];
            let mut sizes = vec![];
            for chunk in b.split(3, *shuffle, false)? {
                let chunk = chunk?;
                sizes.push(chunk.len()?);
                seen.extend(chunk.get("x").unwrap().as_int().unwrap().iter().copied());
            }
            assert_eq!(sizes, vec![3, 3, 3, 1]);
            seen.sort_unstable();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
        }
        let sizes = b
            .split(3, false, true)?
            .map(|c| c.and_then(|c| c.len()))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(sizes, vec![3, 3, 4]);
        assert!(b.split(0, false, false).is_err());
        Ok(())
    }
}
