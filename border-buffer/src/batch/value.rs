//! Values stored under the keys of a [`Batch`].
use super::{tensor, Batch, Index, Object, Resolved};
use crate::error::{index_err, type_err, value_err, BufferError, Result};
use candle_core::Tensor;
use ndarray::{Array, ArrayD, Axis, Dimension, IxDyn};
use serde::{Deserialize, Serialize};

/// A value in a [`Batch`].
///
/// Array variants are dynamic-dimensional. A 0-d array is a scalar and has no
/// length; every other value is indexed along its leading axis (the batch axis).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    /// Floating-point array.
    Float(ArrayD<f64>),

    /// Integer array.
    Int(ArrayD<i64>),

    /// Boolean array.
    Bool(ArrayD<bool>),

    /// Array of [`Object`]s.
    Object(ArrayD<Object>),

    /// A list whose elements are the rows.
    List(Vec<Value>),

    /// A nested record.
    Batch(Batch),

    /// A tensor, see [`Batch::to_tensor`].
    #[serde(skip)]
    Tensor(Tensor),
}

#[derive(PartialEq, PartialOrd, Clone, Copy)]
enum Numeric {
    Bool,
    Int,
    Float,
}

fn numeric_kind(values: &[&Value]) -> Result<Numeric> {
    let mut kind = Numeric::Bool;
    for v in values {
        let k = match v {
            Value::Bool(_) => Numeric::Bool,
            Value::Int(_) => Numeric::Int,
            Value::Float(_) => Numeric::Float,
            _ => return type_err(format!("cannot combine {} with numeric arrays", v.kind())),
        };
        if k > kind {
            kind = k;
        }
    }
    Ok(kind)
}

fn leading(n: usize, shape: &[usize]) -> IxDyn {
    let mut dims = Vec::with_capacity(shape.len() + 1);
    dims.push(n);
    dims.extend_from_slice(shape);
    IxDyn(&dims)
}

fn stack_arrays<A: Clone>(arrs: &[&ArrayD<A>], axis: usize) -> Result<ArrayD<A>> {
    let views: Vec<_> = arrs.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(axis), &views)
        .map_err(|e| BufferError::Value(format!("cannot stack arrays: {}", e)))
}

fn concat_arrays<A: Clone>(a: &ArrayD<A>, b: &ArrayD<A>) -> Result<ArrayD<A>> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return type_err("cannot concatenate scalars");
    }
    ndarray::concatenate(Axis(0), &[a.view(), b.view()])
        .map_err(|e| BufferError::Value(format!("cannot concatenate arrays: {}", e)))
}

fn assign_row<A: Clone>(col: &mut ArrayD<A>, i: usize, row: &ArrayD<A>) -> Result<()> {
    let mut target = col.index_axis_mut(Axis(0), i);
    match row.broadcast(target.raw_dim()) {
        Some(src) => {
            target.assign(&src);
            Ok(())
        }
        None => value_err(format!(
            "cannot write a row of shape {:?} into a slot of shape {:?}",
            row.shape(),
            target.shape()
        )),
    }
}

impl Value {
    /// A scalar missing value, the row type of backfilled object columns.
    pub fn none() -> Self {
        Value::Object(ArrayD::from_elem(IxDyn(&[]), Object::None))
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => "float array",
            Value::Int(_) => "int array",
            Value::Bool(_) => "bool array",
            Value::Object(_) => "object array",
            Value::List(_) => "list",
            Value::Batch(_) => "batch",
            Value::Tensor(_) => "tensor",
        }
    }

    /// Shape of array and tensor values.
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Value::Float(a) => Some(a.shape().to_vec()),
            Value::Int(a) => Some(a.shape().to_vec()),
            Value::Bool(a) => Some(a.shape().to_vec()),
            Value::Object(a) => Some(a.shape().to_vec()),
            Value::Tensor(t) => Some(t.dims().to_vec()),
            _ => None,
        }
    }

    /// Returns `true` for 0-d arrays and tensors.
    pub fn is_scalar(&self) -> bool {
        matches!(self.shape(), Some(s) if s.is_empty())
    }

    /// Returns `true` for a nested record without any data.
    pub fn is_empty_batch(&self) -> bool {
        matches!(self, Value::Batch(b) if b.is_empty())
    }

    /// Length along the batch axis; `None` for scalars and empty records.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(l.len()),
            Value::Batch(b) if b.is_empty() => None,
            Value::Batch(b) => b.len().ok(),
            _ => match self.shape() {
                Some(s) if !s.is_empty() => Some(s[0]),
                _ => None,
            },
        }
    }

    /// Returns the float array.
    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            Value::Float(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the integer array.
    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Value::Int(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the boolean array.
    pub fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match self {
            Value::Bool(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the object array.
    pub fn as_object(&self) -> Option<&ArrayD<Object>> {
        match self {
            Value::Object(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the list.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the nested record.
    pub fn as_batch(&self) -> Option<&Batch> {
        match self {
            Value::Batch(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the nested record mutably.
    pub fn as_batch_mut(&mut self) -> Option<&mut Batch> {
        match self {
            Value::Batch(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the tensor.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Casts a numeric value to a float array.
    pub fn to_f64(&self) -> Result<ArrayD<f64>> {
        match self {
            Value::Float(a) => Ok(a.clone()),
            Value::Int(a) => Ok(a.mapv(|x| x as f64)),
            Value::Bool(a) => Ok(a.mapv(|x| if x { 1.0 } else { 0.0 })),
            Value::Tensor(t) => tensor::to_f64(t),
            _ => type_err(format!("{} is not numeric", self.kind())),
        }
    }

    /// Casts a numeric value to an integer array. Floats are truncated.
    pub fn to_i64(&self) -> Result<ArrayD<i64>> {
        match self {
            Value::Int(a) => Ok(a.clone()),
            Value::Float(a) => Ok(a.mapv(|x| x as i64)),
            Value::Bool(a) => Ok(a.mapv(|x| x as i64)),
            Value::Tensor(t) => Ok(tensor::to_f64(t)?.mapv(|x| x as i64)),
            _ => type_err(format!("{} is not numeric", self.kind())),
        }
    }

    /// Casts a numeric value to a boolean array (non-zero is `true`).
    pub fn to_bool(&self) -> Result<ArrayD<bool>> {
        match self {
            Value::Bool(a) => Ok(a.clone()),
            Value::Int(a) => Ok(a.mapv(|x| x != 0)),
            Value::Float(a) => Ok(a.mapv(|x| x != 0.0)),
            Value::Tensor(t) => Ok(tensor::to_f64(t)?.mapv(|x| x != 0.0)),
            _ => type_err(format!("{} is not numeric", self.kind())),
        }
    }

    /// Returns the single element of a numeric value as `f64`.
    pub fn item(&self) -> Result<f64> {
        let a = self.to_f64()?;
        match a.len() {
            1 => Ok(a.iter().next().copied().unwrap_or_default()),
            n => value_err(format!("expected a single element, got {}", n)),
        }
    }

    fn checked_len(&self) -> Result<usize> {
        match self.len() {
            Some(n) => Ok(n),
            None => index_err(format!("cannot index a {} without length", self.kind())),
        }
    }

    /// Row `i` along the batch axis.
    pub fn row(&self, i: usize) -> Result<Value> {
        let n = self.checked_len()?;
        if i >= n {
            return index_err(format!("index {} is out of bounds for length {}", i, n));
        }
        Ok(match self {
            Value::Float(a) => Value::Float(a.index_axis(Axis(0), i).to_owned()),
            Value::Int(a) => Value::Int(a.index_axis(Axis(0), i).to_owned()),
            Value::Bool(a) => Value::Bool(a.index_axis(Axis(0), i).to_owned()),
            Value::Object(a) => Value::Object(a.index_axis(Axis(0), i).to_owned()),
            Value::List(l) => l[i].clone(),
            Value::Batch(b) => Value::Batch(b.get_item(Index::Int(i as isize))?),
            Value::Tensor(t) => Value::Tensor(t.get(i)?),
        })
    }

    /// Rows `ix` along the batch axis, keeping the batch axis.
    pub fn select(&self, ix: &[usize]) -> Result<Value> {
        let n = self.checked_len()?;
        if let Some(&i) = ix.iter().find(|&&i| i >= n) {
            return index_err(format!("index {} is out of bounds for length {}", i, n));
        }
        Ok(match self {
            Value::Float(a) => Value::Float(a.select(Axis(0), ix)),
            Value::Int(a) => Value::Int(a.select(Axis(0), ix)),
            Value::Bool(a) => Value::Bool(a.select(Axis(0), ix)),
            Value::Object(a) => Value::Object(a.select(Axis(0), ix)),
            Value::List(l) => Value::List(ix.iter().map(|&i| l[i].clone()).collect()),
            Value::Batch(b) => Value::Batch(b.get_item(Index::from(ix))?),
            Value::Tensor(t) => Value::Tensor(tensor::select_rows(t, ix)?),
        })
    }

    /// Applies a resolved index.
    pub fn take(&self, ix: &Resolved) -> Result<Value> {
        match ix {
            Resolved::One(i) => self.row(*i),
            Resolved::Many(ix) => self.select(ix),
        }
    }

    /// Allocates `n` zero rows shaped like `row`.
    ///
    /// Numbers are zero, booleans `false`, objects and list elements
    /// [`Object::None`]; records are allocated key by key.
    pub fn alloc_rows(row: &Value, n: usize) -> Result<Value> {
        Ok(match row {
            Value::Float(a) => Value::Float(ArrayD::zeros(leading(n, a.shape()))),
            Value::Int(a) => Value::Int(ArrayD::zeros(leading(n, a.shape()))),
            Value::Bool(a) => Value::Bool(ArrayD::from_elem(leading(n, a.shape()), false)),
            Value::Object(a) => {
                Value::Object(ArrayD::from_elem(leading(n, a.shape()), Object::None))
            }
            Value::List(_) => Value::List(vec![Value::none(); n]),
            Value::Batch(b) => Value::Batch(b.alloc_rows(n)?),
            Value::Tensor(t) => {
                let dims = leading(n, t.dims());
                Value::Tensor(Tensor::zeros(dims.slice(), t.dtype(), t.device())?)
            }
        })
    }

    /// Overwrites row `i` with `row`, casting it to the dtype of this value.
    pub fn set_row(&mut self, i: usize, row: &Value) -> Result<()> {
        let n = self.checked_len()?;
        if i >= n {
            return index_err(format!("index {} is out of bounds for length {}", i, n));
        }
        match self {
            Value::Float(col) => assign_row(col, i, &row.to_f64()?),
            Value::Int(col) => assign_row(col, i, &row.to_i64()?),
            Value::Bool(col) => assign_row(col, i, &row.to_bool()?),
            Value::Object(col) => match row {
                Value::Object(r) => assign_row(col, i, r),
                _ => type_err(format!("cannot store a {} in an object column", row.kind())),
            },
            Value::List(items) => {
                items[i] = row.clone();
                Ok(())
            }
            Value::Batch(b) => match row {
                Value::Batch(r) => b.set_row(i, r),
                _ => type_err(format!("cannot store a {} in a record column", row.kind())),
            },
            Value::Tensor(_) => type_err("tensor columns cannot be written row by row"),
        }
    }

    /// Resets row `i` to the zero value of its column.
    pub fn zero_row(&mut self, i: usize) -> Result<()> {
        let n = self.checked_len()?;
        if i >= n {
            return index_err(format!("index {} is out of bounds for length {}", i, n));
        }
        match self {
            Value::Float(col) => col.index_axis_mut(Axis(0), i).fill(0.0),
            Value::Int(col) => col.index_axis_mut(Axis(0), i).fill(0),
            Value::Bool(col) => col.index_axis_mut(Axis(0), i).fill(false),
            Value::Object(col) => col.index_axis_mut(Axis(0), i).fill(Object::None),
            Value::List(items) => items[i] = Value::none(),
            Value::Batch(b) => b.zero_row(i)?,
            Value::Tensor(_) => return type_err("tensor columns cannot be written row by row"),
        }
        Ok(())
    }

    /// Stacks values along a new axis `axis`.
    ///
    /// Numeric arrays are promoted to the widest dtype among them. Lists can
    /// only be stacked along axis 0, where they are concatenated.
    pub fn stack(values: &[&Value], axis: usize) -> Result<Value> {
        let first = match values.first() {
            Some(v) => *v,
            None => return value_err("cannot stack an empty sequence"),
        };
        match first {
            Value::Float(_) | Value::Int(_) | Value::Bool(_) => match numeric_kind(values)? {
                Numeric::Float => {
                    let arrs = values.iter().map(|v| v.to_f64()).collect::<Result<Vec<_>>>()?;
                    let refs: Vec<_> = arrs.iter().collect();
                    Ok(Value::Float(stack_arrays(&refs, axis)?))
                }
                Numeric::Int => {
                    let arrs = values.iter().map(|v| v.to_i64()).collect::<Result<Vec<_>>>()?;
                    let refs: Vec<_> = arrs.iter().collect();
                    Ok(Value::Int(stack_arrays(&refs, axis)?))
                }
                Numeric::Bool => {
                    let arrs = values.iter().map(|v| v.to_bool()).collect::<Result<Vec<_>>>()?;
                    let refs: Vec<_> = arrs.iter().collect();
                    Ok(Value::Bool(stack_arrays(&refs, axis)?))
                }
            },
            Value::Object(_) => {
                let refs = values
                    .iter()
                    .map(|v| v.as_object().ok_or_else(|| mixed(first, v)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Object(stack_arrays(&refs, axis)?))
            }
            Value::List(_) => {
                if axis != 0 {
                    return type_err("lists can only be stacked along axis 0");
                }
                let mut out = vec![];
                for v in values {
                    out.extend(v.as_list().ok_or_else(|| mixed(first, v))?.iter().cloned());
                }
                Ok(Value::List(out))
            }
            Value::Batch(_) => {
                let bs = values
                    .iter()
                    .map(|v| v.as_batch().ok_or_else(|| mixed(first, v)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Batch(Batch::stack_axis(&bs, axis)?))
            }
            Value::Tensor(_) => {
                let ts = values
                    .iter()
                    .map(|v| v.as_tensor().ok_or_else(|| mixed(first, v)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Tensor(Tensor::stack(&ts, axis)?))
            }
        }
    }

    /// Concatenates two values along axis 0.
    pub fn concat(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Batch(a), Value::Batch(b)) => {
                let mut a = a.clone();
                a.cat_(b)?;
                Ok(Value::Batch(a))
            }
            (Value::Batch(a), _) if a.is_empty() => Ok(other.clone()),
            (_, Value::Batch(b)) if b.is_empty() => Ok(self.clone()),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Value::Object(a), Value::Object(b)) => Ok(Value::Object(concat_arrays(a, b)?)),
            (Value::Tensor(a), Value::Tensor(b)) => {
                if a.rank() == 0 || b.rank() == 0 {
                    return type_err("cannot concatenate scalars");
                }
                Ok(Value::Tensor(Tensor::cat(&[a, b], 0)?))
            }
            _ => match numeric_kind(&[self, other]) {
                Ok(Numeric::Float) => Ok(Value::Float(concat_arrays(
                    &self.to_f64()?,
                    &other.to_f64()?,
                )?)),
                Ok(Numeric::Int) => Ok(Value::Int(concat_arrays(
                    &self.to_i64()?,
                    &other.to_i64()?,
                )?)),
                Ok(Numeric::Bool) => Ok(Value::Bool(concat_arrays(
                    &self.to_bool()?,
                    &other.to_bool()?,
                )?)),
                Err(_) => type_err(format!(
                    "cannot concatenate {} with {}",
                    self.kind(),
                    other.kind()
                )),
            },
        }
    }
}

fn mixed(a: &Value, b: &Value) -> BufferError {
    BufferError::Type(format!("cannot combine {} with {}", a.kind(), b.kind()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Batch(a), Value::Batch(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => {
                a.dims() == b.dims() && tensor::to_f64(a).ok() == tensor::to_f64(b).ok()
            }
            _ => false,
        }
    }
}

macro_rules! impl_from_scalar {
    ($t:ty, $variant:ident, $conv:expr) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(ndarray::arr0($conv(v)).into_dyn())
            }
        }

        impl From<Vec<$t>> for Value {
            fn from(v: Vec<$t>) -> Self {
                Value::$variant(ndarray::Array1::from(v).mapv($conv).into_dyn())
            }
        }
    };
}

impl_from_scalar!(f64, Float, |x: f64| x);
impl_from_scalar!(f32, Float, |x: f32| x as f64);
impl_from_scalar!(i64, Int, |x: i64| x);
impl_from_scalar!(i32, Int, |x: i32| x as i64);
impl_from_scalar!(usize, Int, |x: usize| x as i64);
impl_from_scalar!(bool, Bool, |x: bool| x);

impl<D: Dimension> From<Array<f64, D>> for Value {
    fn from(a: Array<f64, D>) -> Self {
        Value::Float(a.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for Value {
    fn from(a: Array<i64, D>) -> Self {
        Value::Int(a.into_dyn())
    }
}

impl<D: Dimension> From<Array<bool, D>> for Value {
    fn from(a: Array<bool, D>) -> Self {
        Value::Bool(a.into_dyn())
    }
}

impl<D: Dimension> From<Array<Object, D>> for Value {
    fn from(a: Array<Object, D>) -> Self {
        Value::Object(a.into_dyn())
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(ndarray::arr0(o).into_dyn())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from(Object::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from(Object::Str(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Batch> for Value {
    fn from(b: Batch) -> Self {
        Value::Batch(b)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scalars_have_no_length() {
        assert_eq!(Value::from(1.0).len(), None);
        assert_eq!(Value::from(vec![1, 2, 3]).len(), Some(3));
        assert!(Value::from(1.0).row(0).is_err());
    }

    #[test]
    fn set_row_casts_and_checks_shape() {
        let mut col = Value::alloc_rows(&Value::from(vec![0.0, 0.0]), 3).unwrap();
        col.set_row(1, &Value::from(vec![1, 2])).unwrap();
        assert_eq!(col, Value::from(array![[0., 0.], [1., 2.], [0., 0.]]));
        assert!(matches!(
            col.set_row(0, &Value::from(vec![1.0, 2.0, 3.0])),
            Err(BufferError::Value(_))
        ));
        assert!(matches!(col.set_row(3, &Value::from(0.0)), Err(BufferError::Index(_))));
    }

    #[test]
    fn stack_promotes_numeric() {
        let v = Value::stack(&[&Value::from(1), &Value::from(2.5)], 0).unwrap();
        assert_eq!(v, Value::from(vec![1.0, 2.5]));
        let err = Value::stack(&[&Value::from(1), &Value::from("a")], 0);
        assert!(matches!(err, Err(BufferError::Type(_))));
    }

    #[test]
    fn concat_rejects_scalars() {
        let err = Value::from(1.0).concat(&Value::from(2.0));
        assert!(matches!(err, Err(BufferError::Type(_))));
        let v = Value::from(vec![1, 2]).concat(&Value::from(vec![3])).unwrap();
        assert_eq!(v, Value::from(vec![1, 2, 3]));
    }
}
