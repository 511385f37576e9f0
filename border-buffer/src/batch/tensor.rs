//! Conversion between arrays and candle tensors.
use super::{Batch, Value};
use crate::error::{BufferError, Result};
use candle_core::{DType, Device, Tensor};
use ndarray::{ArrayD, IxDyn};

pub(crate) fn to_f64(t: &Tensor) -> Result<ArrayD<f64>> {
    let t = t.to_dtype(DType::F64)?;
    let data = if t.rank() == 0 {
        vec![t.to_scalar::<f64>()?]
    } else {
        t.flatten_all()?.to_vec1::<f64>()?
    };
    ArrayD::from_shape_vec(IxDyn(t.dims()), data).map_err(|e| BufferError::Value(e.to_string()))
}

fn to_i64(t: &Tensor) -> Result<ArrayD<i64>> {
    let t = t.to_dtype(DType::I64)?;
    let data = if t.rank() == 0 {
        vec![t.to_scalar::<i64>()?]
    } else {
        t.flatten_all()?.to_vec1::<i64>()?
    };
    ArrayD::from_shape_vec(IxDyn(t.dims()), data).map_err(|e| BufferError::Value(e.to_string()))
}

pub(crate) fn select_rows(t: &Tensor, ix: &[usize]) -> Result<Tensor> {
    let ix: Vec<u32> = ix.iter().map(|&i| i as u32).collect();
    let n = ix.len();
    let ix = Tensor::from_vec(ix, n, t.device())?;
    Ok(t.index_select(&ix, 0)?)
}

impl Value {
    fn to_tensor_(&mut self, device: &Device) -> Result<()> {
        match self {
            Value::Float(a) => {
                let data: Vec<f64> = a.iter().copied().collect();
                let t = Tensor::from_vec(data, a.shape(), device)?;
                *self = Value::Tensor(t);
            }
            Value::List(l) => {
                for v in l.iter_mut() {
                    v.to_tensor_(device)?;
                }
            }
            Value::Batch(b) => b.to_tensor(device)?,
            _ => {}
        }
        Ok(())
    }

    fn to_array_(&mut self) -> Result<()> {
        match self {
            Value::Tensor(t) => {
                *self = if t.dtype().is_float() {
                    Value::Float(to_f64(t)?)
                } else {
                    Value::Int(to_i64(t)?)
                };
            }
            Value::List(l) => {
                for v in l.iter_mut() {
                    v.to_array_()?;
                }
            }
            Value::Batch(b) => b.to_array()?,
            _ => {}
        }
        Ok(())
    }
}

impl Batch {
    /// Converts every floating-point array into a tensor on `device`, in place.
    ///
    /// Nested records and list elements are converted recursively. Integer,
    /// boolean and object arrays are left as they are.
    pub fn to_tensor(&mut self, device: &Device) -> Result<()> {
        for v in self.values_mut() {
            v.to_tensor_(device)?;
        }
        Ok(())
    }

    /// Converts every tensor back into an array, in place.
    ///
    /// Floating-point tensors become float arrays, all others integer arrays.
    pub fn to_array(&mut self) -> Result<()> {
        for v in self.values_mut() {
            v.to_array_()?;
        }
        Ok(())
    }
}
