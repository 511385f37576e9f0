//! Row selectors.
use crate::error::{index_err, Result};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// Selects rows along the leading axis of a [`Batch`](super::Batch) or a buffer.
///
/// Negative positions count from the end.
#[derive(Clone, Debug, PartialEq)]
pub enum Index {
    /// A single row. The selected value loses its leading axis.
    Int(isize),

    /// A half-open range of rows, clamped to the valid region.
    Slice {
        /// First row, `None` for the beginning.
        start: Option<isize>,
        /// One past the last row, `None` for the end.
        end: Option<isize>,
    },

    /// An explicit list of rows, possibly repeated.
    List(Vec<isize>),
}

/// An [`Index`] resolved against a concrete length.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// A single row.
    One(usize),

    /// Several rows.
    Many(Vec<usize>),
}

impl Resolved {
    /// Returns the selected rows as a list.
    pub fn to_vec(&self) -> Vec<usize> {
        match self {
            Resolved::One(i) => vec![*i],
            Resolved::Many(ix) => ix.clone(),
        }
    }
}

fn clamp_bound(v: Option<isize>, len: usize, default: usize) -> usize {
    match v {
        None => default,
        Some(v) if v < 0 => (v + len as isize).max(0) as usize,
        Some(v) => (v as usize).min(len),
    }
}

fn check(i: isize, len: usize) -> Result<usize> {
    let n = len as isize;
    if i < -n || i >= n {
        return index_err(format!("index {} is out of bounds for length {}", i, len));
    }
    Ok(i.rem_euclid(n.max(1)) as usize)
}

impl Index {
    /// Selects every row.
    pub fn all() -> Self {
        Index::Slice {
            start: None,
            end: None,
        }
    }

    /// Returns `true` if this selects a single row.
    pub fn is_int(&self) -> bool {
        matches!(self, Index::Int(_))
    }

    /// Resolves against `len` rows, failing on out-of-range positions.
    pub fn resolve(&self, len: usize) -> Result<Resolved> {
        match self {
            Index::Int(i) => Ok(Resolved::One(check(*i, len)?)),
            Index::Slice { start, end } => {
                let s = clamp_bound(*start, len, 0);
                let e = clamp_bound(*end, len, len);
                Ok(Resolved::Many((s..e.max(s)).collect()))
            }
            Index::List(ix) => Ok(Resolved::Many(
                ix.iter().map(|&i| check(i, len)).collect::<Result<_>>()?,
            )),
        }
    }

    /// Resolves against a circular index space of size `modulus`, wrapping
    /// every position instead of failing.
    pub fn resolve_wrapping(&self, modulus: usize) -> Resolved {
        let m = modulus.max(1) as isize;
        match self {
            Index::Int(i) => Resolved::One(i.rem_euclid(m) as usize),
            Index::Slice { start, end } => {
                let s = clamp_bound(*start, modulus, 0);
                let e = clamp_bound(*end, modulus, modulus);
                Resolved::Many((s..e.max(s)).collect())
            }
            Index::List(ix) => {
                Resolved::Many(ix.iter().map(|i| i.rem_euclid(m) as usize).collect())
            }
        }
    }
}

impl From<isize> for Index {
    fn from(i: isize) -> Self {
        Index::Int(i)
    }
}

impl From<i32> for Index {
    fn from(i: i32) -> Self {
        Index::Int(i as isize)
    }
}

impl From<usize> for Index {
    fn from(i: usize) -> Self {
        Index::Int(i as isize)
    }
}

impl From<Vec<isize>> for Index {
    fn from(ix: Vec<isize>) -> Self {
        Index::List(ix)
    }
}

impl From<Vec<i32>> for Index {
    fn from(ix: Vec<i32>) -> Self {
        Index::List(ix.into_iter().map(|i| i as isize).collect())
    }
}

impl From<Vec<usize>> for Index {
    fn from(ix: Vec<usize>) -> Self {
        Index::List(ix.into_iter().map(|i| i as isize).collect())
    }
}

impl From<&[usize]> for Index {
    fn from(ix: &[usize]) -> Self {
        Index::List(ix.iter().map(|&i| i as isize).collect())
    }
}

impl From<&Vec<usize>> for Index {
    fn from(ix: &Vec<usize>) -> Self {
        Index::from(ix.as_slice())
    }
}

impl From<Range<usize>> for Index {
    fn from(r: Range<usize>) -> Self {
        Index::Slice {
            start: Some(r.start as isize),
            end: Some(r.end as isize),
        }
    }
}

impl From<RangeFrom<usize>> for Index {
    fn from(r: RangeFrom<usize>) -> Self {
        Index::Slice {
            start: Some(r.start as isize),
            end: None,
        }
    }
}

impl From<RangeTo<usize>> for Index {
    fn from(r: RangeTo<usize>) -> Self {
        Index::Slice {
            start: None,
            end: Some(r.end as isize),
        }
    }
}

impl From<RangeFull> for Index {
    fn from(_: RangeFull) -> Self {
        Index::all()
    }
}

impl From<&Index> for Index {
    fn from(ix: &Index) -> Self {
        ix.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_positions_count_from_end() {
        assert_eq!(Index::from(-1).resolve(4).unwrap(), Resolved::One(3));
        assert_eq!(
            Index::from(vec![-4, 0]).resolve(4).unwrap(),
            Resolved::Many(vec![0, 0])
        );
        assert!(Index::from(4).resolve(4).is_err());
        assert!(Index::from(-5).resolve(4).is_err());
    }

    #[test]
    fn slices_clamp() {
        let ix = Index::Slice {
            start: Some(-2),
            end: Some(10),
        };
        assert_eq!(ix.resolve(5).unwrap(), Resolved::Many(vec![3, 4]));
        assert_eq!(Index::from(3..1).resolve(5).unwrap(), Resolved::Many(vec![]));
    }

    #[test]
    fn wrapping() {
        assert_eq!(Index::from(-1).resolve_wrapping(20), Resolved::One(19));
        assert_eq!(
            Index::from(vec![21, -21]).resolve_wrapping(20),
            Resolved::Many(vec![1, 19])
        );
    }
}
