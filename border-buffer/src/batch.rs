//! A schema-free, nested, columnar record type.
//!
//! [`Batch`] is the value exchanged between collectors, buffers and policies.
//! Each key maps to a [`Value`]: a dynamic-dimensional numeric, boolean or
//! object array, a list, a nested [`Batch`], or a candle tensor. All values
//! share a leading batch axis, which [`Index`] selects along.
//!
//! # Key Components
//!
//! - [`Batch`]: the record, with indexing, concatenation, stacking, splitting
//!   and key-wise arithmetic
//! - [`Value`]: the tagged value stored under each key
//! - [`Object`]: elements of object arrays (missing values, strings, opaque handles)
//! - [`Index`]: integer, slice and list selectors; negative positions count from the end
mod base;
mod index;
mod object;
mod ops;
mod tensor;
mod value;
pub use base::Batch;
pub use index::{Index, Resolved};
pub use object::Object;
pub use ops::Split;
pub use value::Value;
