//! Element type of object-valued columns.
use serde::{de::Deserializer, ser::Error as _, Deserialize, Serialize, Serializer};
use std::{any::Any, fmt, sync::Arc};

/// An element of an object column.
///
/// Object columns hold values that are neither numbers nor booleans: missing
/// entries, strings, and opaque handles owned by the caller (e.g. an environment
/// reference attached to `info`). Opaque handles can be stored and indexed like
/// anything else, but they cannot be serialized.
#[derive(Clone)]
pub enum Object {
    /// Missing value, also used to backfill object columns.
    None,

    /// A string.
    Str(String),

    /// An opaque, shared handle.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Object {
    /// Wraps an arbitrary value into an opaque handle.
    pub fn opaque<T: Any + Send + Sync>(v: T) -> Self {
        Object::Opaque(Arc::new(v))
    }

    /// Returns `true` for [`Object::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, Object::None)
    }

    /// Returns the string if this is [`Object::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Downcasts an opaque handle.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Object::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::None
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::None => write!(f, "None"),
            Object::Str(s) => write!(f, "{:?}", s),
            Object::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::None, Object::None) => true,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Opaque(a), Object::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::Str(s.to_string())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::Str(s)
    }
}

#[derive(Serialize, Deserialize)]
enum ObjectRepr {
    None,
    Str(String),
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Object::None => ObjectRepr::None.serialize(serializer),
            Object::Str(s) => ObjectRepr::Str(s.clone()).serialize(serializer),
            Object::Opaque(_) => Err(S::Error::custom("opaque objects cannot be serialized")),
        }
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ObjectRepr::deserialize(deserializer)? {
            ObjectRepr::None => Object::None,
            ObjectRepr::Str(s) => Object::Str(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_equality_is_identity() {
        let a = Object::opaque(3usize);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Object::opaque(3usize));
        assert_eq!(a.downcast_ref::<usize>(), Some(&3));
    }

    #[test]
    fn opaque_refuses_serialization() {
        assert!(bincode::serialize(&Object::from("x")).is_ok());
        assert!(bincode::serialize(&Object::opaque(1u8)).is_err());
    }
}
