use std::any::Any;
use std::sync::Arc;

/// A session attribute.
///
/// Attributes are either plain byte buffers or shared typed objects. Both
/// release their storage when the session is removed or expires; typed
/// objects run their destructor once the last handle is gone.
#[derive(Clone)]
pub enum SessionValue {
    /// An owned byte buffer.
    Bytes(Vec<u8>),
    /// A shared typed object, retrieved by downcasting.
    Object(Arc<dyn Any + Send + Sync>),
}

impl SessionValue {
    /// Wraps a typed object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }

    /// The byte payload, or `None` for object attributes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Object(_) => None,
        }
    }

    /// Downcasts an object attribute to a concrete type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Bytes(_) => None,
            Self::Object(object) => Arc::clone(object).downcast::<T>().ok(),
        }
    }
}

impl std::fmt::Debug for SessionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Object(_) => f.debug_tuple("Object").finish(),
        }
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for SessionValue {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let value = SessionValue::from("hello");
        assert_eq!(value.as_bytes(), Some(b"hello".as_slice()));
        assert!(value.downcast::<String>().is_none());
    }

    #[test]
    fn test_object_downcast() {
        let value = SessionValue::object(42u64);
        assert_eq!(value.downcast::<u64>().as_deref(), Some(&42));
        assert!(value.downcast::<u32>().is_none());
        assert!(value.as_bytes().is_none());
    }
}
