//! Built-in deserializers

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::{DeserializeError, Deserializer};

fn require<'a>(topic: &str, data: Option<&'a [u8]>) -> Result<&'a [u8], DeserializeError> {
    data.ok_or_else(|| DeserializeError::new(format!("null data on topic '{topic}'")))
}

/// UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl Deserializer<String> for StringDeserializer {
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<String, DeserializeError> {
        let bytes = require(topic, data)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DeserializeError::new(format!("invalid UTF-8: {e}")))
    }
}

/// Raw bytes, untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDeserializer;

impl Deserializer<Bytes> for BytesDeserializer {
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<Bytes, DeserializeError> {
        require(topic, data).map(Bytes::copy_from_slice)
    }
}

/// Big-endian 8 byte signed integer
#[derive(Debug, Clone, Copy, Default)]
pub struct LongDeserializer;

impl Deserializer<i64> for LongDeserializer {
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<i64, DeserializeError> {
        let bytes = require(topic, data)?;
        let array: [u8; 8] = bytes.try_into().map_err(|_| {
            DeserializeError::new(format!(
                "size of data received by LongDeserializer is not 8 but {}",
                bytes.len()
            ))
        })?;
        Ok(i64::from_be_bytes(array))
    }
}

/// JSON document decoded with serde
pub struct JsonDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deserializer<T> for JsonDeserializer<T>
where
    T: DeserializeOwned,
{
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<T, DeserializeError> {
        let bytes = require(topic, data)?;
        serde_json::from_slice(bytes).map_err(|e| DeserializeError::new(format!("invalid JSON: {e}")))
    }
}

/// Maps absent data to `None` and delegates everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct Nullable<D>(pub D);

impl<T, D> Deserializer<Option<T>> for Nullable<D>
where
    D: Deserializer<T>,
{
    fn deserialize(&self, topic: &str, data: Option<&[u8]>) -> Result<Option<T>, DeserializeError> {
        match data {
            None => Ok(None),
            Some(bytes) => self.0.deserialize(topic, Some(bytes)).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u32,
    }

    #[test]
    fn test_string() {
        let value = StringDeserializer.deserialize("t", Some(b"hello")).unwrap();
        assert_eq!(value, "hello");
        assert!(StringDeserializer.deserialize("t", Some(&[0xff, 0xfe])).is_err());
        assert!(StringDeserializer.deserialize("t", None).is_err());
    }

    #[test]
    fn test_long() {
        let bytes = 42i64.to_be_bytes();
        assert_eq!(LongDeserializer.deserialize("t", Some(&bytes)).unwrap(), 42);
        let err = LongDeserializer.deserialize("t", Some(b"abc")).unwrap_err();
        assert!(err.message().contains("not 8 but 3"), "got: {err}");
    }

    #[test]
    fn test_json() {
        let deserializer = JsonDeserializer::<Order>::new();
        let order = deserializer.deserialize("t", Some(br#"{"id": 7}"#)).unwrap();
        assert_eq!(order, Order { id: 7 });
        assert!(deserializer.deserialize("t", Some(b"{")).is_err());
    }

    #[test]
    fn test_nullable() {
        let deserializer = Nullable(StringDeserializer);
        assert_eq!(deserializer.deserialize("t", None).unwrap(), None);
        assert_eq!(
            deserializer.deserialize("t", Some(b"k")).unwrap(),
            Some("k".to_string())
        );
    }
}
