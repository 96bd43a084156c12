//! Value serialization capability
//!
//! The engine never assumes a particular wire format for values; it
//! requires a `(encode, decode)` pair of pure functions. [`BincodeCodec`]
//! is the default used by the storage crate for node and value blobs.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A serialization capability for values of type `V`.
pub trait Codec<V>: Send + Sync {
    /// Encode a value to bytes.
    fn encode(&self, value: &V) -> Result<Vec<u8>>;

    /// Decode a value from bytes.
    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

/// The default codec: `bincode` over any `Serialize + DeserializeOwned`
/// type.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl<V: Serialize + DeserializeOwned> Codec<V> for BincodeCodec {
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn round_trips_a_struct() {
        let codec = BincodeCodec;
        let p = Point { x: 3, y: -4 };
        let bytes = codec.encode(&p).unwrap();
        let back: Point = codec.decode(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn decode_error_on_garbage() {
        let codec = BincodeCodec;
        let err = Codec::<Point>::decode(&codec, &[0xff, 0x00]);
        assert!(err.is_err());
    }
}
