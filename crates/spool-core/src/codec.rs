//! Codec abstraction
//!
//! A codec converts domain objects to and from the opaque payloads the store
//! persists. Either direction may fail; the store reacts differently to each
//! (encode failures reject the append, decode failures purge the record).

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Converts items to and from stored payloads
pub trait Codec: Send + Sync {
    /// Domain type handled by this codec
    type Item;

    /// Encode an item into a payload
    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload back into an item
    fn decode(&self, payload: &[u8]) -> Result<Self::Item, CodecError>;
}

/// JSON codec for any serde type
#[derive(Debug)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a new JSON codec
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Codec for JsonCodec<T> {
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(item).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
