//! Serialization Support
//!
//! Values are stored as UTF-8 JSON wrapped in a [`CacheEnvelope`] that records
//! which cache generation wrote them and when.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What actually sits in the byte store under every auto-cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Generation of the cache that wrote the value
    pub generation_id: String,
    /// When the value was written
    pub written_at: DateTime<Utc>,
    /// The cached value itself
    pub data: serde_json::Value,
}

impl CacheEnvelope {
    /// Wraps `item` for the given generation, stamped with the current time.
    pub fn wrap<T: Serialize + ?Sized>(item: &T, generation_id: &str) -> Result<Self> {
        Ok(Self {
            generation_id: generation_id.to_string(),
            written_at: Utc::now(),
            data: serde_json::to_value(item)?,
        })
    }

    /// Deserializes the wrapped value.
    pub fn into_item<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Serializes `item` to JSON bytes.
pub fn serialize<T: Serialize + ?Sized>(item: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(item)?)
}

/// Deserializes JSON bytes. Unknown fields are ignored.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Unwraps a serialized envelope straight to the value it carries.
pub fn to_item<T: DeserializeOwned>(serialized_envelope: &[u8]) -> Result<T> {
    deserialize::<CacheEnvelope>(serialized_envelope)?.into_item()
}
