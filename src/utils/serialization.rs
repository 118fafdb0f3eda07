// JSON helpers shared by the wire codec and the block hasher
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data to a compact JSON byte vector
pub fn serialize<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(data)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data from JSON bytes
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_slice(bytes)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))
}

/// Compact JSON text of a value, used as a hash input
pub fn to_json_string<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}
