//! Size-adaptive serializer
//!
//! Payloads at or under 1 KiB use the standard `serde_json` path; larger
//! payloads use the SIMD-accelerated `simd_json` path. A SIMD failure never
//! fails the call — it falls back to the standard serializer, the one kind
//! of error this crate recovers from locally rather than surfacing.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KernelError, KernelResult};

/// Payloads at or under this size use the standard serializer.
pub const SIMD_THRESHOLD_BYTES: usize = 1024;

pub fn serialize<T: Serialize>(value: &T) -> KernelResult<Vec<u8>> {
    let standard = standard_serialize(value)?;
    if standard.len() <= SIMD_THRESHOLD_BYTES {
        return Ok(standard);
    }
    Ok(simd_serialize(value).unwrap_or(standard))
}

/// Force the SIMD path regardless of size, with the same mandatory
/// fallback. Used for the specialized batch payloads the spec calls out
/// (directory listings, queue message batches) that always prefer SIMD.
pub fn serialize_simd_preferred<T: Serialize>(value: &T) -> KernelResult<Vec<u8>> {
    match simd_serialize(value) {
        Some(bytes) => Ok(bytes),
        None => standard_serialize(value),
    }
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> KernelResult<T> {
    if bytes.len() <= SIMD_THRESHOLD_BYTES {
        return standard_deserialize(bytes);
    }
    match simd_deserialize(bytes) {
        Some(value) => Ok(value),
        None => standard_deserialize(bytes),
    }
}

fn standard_serialize<T: Serialize>(value: &T) -> KernelResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| KernelError::Serialization(e.to_string()))
}

fn standard_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> KernelResult<T> {
    serde_json::from_slice(bytes).map_err(|e| KernelError::Serialization(e.to_string()))
}

fn simd_serialize<T: Serialize>(value: &T) -> Option<Vec<u8>> {
    simd_json::to_vec(value).ok()
}

fn simd_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    let mut buf = bytes.to_vec();
    simd_json::from_slice(&mut buf).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Small {
        a: u32,
    }

    #[test]
    fn small_payload_round_trips_through_standard_path() {
        let value = Small { a: 7 };
        let bytes = serialize(&value).unwrap();
        assert!(bytes.len() <= SIMD_THRESHOLD_BYTES);
        assert_eq!(deserialize::<Small>(&bytes).unwrap(), value);
    }

    #[test]
    fn large_payload_round_trips_through_simd_path() {
        let value: Vec<u32> = (0..2000).collect();
        let bytes = serialize(&value).unwrap();
        assert!(bytes.len() > SIMD_THRESHOLD_BYTES);
        assert_eq!(deserialize::<Vec<u32>>(&bytes).unwrap(), value);
    }

    #[test]
    fn simd_preferred_path_still_round_trips_small_values() {
        let value = Small { a: 3 };
        let bytes = serialize_simd_preferred(&value).unwrap();
        assert_eq!(deserialize::<Small>(&bytes).unwrap(), value);
    }
}
