//! The serializer boundary.
//!
//! The bus treats wire payloads as opaque strings; any format with
//! round-trip fidelity is acceptable. Two implementations ship here:
//! JSON (human-readable, the default) and bitcode armored as base64
//! (compact binary in a string-safe shell).

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BusError;

/// Converts a typed payload to a transport string and back.
pub trait RemoteEventSerializer: Send + Sync {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String, BusError>;

    fn deserialize<T: DeserializeOwned>(&self, value: &str) -> Result<T, BusError>;
}

/// JSON serializer backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl RemoteEventSerializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String, BusError> {
        serde_json::to_string(value).map_err(|e| BusError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, value: &str) -> Result<T, BusError> {
        serde_json::from_str(value).map_err(|e| BusError::Serialization(e.to_string()))
    }
}

/// Compact binary serializer: bitcode bytes, base64-armored into a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcodeSerializer;

impl RemoteEventSerializer for BitcodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String, BusError> {
        let bytes = bitcode::serialize(value).map_err(|e| BusError::Serialization(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    fn deserialize<T: DeserializeOwned>(&self, value: &str) -> Result<T, BusError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| BusError::Serialization(e.to_string()))?;
        bitcode::deserialize(&bytes).map_err(|e| BusError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u64,
        name: String,
    }

    #[test]
    fn json_round_trip() {
        let serializer = JsonSerializer;
        let value = Sample {
            id: 7,
            name: "widget".into(),
        };
        let wire = serializer.serialize(&value).unwrap();
        let back: Sample = serializer.deserialize(&wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn bitcode_round_trip() {
        let serializer = BitcodeSerializer;
        let value = Sample {
            id: 9,
            name: "gadget".into(),
        };
        let wire = serializer.serialize(&value).unwrap();
        // Armored payloads must be string-safe.
        assert!(wire.is_ascii());
        let back: Sample = serializer.deserialize(&wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn garbage_input_is_a_serialization_error() {
        let serializer = JsonSerializer;
        let err = serializer.deserialize::<Sample>("not json").unwrap_err();
        assert!(matches!(err, BusError::Serialization(_)));
    }
}
