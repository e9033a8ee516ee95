//! Payload codec abstraction and the JSON implementation.
//!
//! Marshals the payload type to and from the wire representation used by the
//! transport and the dead-letter sink. Both directions may fail; decode
//! failures are surfaced to the caller's error hook rather than silently
//! dropped or retried forever.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Serializer contract between payload type and wire bytes.
pub trait ItemCodec<T>: Send + Sync + 'static {
    /// Serializes a payload to its wire representation.
    fn serialize(&self, item: &T) -> Result<Vec<u8>>;

    /// Deserializes a payload from its wire representation.
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec backed by serde.
///
/// The default wire format: dead-lettered payloads stay human-readable for
/// manual inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a new JSON codec.
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> ItemCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn serialize(&self, item: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(item).map_err(|e| CoreError::encode(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AuditRecord {
        command: String,
        dispatched_ms: u64,
    }

    #[test]
    fn json_codec_round_trips_payload() {
        let codec = JsonCodec::<AuditRecord>::new();
        let record = AuditRecord { command: "create-order".into(), dispatched_ms: 42 };

        let bytes = codec.serialize(&record).expect("serialize");
        let decoded = codec.deserialize(&bytes).expect("deserialize");

        assert_eq!(decoded, record);
    }

    #[test]
    fn malformed_input_is_decode_error() {
        let codec = JsonCodec::<AuditRecord>::new();

        let error = codec.deserialize(b"{not json").unwrap_err();
        assert!(error.is_codec());
        assert!(matches!(error, CoreError::Decode { .. }));
    }

    #[test]
    fn truncated_input_is_decode_error() {
        let codec = JsonCodec::<AuditRecord>::new();
        let record = AuditRecord { command: "create-order".into(), dispatched_ms: 42 };
        let bytes = codec.serialize(&record).expect("serialize");

        let error = codec.deserialize(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(error, CoreError::Decode { .. }));
    }
}
