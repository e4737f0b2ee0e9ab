// Job envelope and runtime state

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::port::source::AckToken;

/// Wire-level job envelope.
///
/// `payload` is carried through to the handler bit-identical; the engine
/// never inspects it. Handlers re-parse it as needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDesc {
    pub job_id: String,
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl JobDesc {
    /// Decode an envelope from raw message bytes and validate it.
    pub fn decode(raw: &[u8]) -> Result<Self, EngineError> {
        let desc: JobDesc = serde_json::from_slice(raw)
            .map_err(|err| EngineError::InvalidMessage(err.to_string()))?;
        desc.validate()?;
        Ok(desc)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.job_id.is_empty() {
            return Err(EngineError::InvalidMessage("job_id is empty".to_string()));
        }
        if self.job_type.is_empty() {
            return Err(EngineError::InvalidMessage("job_type is empty".to_string()));
        }
        Ok(())
    }
}

/// Runtime job state. Created by the worker on successful decode, owned by
/// exactly one run task, handed to the done channel after the handler's
/// `done` returns.
#[derive(Debug)]
pub struct Job {
    pub desc: JobDesc,
    pub queue_name: String,
    pub received_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub duration: Option<Duration>,
    pub raw: Vec<u8>,
    pub(crate) token: AckToken,
}

impl Job {
    pub(crate) fn new(desc: JobDesc, queue_name: String, raw: Vec<u8>, token: AckToken) -> Self {
        Self {
            desc,
            queue_name,
            received_at: Instant::now(),
            started_at: None,
            finished_at: None,
            duration: None,
            raw,
            token,
        }
    }

    /// Payload as a string slice, when the envelope carried a JSON string.
    pub fn payload_str(&self) -> Option<&str> {
        self.desc.payload.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_string_payload() {
        let raw = br#"{"job_id":"id-1","job_type":"type-1","payload":"foo"}"#;
        let desc = JobDesc::decode(raw).unwrap();
        assert_eq!(desc.job_id, "id-1");
        assert_eq!(desc.job_type, "type-1");
        assert_eq!(desc.payload, json!("foo"));
    }

    #[test]
    fn test_decode_nested_payload_is_bit_identical() {
        let raw = br#"{"job_id":"id-1","job_type":"type-1","payload":{"id":"foo","n":42}}"#;
        let desc = JobDesc::decode(raw).unwrap();
        assert_eq!(desc.payload, json!({"id": "foo", "n": 42}));
    }

    #[test]
    fn test_decode_missing_payload_defaults_to_null() {
        let raw = br#"{"job_id":"id-1","job_type":"type-1"}"#;
        let desc = JobDesc::decode(raw).unwrap();
        assert!(desc.payload.is_null());
    }

    #[test]
    fn test_decode_rejects_empty_job_id() {
        let raw = br#"{"job_id":"","job_type":"type-1","payload":"foo"}"#;
        let result = JobDesc::decode(raw);
        assert!(matches!(result, Err(EngineError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_rejects_missing_job_type() {
        let raw = br#"{"job_id":"id-1","payload":"foo"}"#;
        assert!(JobDesc::decode(raw).is_err());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(JobDesc::decode(b"not json at all").is_err());
    }
}
