// Engine configuration and validation

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{EngineError, Result};

const MAX_QUEUE_NAME_LEN: usize = 64;

/// Which transport backs a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    GoChannel,
    Sqs,
}

/// In-memory channel source settings. `size` 0 maps to the smallest bounded
/// capacity (see `ChannelSource::new`).
#[derive(Debug, Clone, Deserialize)]
pub struct GoChannelConfig {
    pub size: usize,
}

/// SQS source settings. Field ranges follow the SQS receive API.
#[derive(Debug, Clone, Deserialize)]
pub struct SqsConfig {
    pub queue_url: String,
    pub region: String,
    #[serde(default)]
    pub use_local_sqs: bool,
    #[serde(default = "default_max_number_of_messages")]
    pub max_number_of_messages: i32,
    #[serde(default)]
    pub wait_time_seconds: i32,
}

fn default_max_number_of_messages() -> i32 {
    1
}

/// One configured queue: a name, a transport, and the two-level concurrency
/// budget. Disabled queues materialize no source and no worker.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub queue_type: QueueType,
    pub queue_concurrency: usize,
    pub worker_concurrency: usize,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub go_channel: Option<GoChannelConfig>,
    #[serde(default)]
    pub sqs: Option<SqsConfig>,
}

impl QueueConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EngineError::Config("queue name cannot be empty".to_string()));
        }
        if self.name.len() > MAX_QUEUE_NAME_LEN {
            return Err(EngineError::Config(format!(
                "queue name too long (max {} chars, got {})",
                MAX_QUEUE_NAME_LEN,
                self.name.len()
            )));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(EngineError::Config(format!(
                "queue name '{}' must be alphanumeric with _ or -",
                self.name
            )));
        }
        if self.queue_concurrency == 0 {
            return Err(EngineError::Config(format!(
                "queue '{}': queue_concurrency must be >= 1",
                self.name
            )));
        }
        if self.worker_concurrency == 0 {
            return Err(EngineError::Config(format!(
                "queue '{}': worker_concurrency must be >= 1",
                self.name
            )));
        }
        match self.queue_type {
            QueueType::GoChannel => {
                if self.go_channel.is_none() {
                    return Err(EngineError::Config(format!(
                        "queue '{}': go_channel block is required for queue_type go_channel",
                        self.name
                    )));
                }
            }
            QueueType::Sqs => {
                let Some(sqs) = self.sqs.as_ref() else {
                    return Err(EngineError::Config(format!(
                        "queue '{}': sqs block is required for queue_type sqs",
                        self.name
                    )));
                };
                sqs.validate(&self.name)?;
            }
        }
        Ok(())
    }
}

impl SqsConfig {
    fn validate(&self, queue_name: &str) -> Result<()> {
        if self.queue_url.is_empty() {
            return Err(EngineError::Config(format!(
                "queue '{queue_name}': sqs.queue_url cannot be empty"
            )));
        }
        if self.region.is_empty() {
            return Err(EngineError::Config(format!(
                "queue '{queue_name}': sqs.region cannot be empty"
            )));
        }
        if !(1..=10).contains(&self.max_number_of_messages) {
            return Err(EngineError::Config(format!(
                "queue '{queue_name}': sqs.max_number_of_messages must be in 1..=10, got {}",
                self.max_number_of_messages
            )));
        }
        if !(0..=20).contains(&self.wait_time_seconds) {
            return Err(EngineError::Config(format!(
                "queue '{queue_name}': sqs.wait_time_seconds must be in 0..=20, got {}",
                self.wait_time_seconds
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
///
/// The JSON document may be either this object or a bare array of queues;
/// `log_enabled` gates the per-job completion log line and defaults to on.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_enabled")]
    pub log_enabled: bool,
    pub queues: Vec<QueueConfig>,
}

fn default_log_enabled() -> bool {
    true
}

// Accepts both shapes the wire allows: {log_enabled, queues: [...]} or [...].
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Object(EngineConfig),
    List(Vec<QueueConfig>),
}

impl EngineConfig {
    /// Parse a configuration document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(text)
            .map_err(|err| EngineError::Config(format!("invalid config JSON: {err}")))?;
        Ok(match doc {
            ConfigDocument::Object(config) => config,
            ConfigDocument::List(queues) => EngineConfig {
                log_enabled: default_log_enabled(),
                queues,
            },
        })
    }

    /// Validate every queue and reject duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(EngineError::Config("no queues configured".to_string()));
        }
        let mut seen = HashSet::new();
        for queue in &self.queues {
            queue.validate()?;
            if !seen.insert(queue.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate queue name '{}'",
                    queue.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY_CONFIG: &str = r#"[
        {
            "name": "queue-1",
            "queue_type": "go_channel",
            "queue_concurrency": 3,
            "worker_concurrency": 100,
            "enabled": true,
            "go_channel": { "size": 0 }
        }
    ]"#;

    const OBJECT_CONFIG: &str = r#"{
        "log_enabled": false,
        "queues": [
            {
                "name": "queue-1",
                "queue_type": "sqs",
                "queue_concurrency": 3,
                "worker_concurrency": 100,
                "enabled": true,
                "sqs": {
                    "queue_url": "http://localhost:4100/100010001000/integration-test",
                    "use_local_sqs": true,
                    "region": "us-east-1",
                    "max_number_of_messages": 2,
                    "wait_time_seconds": 2
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_array_shape() {
        let config = EngineConfig::from_json(ARRAY_CONFIG).unwrap();
        assert!(config.log_enabled);
        assert_eq!(config.queues.len(), 1);
        assert_eq!(config.queues[0].queue_type, QueueType::GoChannel);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_object_shape() {
        let config = EngineConfig::from_json(OBJECT_CONFIG).unwrap();
        assert!(!config.log_enabled);
        let sqs = config.queues[0].sqs.as_ref().unwrap();
        assert!(sqs.use_local_sqs);
        assert_eq!(sqs.max_number_of_messages, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_reject_unknown_queue_type() {
        let text = r#"[{"name":"q","queue_type":"rabbitmq","queue_concurrency":1,"worker_concurrency":1}]"#;
        assert!(EngineConfig::from_json(text).is_err());
    }

    #[test]
    fn test_reject_duplicate_names() {
        let mut config = EngineConfig::from_json(ARRAY_CONFIG).unwrap();
        config.queues.push(config.queues[0].clone());
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_reject_zero_concurrency() {
        let mut config = EngineConfig::from_json(ARRAY_CONFIG).unwrap();
        config.queues[0].worker_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_empty_name() {
        let mut config = EngineConfig::from_json(ARRAY_CONFIG).unwrap();
        config.queues[0].name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_missing_source_block() {
        let mut config = EngineConfig::from_json(ARRAY_CONFIG).unwrap();
        config.queues[0].go_channel = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_sqs_out_of_range() {
        let mut config = EngineConfig::from_json(OBJECT_CONFIG).unwrap();
        config.queues[0].sqs.as_mut().unwrap().max_number_of_messages = 11;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::from_json(OBJECT_CONFIG).unwrap();
        config.queues[0].sqs.as_mut().unwrap().wait_time_seconds = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_empty_config() {
        let config = EngineConfig::from_json("[]").unwrap();
        assert!(config.validate().is_err());
    }
}
