//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every run of an engine.
///
/// Durations are written in milliseconds:
///
/// ```json
/// { "default_action_timeout": 30000, "script_timeout": 5000, "queue_size": 100 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Applied to actions whose catalog entry has no timeout.
  #[serde(with = "millis")]
  pub default_action_timeout: Duration,
  /// Wall-clock limit for every script the engine evaluates.
  #[serde(with = "millis")]
  pub script_timeout: Duration,
  /// Pending trigger events a task runner buffers.
  pub queue_size: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_action_timeout: Duration::from_secs(30),
      script_timeout: Duration::from_secs(5),
      queue_size: 100,
    }
  }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
