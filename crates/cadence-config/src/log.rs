//! Audit records written for every trigger event a task receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputStatus {
  Pending,
  Success,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
  Pending,
  Running,
  Success,
  Error,
}

impl ActionStatus {
  pub fn is_finished(self) -> bool {
    matches!(self, Self::Success | Self::Error)
  }
}

/// One trigger-processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsLogEntry {
  pub inputs_log_id: Uuid,
  pub task_name: String,
  pub task_id: String,
  pub input_status: InputStatus,
  pub info: Value,
  pub task_trigger_name: String,
  pub task_trigger_local_id: String,
  pub timestamp: DateTime<Utc>,
  pub actions: Vec<InputLogEntryAction>,
}

/// The outcome of one action invoked during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLogEntryAction {
  pub actions_log_id: Uuid,
  pub task_action_local_id: String,
  pub task_action_name: String,
  pub result: Value,
  pub status: ActionStatus,
  pub timestamp: DateTime<Utc>,
}
