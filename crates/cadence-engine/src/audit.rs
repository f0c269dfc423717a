//! Audit entries for trigger-processing runs.

use cadence_action::ActionOutcome;
use cadence_config::{InputLogEntryAction, InputStatus, InputsLogEntry, Task, Value};
use chrono::Utc;
use uuid::Uuid;

/// Assembles the [`InputsLogEntry`] for one run.
///
/// The entry starts `pending`, collects one record per invoked action, and
/// is handed out only by [`finish`](Self::finish), after which it cannot be
/// changed.
#[derive(Debug)]
pub struct AuditRecorder {
  entry: InputsLogEntry,
}

impl AuditRecorder {
  pub fn begin(task: &Task, trigger_local_id: &str) -> Self {
    let task_trigger_name = task
      .triggers
      .get(trigger_local_id)
      .map_or_else(|| trigger_local_id.to_string(), |t| t.name.clone());

    Self {
      entry: InputsLogEntry {
        inputs_log_id: Uuid::new_v4(),
        task_name: task.name.clone(),
        task_id: task.task_id.clone(),
        input_status: InputStatus::Pending,
        info: Value::Null,
        task_trigger_name,
        task_trigger_local_id: trigger_local_id.to_string(),
        timestamp: Utc::now(),
        actions: Vec::new(),
      },
    }
  }

  pub fn run_id(&self) -> Uuid {
    self.entry.inputs_log_id
  }

  pub fn record(&mut self, outcome: &ActionOutcome) {
    self.entry.actions.push(InputLogEntryAction {
      actions_log_id: Uuid::new_v4(),
      task_action_local_id: outcome.task_action_local_id.clone(),
      task_action_name: outcome.task_action_name.clone(),
      result: outcome.result.clone(),
      status: outcome.status,
      timestamp: outcome.finished,
    });
  }

  pub fn actions(&self) -> &[InputLogEntryAction] {
    &self.entry.actions
  }

  pub fn finish(mut self, status: InputStatus, info: Value) -> InputsLogEntry {
    self.entry.input_status = status;
    self.entry.info = info;
    self.entry
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use cadence_config::ActionStatus;
  use serde_json::json;

  fn task() -> Task {
    serde_json::from_value(json!({
      "task_id": "t1",
      "name": "Audit",
      "enabled": true,
      "compiled": { "type": "Js", "data": { "script": "" } },
      "triggers": { "hook": { "input_id": "in", "name": "Webhook" } },
    }))
    .unwrap()
  }

  fn outcome(status: ActionStatus) -> ActionOutcome {
    ActionOutcome {
      task_action_local_id: "notify".to_string(),
      task_action_name: "Notify".to_string(),
      action_id: Some("notify".to_string()),
      status,
      result: json!({ "ok": true }),
      error: None,
      started: Utc::now(),
      finished: Utc::now(),
    }
  }

  #[test]
  fn test_begin_pending_with_trigger_name() {
    let recorder = AuditRecorder::begin(&task(), "hook");
    let entry = recorder.finish(InputStatus::Success, json!({ "handled": false }));
    assert_eq!(entry.task_trigger_name, "Webhook");
    assert_eq!(entry.task_trigger_local_id, "hook");
    assert_eq!(entry.input_status, InputStatus::Success);
    assert!(entry.actions.is_empty());
  }

  #[test]
  fn test_unknown_trigger_uses_local_id() {
    let entry = AuditRecorder::begin(&task(), "manual").finish(InputStatus::Error, Value::Null);
    assert_eq!(entry.task_trigger_name, "manual");
  }

  #[test]
  fn test_records_actions_in_order() {
    let mut recorder = AuditRecorder::begin(&task(), "hook");
    recorder.record(&outcome(ActionStatus::Success));
    recorder.record(&outcome(ActionStatus::Error));

    let entry = recorder.finish(InputStatus::Error, Value::Null);
    let statuses: Vec<ActionStatus> = entry.actions.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![ActionStatus::Success, ActionStatus::Error]);
    assert_ne!(entry.actions[0].actions_log_id, entry.actions[1].actions_log_id);
  }
}
