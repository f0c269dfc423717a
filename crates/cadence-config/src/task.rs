use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{AccountId, ActionId};
use crate::dataflow::{DataFlowConfig, DataFlowNodeFunction, DataFlowState};
use crate::error::ConfigError;
use crate::state_machine::{StateMachineConfig, StateMachineStates};
use crate::value::Value;

/// A configured unit of automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub task_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alias: Option<String>,
  pub enabled: bool,
  pub compiled: TaskConfig,
  /// The persisted state. A task without one starts from the config's default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<TaskState>,
  /// Action bindings keyed by task-local id.
  #[serde(default)]
  pub actions: HashMap<String, TaskAction>,
  /// Trigger bindings keyed by task-local id.
  #[serde(default)]
  pub triggers: HashMap<String, TaskTrigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
  pub action_id: ActionId,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub account_id: Option<AccountId>,
  /// Entries that replace same-named entries of the action's executor template.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action_template: Option<Vec<(String, Value)>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTrigger {
  pub input_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub periodic: Option<Vec<PeriodicTaskTrigger>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTaskTrigger {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub schedule: PeriodicSchedule,
  #[serde(default)]
  pub payload: Value,
  pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeriodicSchedule {
  Cron(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskConfig {
  StateMachine(StateMachineConfig),
  Js(TaskJsConfig),
  DataFlow(DataFlowConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskState {
  StateMachine(StateMachineStates),
  Js(TaskJsState),
  DataFlow(DataFlowState),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskJsConfig {
  /// Script timeout in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout: Option<u64>,
  pub script: String,
  /// The source map for the compiled script.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub map: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskJsState {
  pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
  StateMachine,
  Js,
  DataFlow,
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::StateMachine => f.write_str("StateMachine"),
      Self::Js => f.write_str("Js"),
      Self::DataFlow => f.write_str("DataFlow"),
    }
  }
}

impl TaskConfig {
  pub fn kind(&self) -> TaskKind {
    match self {
      Self::StateMachine(_) => TaskKind::StateMachine,
      Self::Js(_) => TaskKind::Js,
      Self::DataFlow(_) => TaskKind::DataFlow,
    }
  }

  /// The state a freshly created task starts with.
  pub fn default_state(&self) -> TaskState {
    match self {
      Self::StateMachine(machines) => {
        TaskState::StateMachine(machines.iter().map(|m| m.initial_data()).collect())
      }
      Self::Js(_) => TaskState::Js(TaskJsState::default()),
      Self::DataFlow(config) => TaskState::DataFlow(config.default_state()),
    }
  }
}

impl TaskState {
  pub fn kind(&self) -> TaskKind {
    match self {
      Self::StateMachine(_) => TaskKind::StateMachine,
      Self::Js(_) => TaskKind::Js,
      Self::DataFlow(_) => TaskKind::DataFlow,
    }
  }
}

impl Task {
  /// The stored state, or the config's default state when none is stored.
  pub fn current_state(&self) -> TaskState {
    self
      .state
      .clone()
      .unwrap_or_else(|| self.compiled.default_state())
  }

  /// Local trigger ids bound to the given input.
  pub fn triggers_for_input<'a>(&'a self, input_id: &'a str) -> impl Iterator<Item = &'a str> {
    self
      .triggers
      .iter()
      .filter(move |(_, trigger)| trigger.input_id == input_id)
      .map(|(local_id, _)| local_id.as_str())
  }

  /// Statically validate the task's compiled config against its bindings.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(state) = &self.state {
      if state.kind() != self.compiled.kind() {
        return Err(ConfigError::StateMismatch {
          config: self.compiled.kind().to_string(),
          state: state.kind().to_string(),
        });
      }
    }

    match &self.compiled {
      TaskConfig::StateMachine(machines) => {
        for machine in machines {
          machine.validate(&self.actions)?;
          for trigger_id in machine.trigger_ids() {
            self.check_trigger(trigger_id)?;
          }
        }
      }
      TaskConfig::DataFlow(config) => {
        config.validate_order()?;
        for node in &config.nodes {
          match &node.func {
            DataFlowNodeFunction::Trigger(trigger) => self.check_trigger(&trigger.local_id)?,
            DataFlowNodeFunction::Action(action) if !self.actions.contains_key(&action.action_id) => {
              return Err(ConfigError::UnboundAction {
                local_id: action.action_id.clone(),
              });
            }
            _ => {}
          }
        }
      }
      TaskConfig::Js(_) => {}
    }

    Ok(())
  }

  fn check_trigger(&self, local_id: &str) -> Result<(), ConfigError> {
    if self.triggers.contains_key(local_id) {
      Ok(())
    } else {
      Err(ConfigError::UnboundTrigger {
        local_id: local_id.to_string(),
      })
    }
  }
}
