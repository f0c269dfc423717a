use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::task::TaskAction;
use crate::value::Value;

pub type StateMachineConfig = Vec<StateMachine>;
pub type StateMachineStates = Vec<StateMachineData>;

/// The persisted state of one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineData {
  pub state: String,
  #[serde(default)]
  pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachine {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub initial: String,
  /// Handlers consulted when the current state has no handler for a trigger.
  #[serde(default)]
  pub on: Vec<EventHandler>,
  pub states: HashMap<String, StateDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub on: Vec<EventHandler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHandler {
  pub trigger_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<TransitionTarget>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub actions: Option<Vec<ActionInvokeDef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum TransitionTarget {
  One(String),
  /// Evaluated with `context`, `event` and `results` bound. Returns a state
  /// name, or an object with optional `state` and `context` keys.
  Script(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvokeDef {
  pub task_action_local_id: String,
  pub data: ActionPayloadBuilder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum ActionPayloadBuilder {
  FieldMap(BTreeMap<String, ActionInvokeDefDataField>),
  Script(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum ActionInvokeDefDataField {
  /// A path from the input that triggered the action, and whether or not it's required.
  Input(String, bool),
  /// A path from the state machine's context, and whether or not it's required.
  Context(String, bool),
  /// A constant value.
  Constant(Value),
  /// A script that calculates a value.
  Script(String),
}

impl StateMachine {
  /// The state a machine starts in when a task is created.
  pub fn initial_data(&self) -> StateMachineData {
    StateMachineData {
      state: self.initial.clone(),
      context: Value::Null,
    }
  }

  pub fn has_state(&self, state: &str) -> bool {
    self.states.contains_key(state)
  }

  /// All handlers, state-local ones first, with the name of the state that
  /// declares them (`None` for machine-wide handlers).
  fn handlers(&self) -> impl Iterator<Item = (Option<&str>, &EventHandler)> {
    self
      .states
      .iter()
      .flat_map(|(name, def)| def.on.iter().map(move |h| (Some(name.as_str()), h)))
      .chain(self.on.iter().map(|h| (None, h)))
  }

  /// Check that the initial state and every fixed transition target exist and
  /// that every invoked action is bound by the task.
  pub fn validate(&self, actions: &HashMap<String, TaskAction>) -> Result<(), ConfigError> {
    if !self.has_state(&self.initial) {
      return Err(ConfigError::UnknownInitialState {
        machine: self.name.clone(),
        state: self.initial.clone(),
      });
    }

    for (state, handler) in self.handlers() {
      if let Some(TransitionTarget::One(target)) = &handler.target {
        if !self.has_state(target) {
          return Err(ConfigError::UnknownTransitionTarget {
            machine: self.name.clone(),
            state: state.unwrap_or("*").to_string(),
            target: target.clone(),
          });
        }
      }

      for invoke in handler.actions.iter().flatten() {
        if !actions.contains_key(&invoke.task_action_local_id) {
          return Err(ConfigError::UnboundAction {
            local_id: invoke.task_action_local_id.clone(),
          });
        }
      }
    }

    Ok(())
  }

  /// Trigger ids this machine's handlers listen for.
  pub fn trigger_ids(&self) -> impl Iterator<Item = &str> {
    self.handlers().map(|(_, h)| h.trigger_id.as_str())
  }
}
