//! Engine error types.
//!
//! These are run-level failures: they abort the whole run and leave the
//! task's state unchanged. Failures of individual actions and dataflow nodes
//! are recorded in the run's audit entry instead.

use cadence_config::{ConfigError, TaskKind};
use cadence_script::ScriptError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("task '{0}' is disabled")]
  TaskDisabled(String),

  #[error("task config is {config} but its state is {state}")]
  StateMismatch { config: TaskKind, state: TaskKind },

  /// A machine's persisted state is not one of its declared states.
  #[error("machine '{machine}' is in unknown state '{state}'")]
  UnknownState { machine: String, state: String },

  /// A transition resolved to a state the machine does not declare.
  #[error("machine '{machine}' cannot transition to '{target}'")]
  InvalidTransitionTarget { machine: String, target: String },

  #[error("invalid graph: {0}")]
  InvalidGraph(#[source] ConfigError),

  /// No trigger node in a dataflow graph matches the event.
  #[error("no trigger node for '{0}'")]
  TriggerNotFound(String),

  #[error("script failed: {0}")]
  Script(#[from] ScriptError),

  /// A script task's stored context is not valid JSON.
  #[error("invalid stored context: {0}")]
  Context(#[source] serde_json::Error),

  #[error("run cancelled")]
  Cancelled,

  #[error("task runner is closed")]
  RunnerClosed,
}
