use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("dataflow graph contains a cycle through nodes {nodes:?}")]
  Cycle { nodes: Vec<u32> },

  #[error("edge references unknown node: from={from}, to={to} (graph has {nodes} nodes)")]
  EdgeOutOfRange { from: u32, to: u32, nodes: usize },

  #[error("invalid execution order: {message}")]
  InvalidOrder { message: String },

  #[error("machine '{machine}' has unknown initial state '{state}'")]
  UnknownInitialState { machine: String, state: String },

  #[error("machine '{machine}' state '{state}' transitions to unknown state '{target}'")]
  UnknownTransitionTarget {
    machine: String,
    state: String,
    target: String,
  },

  #[error("action '{local_id}' is not bound by the task")]
  UnboundAction { local_id: String },

  #[error("trigger '{local_id}' is not bound by the task")]
  UnboundTrigger { local_id: String },

  #[error("task config is {config} but its state is {state}")]
  StateMismatch { config: String, state: String },
}
