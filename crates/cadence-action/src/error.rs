//! Action error types.

use std::time::Duration;

use cadence_config::{ActionId, ExecutorId, Value};
use cadence_script::ScriptError;

/// Errors from building an action payload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
  /// A required input or context path was absent.
  #[error("missing required field '{0}'")]
  MissingField(String),

  /// The script computing a single field failed.
  #[error("script for field '{field}' failed: {source}")]
  Script {
    field: String,
    #[source]
    source: ScriptError,
  },

  /// The script computing the whole payload failed.
  #[error("payload script failed: {0}")]
  PayloadScript(#[source] ScriptError),
}

/// Errors raised by an executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
  /// A required template field was not provided.
  #[error("missing required field '{0}'")]
  MissingField(String),

  /// A template field had the wrong shape.
  #[error("field '{field}' must be {expected}")]
  FieldFormat { field: String, expected: String },

  /// The executor ran but the operation failed. `result` carries whatever
  /// partial output it produced.
  #[error("{message}")]
  Failed { message: String, result: Value },

  /// A script ran past the call's time limit.
  #[error("script timed out after {0:?}")]
  Timeout(Duration),

  #[error("executor cancelled")]
  Cancelled,

  /// HTTP transport failure.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

impl ExecutorError {
  /// Partial output captured before the failure, if any.
  pub fn result(&self) -> Option<&Value> {
    match self {
      Self::Failed { result, .. } if !result.is_null() => Some(result),
      _ => None,
    }
  }
}

/// Errors from invoking an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
  /// The catalog has no enabled action with this id.
  #[error("action '{0}' not found")]
  ActionNotFound(ActionId),

  /// The task has no action bound under this local id.
  #[error("task action '{0}' not found")]
  TaskActionNotFound(String),

  /// The action needs an account and the binding has none.
  #[error("action '{action_id}' requires an account")]
  AccountRequired { action_id: ActionId },

  /// No executor is registered under the action's executor id.
  #[error("executor '{0}' not found")]
  ExecutorNotFound(ExecutorId),

  #[error("executor '{executor_id}' failed: {source}")]
  ExecutorFailure {
    executor_id: ExecutorId,
    #[source]
    source: ExecutorError,
  },

  #[error("executor timed out after {timeout:?}")]
  ExecutorTimeout { timeout: Duration },

  #[error("postprocess script failed: {0}")]
  PostprocessFailed(#[source] ScriptError),

  #[error(transparent)]
  Build(#[from] BuildError),

  /// The executor template could not be rendered or did not fit the executor.
  #[error("template error: {0}")]
  Template(String),

  #[error("action cancelled")]
  Cancelled,
}

/// Errors loading an action catalog from disk.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
  #[error("failed to read catalog: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse catalog: {0}")]
  Parse(#[from] serde_json::Error),
}
