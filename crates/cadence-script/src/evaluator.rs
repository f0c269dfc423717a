use std::sync::Arc;
use std::time::Duration;

use cadence_config::Value;
use cadence_config::value::Map;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ScriptError;

/// Variables made visible to a script, by name.
pub type Bindings = Map<String, Value>;

/// How the code of a request is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptFormat {
  /// Try the code as an expression first, then as a statement block.
  #[default]
  Auto,
  /// The code is a single expression whose value is the result.
  Expression,
  /// The code is a function body; its `return` value is the result.
  Body,
}

/// A single evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
  pub code: &'a str,
  pub bindings: &'a Bindings,
  pub format: ScriptFormat,
  /// Wall-clock limit. The evaluator's default applies when unset.
  pub timeout: Option<Duration>,
  /// Bind the `run_action(local_id, payload)` capability.
  pub capture_actions: bool,
  /// Checked alongside the deadline; the script stops once it fires.
  pub cancel: Option<&'a CancellationToken>,
}

impl<'a> ScriptRequest<'a> {
  pub fn new(code: &'a str, bindings: &'a Bindings) -> Self {
    Self {
      code,
      bindings,
      format: ScriptFormat::Auto,
      timeout: None,
      capture_actions: false,
      cancel: None,
    }
  }

  pub fn format(mut self, format: ScriptFormat) -> Self {
    self.format = format;
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_actions(mut self) -> Self {
    self.capture_actions = true;
    self
  }

  pub fn cancel(mut self, cancel: &'a CancellationToken) -> Self {
    self.cancel = Some(cancel);
    self
  }
}

/// A line printed by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
  pub message: String,
}

/// An action the script asked to run through `run_action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
  pub task_action_local_id: String,
  pub payload: Value,
}

/// Everything a successful evaluation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
  pub value: Value,
  pub console: Vec<ConsoleMessage>,
  pub actions: Vec<ActionRequest>,
}

/// Evaluates embedded scripts.
///
/// Calls are synchronous and must not share mutable state: nothing a script
/// defines survives into the next call. Async callers go through
/// [`run_blocking`].
pub trait ScriptEvaluator: Send + Sync {
  /// Run a script and collect its result, console output and action requests.
  fn run(&self, request: ScriptRequest<'_>) -> Result<ScriptOutput, ScriptError>;

  /// Evaluate `code` with the given bindings and return its value.
  fn evaluate(&self, code: &str, bindings: &Bindings) -> Result<Value, ScriptError> {
    self
      .run(ScriptRequest::new(code, bindings))
      .map(|output| output.value)
  }
}

/// Run `request` on the blocking thread pool so a long script never holds an
/// async worker.
///
/// When the request carries a cancellation token the call returns
/// [`ScriptError::Cancelled`] as soon as the token fires; the interpreter
/// itself stops at its next hook check.
pub async fn run_blocking(
  evaluator: Arc<dyn ScriptEvaluator>,
  request: ScriptRequest<'_>,
) -> Result<ScriptOutput, ScriptError> {
  let code = request.code.to_string();
  let bindings = request.bindings.clone();
  let format = request.format;
  let timeout = request.timeout;
  let capture_actions = request.capture_actions;
  let cancel = request.cancel.cloned();
  let token = cancel.clone();

  let task = tokio::task::spawn_blocking(move || {
    evaluator.run(ScriptRequest {
      code: &code,
      bindings: &bindings,
      format,
      timeout,
      capture_actions,
      cancel: token.as_ref(),
    })
  });

  let joined = match cancel {
    Some(cancel) => tokio::select! {
      _ = cancel.cancelled() => return Err(ScriptError::Cancelled),
      joined = task => joined,
    },
    None => task.await,
  };
  joined.map_err(|e| ScriptError::Runtime(format!("script task failed: {e}")))?
}
