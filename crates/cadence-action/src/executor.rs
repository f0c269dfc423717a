//! Executor abstraction.
//!
//! An executor performs the external side effect of an action. The invoker
//! hands it the rendered template and the raw payload; everything else
//! (timeouts, cancellation, postprocessing) is handled around it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_config::{AccountId, ExecutorId, ExecutorInfo, TemplateFields, Value};
use cadence_script::ScriptEvaluator;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::executors::{HttpExecutor, ScriptExecutor};

/// Input for one executor call.
#[derive(Debug, Clone)]
pub struct ExecutorRequest {
  pub executor_id: ExecutorId,
  /// The action's rendered executor template.
  pub template: Value,
  /// The payload the template was rendered from.
  pub payload: Value,
  pub account_id: Option<AccountId>,
  /// The limit the invoker applies to this call.
  pub timeout: Duration,
  /// Cancelled when the invoker gives up on this call.
  pub cancel: CancellationToken,
}

impl ExecutorRequest {
  /// A template field as a string, if present.
  pub fn str_field(&self, name: &str) -> Result<Option<&str>, ExecutorError> {
    match self.template.get(name) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(s)) => Ok(Some(s.as_str())),
      Some(_) => Err(ExecutorError::FieldFormat {
        field: name.to_string(),
        expected: "a string".to_string(),
      }),
    }
  }

  /// A required string template field.
  pub fn required_str(&self, name: &str) -> Result<&str, ExecutorError> {
    self
      .str_field(name)?
      .ok_or_else(|| ExecutorError::MissingField(name.to_string()))
  }

  /// A template field of any type, if present and not null.
  pub fn field(&self, name: &str) -> Option<&Value> {
    self.template.get(name).filter(|v| !v.is_null())
  }
}

/// Performs the side effect of an action.
#[async_trait]
pub trait Executor: Send + Sync {
  fn name(&self) -> &str;

  /// Fields this executor reads from its template.
  fn template_fields(&self) -> &TemplateFields;

  async fn execute(&self, request: ExecutorRequest) -> Result<Value, ExecutorError>;
}

/// Executors by id.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
  executors: HashMap<ExecutorId, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with the `script` and `http` executors.
  pub fn with_builtins(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
    let mut registry = Self::new();
    registry.register(Arc::new(ScriptExecutor::new(evaluator)));
    registry.register(Arc::new(HttpExecutor::new()));
    registry
  }

  /// Register an executor under its name, replacing any previous one.
  pub fn register(&mut self, executor: Arc<dyn Executor>) {
    self.executors.insert(executor.name().to_string(), executor);
  }

  pub fn get(&self, executor_id: &str) -> Option<Arc<dyn Executor>> {
    self.executors.get(executor_id).cloned()
  }

  /// Descriptions of every registered executor, sorted by name.
  pub fn info(&self) -> Vec<ExecutorInfo> {
    let mut info: Vec<ExecutorInfo> = self
      .executors
      .values()
      .map(|e| ExecutorInfo {
        name: e.name().to_string(),
        template_fields: e.template_fields().clone(),
      })
      .collect();
    info.sort_by(|a, b| a.name.cmp(&b.name));
    info
  }
}

impl std::fmt::Debug for ExecutorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
    names.sort_unstable();
    f.debug_struct("ExecutorRegistry")
      .field("executors", &names)
      .finish()
  }
}
