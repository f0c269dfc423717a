//! Action invocation.
//!
//! [`ActionInvoker`] resolves a task's action binding against the catalog,
//! renders the executor template, calls the executor under a timeout and a
//! cancellation token, then runs the action's postprocess script. Every call
//! produces an [`ActionOutcome`]; failures are captured in it rather than
//! returned.

use std::sync::Arc;
use std::time::Duration;

use cadence_config::value::Map;
use cadence_config::{ActionId, ActionInvokeDef, ActionStatus, Task, TaskAction, Value};
use cadence_script::{Bindings, ScriptError, ScriptEvaluator, ScriptRequest, run_blocking};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::ActionCatalog;
use crate::error::{ActionError, ExecutorError};
use crate::executor::{ExecutorRegistry, ExecutorRequest};
use crate::payload::build_payload;
use crate::template::{check_template_fields, render_template};

/// Applied to actions that do not declare a timeout.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The result of one action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
  pub task_action_local_id: String,
  pub task_action_name: String,
  /// The catalog action, when the binding could be resolved.
  pub action_id: Option<ActionId>,
  pub status: ActionStatus,
  /// The (postprocessed) executor result, or `{ "error", "result"? }` on failure.
  pub result: Value,
  pub error: Option<String>,
  pub started: DateTime<Utc>,
  pub finished: DateTime<Utc>,
}

impl ActionOutcome {
  pub fn succeeded(&self) -> bool {
    self.status == ActionStatus::Success
  }

  /// A failed outcome for `error`, finished now.
  pub fn failure(
    local_id: &str,
    name: &str,
    action_id: Option<ActionId>,
    error: &ActionError,
    started: DateTime<Utc>,
  ) -> Self {
    let mut result = Map::new();
    result.insert("error".to_string(), Value::String(error.to_string()));
    if let ActionError::ExecutorFailure { source, .. } = error {
      if let Some(partial) = source.result() {
        result.insert("result".to_string(), partial.clone());
      }
    }

    Self {
      task_action_local_id: local_id.to_string(),
      task_action_name: name.to_string(),
      action_id,
      status: ActionStatus::Error,
      result: Value::Object(result),
      error: Some(error.to_string()),
      started,
      finished: Utc::now(),
    }
  }
}

/// Invokes task actions through the catalog and executor registry.
pub struct ActionInvoker {
  catalog: Arc<dyn ActionCatalog>,
  executors: Arc<ExecutorRegistry>,
  evaluator: Arc<dyn ScriptEvaluator>,
  default_timeout: Duration,
}

impl ActionInvoker {
  pub fn new(
    catalog: Arc<dyn ActionCatalog>,
    executors: Arc<ExecutorRegistry>,
    evaluator: Arc<dyn ScriptEvaluator>,
  ) -> Self {
    Self {
      catalog,
      executors,
      evaluator,
      default_timeout: DEFAULT_ACTION_TIMEOUT,
    }
  }

  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  pub fn evaluator(&self) -> &Arc<dyn ScriptEvaluator> {
    &self.evaluator
  }

  pub fn executors(&self) -> &ExecutorRegistry {
    &self.executors
  }

  /// Build the payload for `def`. On failure the returned outcome is the
  /// action's result; the executor must not be called.
  pub async fn payload_for(
    &self,
    task: &Task,
    def: &ActionInvokeDef,
    input: &Value,
    context: &Value,
    cancel: &CancellationToken,
  ) -> Result<Value, ActionOutcome> {
    let started = Utc::now();
    build_payload(&self.evaluator, &def.data, input, context, cancel)
      .await
      .map_err(|e| {
        let local_id = &def.task_action_local_id;
        let binding = task.actions.get(local_id);
        let error = ActionError::Build(e);
        warn!(task_action_local_id = %local_id, error = %error, "payload build failed");
        ActionOutcome::failure(
          local_id,
          binding.map_or(local_id.as_str(), |b| b.name.as_str()),
          binding.map(|b| b.action_id.clone()),
          &error,
          started,
        )
      })
  }

  /// Build the payload for `def` and invoke it.
  pub async fn invoke_def(
    &self,
    task: &Task,
    def: &ActionInvokeDef,
    input: &Value,
    context: &Value,
    cancel: &CancellationToken,
  ) -> ActionOutcome {
    match self.payload_for(task, def, input, context, cancel).await {
      Ok(payload) => {
        self
          .invoke(task, &def.task_action_local_id, payload, cancel)
          .await
      }
      Err(outcome) => outcome,
    }
  }

  /// Invoke the action bound under `local_id` with a ready payload.
  #[instrument(
    name = "action_invoke",
    skip(self, task, payload, cancel),
    fields(task_id = %task.task_id)
  )]
  pub async fn invoke(
    &self,
    task: &Task,
    local_id: &str,
    payload: Value,
    cancel: &CancellationToken,
  ) -> ActionOutcome {
    let started = Utc::now();

    let Some(binding) = task.actions.get(local_id) else {
      let error = ActionError::TaskActionNotFound(local_id.to_string());
      warn!(error = %error, "action failed");
      return ActionOutcome::failure(local_id, local_id, None, &error, started);
    };

    debug!(action_id = %binding.action_id, "action running");
    match self.dispatch(binding, &payload, cancel).await {
      Ok(result) => {
        info!(action_id = %binding.action_id, "action succeeded");
        ActionOutcome {
          task_action_local_id: local_id.to_string(),
          task_action_name: binding.name.clone(),
          action_id: Some(binding.action_id.clone()),
          status: ActionStatus::Success,
          result,
          error: None,
          started,
          finished: Utc::now(),
        }
      }
      Err(error) => {
        warn!(action_id = %binding.action_id, error = %error, "action failed");
        ActionOutcome::failure(
          local_id,
          &binding.name,
          Some(binding.action_id.clone()),
          &error,
          started,
        )
      }
    }
  }

  async fn dispatch(
    &self,
    binding: &TaskAction,
    payload: &Value,
    cancel: &CancellationToken,
  ) -> Result<Value, ActionError> {
    let action = self
      .catalog
      .action(&binding.action_id)
      .await
      .filter(|action| action.enabled)
      .ok_or_else(|| ActionError::ActionNotFound(binding.action_id.clone()))?;

    if action.account_required && binding.account_id.is_none() {
      return Err(ActionError::AccountRequired {
        action_id: action.action_id,
      });
    }

    let executor = self
      .executors
      .get(&action.executor_id)
      .ok_or_else(|| ActionError::ExecutorNotFound(action.executor_id.clone()))?;

    // Stops the executor's scripts when this call returns early.
    let call = cancel.child_token();
    let _guard = call.clone().drop_guard();

    let template = render_template(
      &self.evaluator,
      &action.executor_template,
      binding.action_template.as_deref(),
      payload,
      &call,
    )
    .await?;
    check_template_fields(executor.template_fields(), &template)?;

    let timeout = action
      .timeout
      .map(|secs| Duration::from_secs(u64::from(secs)))
      .unwrap_or(self.default_timeout);

    let request = ExecutorRequest {
      executor_id: action.executor_id.clone(),
      template,
      payload: payload.clone(),
      account_id: binding.account_id.clone(),
      timeout,
      cancel: call.clone(),
    };

    let result = tokio::select! {
      _ = cancel.cancelled() => return Err(ActionError::Cancelled),
      res = tokio::time::timeout(timeout, executor.execute(request)) => match res {
        Ok(Ok(result)) => result,
        Ok(Err(ExecutorError::Timeout(limit))) => {
          return Err(ActionError::ExecutorTimeout { timeout: limit });
        }
        Ok(Err(ExecutorError::Cancelled)) => return Err(ActionError::Cancelled),
        Ok(Err(source)) => {
          return Err(ActionError::ExecutorFailure {
            executor_id: action.executor_id.clone(),
            source,
          });
        }
        Err(_) => return Err(ActionError::ExecutorTimeout { timeout }),
      },
    };

    match &action.postprocess_script {
      Some(code) => {
        let mut bindings = Bindings::new();
        bindings.insert("result".to_string(), result);
        bindings.insert("payload".to_string(), payload.clone());
        let request = ScriptRequest::new(code, &bindings).cancel(&call);
        run_blocking(self.evaluator.clone(), request)
          .await
          .map(|output| output.value)
          .map_err(|e| match e {
            ScriptError::Cancelled => ActionError::Cancelled,
            e => ActionError::PostprocessFailed(e),
          })
      }
      None => Ok(result),
    }
  }
}
