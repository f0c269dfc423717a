//! Trigger event processing.
//!
//! [`TaskEngine::process`] routes one trigger event to the execution model
//! of the task's config and always produces an audit entry, even when the
//! run fails before doing anything.

use std::sync::Arc;
use std::time::Duration;

use cadence_action::{ActionCatalog, ActionInvoker, ActionOutcome, ExecutorRegistry};
use cadence_config::{
  ActionInvokeDef, ActionStatus, InputStatus, InputsLogEntry, Task, TaskConfig, TaskState, Value,
};
use cadence_script::{
  Bindings, LuaEvaluator, ScriptError, ScriptEvaluator, ScriptFormat, ScriptOutput, ScriptRequest,
  run_blocking,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::audit::AuditRecorder;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{EngineEvent, ExecutionNotifier, NoopNotifier};
use crate::{dataflow, js, state_machine};

/// An incoming event addressed to one of a task's triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  /// The task-local trigger id.
  pub trigger_id: String,
  pub payload: Value,
}

impl TriggerEvent {
  pub fn new(trigger_id: impl Into<String>, payload: Value) -> Self {
    Self {
      trigger_id: trigger_id.into(),
      payload,
    }
  }
}

/// The result of processing one trigger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
  /// The task's next state. Equal to the input state when the run failed
  /// before committing anything.
  pub state: TaskState,
  pub log: InputsLogEntry,
}

/// What an execution model hands back to the engine.
pub(crate) struct Step {
  pub state: TaskState,
  /// Something inside the run failed (an action or a node) but the state
  /// is still committed.
  pub error: Option<String>,
  pub info: Value,
}

/// Per-run services shared by the execution models.
pub(crate) struct Run<'a> {
  pub task: &'a Task,
  invoker: &'a ActionInvoker,
  notifier: &'a dyn ExecutionNotifier,
  pub cancel: &'a CancellationToken,
  script_timeout: Duration,
  recorder: AuditRecorder,
}

impl Run<'_> {
  pub fn run_id(&self) -> String {
    self.recorder.run_id().to_string()
  }

  pub fn notify(&self, event: EngineEvent) {
    self.notifier.notify(event);
  }

  /// Evaluate a script under the engine's script timeout.
  pub async fn script(
    &self,
    code: &str,
    bindings: &Bindings,
    format: ScriptFormat,
  ) -> Result<ScriptOutput, ScriptError> {
    self
      .script_with(ScriptRequest::new(code, bindings).format(format))
      .await
  }

  /// Evaluate a prepared request off the async workers, filling in the
  /// engine's script timeout when the request has none. The run's
  /// cancellation token interrupts the script.
  pub async fn script_with(
    &self,
    request: ScriptRequest<'_>,
  ) -> Result<ScriptOutput, ScriptError> {
    let timeout = request.timeout.or(Some(self.script_timeout));
    let request = request.timeout(timeout).cancel(self.cancel);
    run_blocking(self.invoker.evaluator().clone(), request).await
  }

  /// Build a payload from `def` and invoke the bound action.
  pub async fn invoke_def(
    &mut self,
    def: &ActionInvokeDef,
    input: &Value,
    context: &Value,
  ) -> ActionOutcome {
    let local_id = &def.task_action_local_id;
    self.action_status(local_id, ActionStatus::Pending);
    let outcome = match self
      .invoker
      .payload_for(self.task, def, input, context, self.cancel)
      .await
    {
      Ok(payload) => {
        self.action_status(local_id, ActionStatus::Running);
        self
          .invoker
          .invoke(self.task, local_id, payload, self.cancel)
          .await
      }
      Err(outcome) => outcome,
    };
    self.finish_action(&outcome);
    outcome
  }

  /// Invoke the action bound under `local_id` with a ready payload.
  pub async fn invoke(&mut self, local_id: &str, payload: Value) -> ActionOutcome {
    self.action_status(local_id, ActionStatus::Pending);
    self.action_status(local_id, ActionStatus::Running);
    let outcome = self
      .invoker
      .invoke(self.task, local_id, payload, self.cancel)
      .await;
    self.finish_action(&outcome);
    outcome
  }

  fn action_status(&self, local_id: &str, status: ActionStatus) {
    self.notify(EngineEvent::ActionStatusChanged {
      run_id: self.run_id(),
      task_action_local_id: local_id.to_string(),
      status,
    });
  }

  fn finish_action(&mut self, outcome: &ActionOutcome) {
    self.action_status(&outcome.task_action_local_id, outcome.status);
    self.recorder.record(outcome);
  }
}

/// Processes trigger events for tasks.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. The engine holds no per-task state: callers pass the task's
/// current state in and get the next state back, and must not process two
/// events for the same task at once (see [`TaskRunner`](crate::TaskRunner)).
pub struct TaskEngine<N: ExecutionNotifier = NoopNotifier> {
  invoker: Arc<ActionInvoker>,
  config: EngineConfig,
  notifier: N,
}

impl TaskEngine<NoopNotifier> {
  pub fn new(invoker: Arc<ActionInvoker>, config: EngineConfig) -> Self {
    Self::with_notifier(invoker, config, NoopNotifier)
  }

  /// An engine with the Lua evaluator and the built-in executors, using the
  /// config's timeouts.
  pub fn with_catalog(catalog: Arc<dyn ActionCatalog>, config: EngineConfig) -> Self {
    let evaluator: Arc<dyn ScriptEvaluator> = Arc::new(LuaEvaluator::new(config.script_timeout));
    let executors = Arc::new(ExecutorRegistry::with_builtins(evaluator.clone()));
    let invoker = ActionInvoker::new(catalog, executors, evaluator)
      .with_default_timeout(config.default_action_timeout);
    Self::new(Arc::new(invoker), config)
  }
}

impl<N: ExecutionNotifier> TaskEngine<N> {
  pub fn with_notifier(invoker: Arc<ActionInvoker>, config: EngineConfig, notifier: N) -> Self {
    Self {
      invoker,
      config,
      notifier,
    }
  }

  /// Swap the notifier, keeping everything else.
  pub fn notify_with<M: ExecutionNotifier>(self, notifier: M) -> TaskEngine<M> {
    TaskEngine {
      invoker: self.invoker,
      config: self.config,
      notifier,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn invoker(&self) -> &ActionInvoker {
    &self.invoker
  }

  /// Process one trigger event against `state`.
  ///
  /// Never fails: run-level errors are reported in the audit entry and the
  /// state comes back unchanged.
  #[instrument(
    name = "task_process",
    skip(self, task, state, event, cancel),
    fields(task_id = %task.task_id, trigger_id = %event.trigger_id)
  )]
  pub async fn process(
    &self,
    task: &Task,
    state: TaskState,
    event: TriggerEvent,
    cancel: CancellationToken,
  ) -> RunOutcome {
    let mut run = Run {
      task,
      invoker: &self.invoker,
      notifier: &self.notifier,
      cancel: &cancel,
      script_timeout: self.config.script_timeout,
      recorder: AuditRecorder::begin(task, &event.trigger_id),
    };
    let run_id = run.run_id();

    info!(run_id = %run_id, kind = %task.compiled.kind(), "run started");
    run.notify(EngineEvent::RunStarted {
      run_id: run_id.clone(),
      task_id: task.task_id.clone(),
      trigger_id: event.trigger_id.clone(),
    });

    let result = self.dispatch(&mut run, &state, &event).await;

    let (state, status, info) = match result {
      Ok(step) => {
        let status = match &step.error {
          Some(e) => {
            warn!(run_id = %run_id, error = %e, "run finished with errors");
            InputStatus::Error
          }
          None => InputStatus::Success,
        };
        run.notify(EngineEvent::StateCommitted {
          run_id: run_id.clone(),
          task_id: task.task_id.clone(),
        });
        (step.state, status, with_error(step.info, step.error))
      }
      Err(e) => {
        error!(run_id = %run_id, error = %e, "run failed");
        (state, InputStatus::Error, with_error(Value::Null, Some(e.to_string())))
      }
    };

    let Run {
      recorder, notifier, ..
    } = run;
    let log = recorder.finish(status, info);
    info!(run_id = %run_id, status = ?status, actions = log.actions.len(), "run finished");
    notifier.notify(EngineEvent::RunFinished {
      run_id,
      log: Box::new(log.clone()),
    });

    RunOutcome { state, log }
  }

  async fn dispatch(
    &self,
    run: &mut Run<'_>,
    state: &TaskState,
    event: &TriggerEvent,
  ) -> Result<Step, EngineError> {
    let task = run.task;
    if !task.enabled {
      return Err(EngineError::TaskDisabled(task.task_id.clone()));
    }
    if run.cancel.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    match (&task.compiled, state) {
      (TaskConfig::StateMachine(machines), TaskState::StateMachine(states)) => {
        state_machine::apply(run, machines, states, event).await
      }
      (TaskConfig::DataFlow(config), TaskState::DataFlow(nodes)) => {
        dataflow::apply(run, config, nodes, event).await
      }
      (TaskConfig::Js(config), TaskState::Js(context)) => js::apply(run, config, context, event).await,
      (config, state) => Err(EngineError::StateMismatch {
        config: config.kind(),
        state: state.kind(),
      }),
    }
  }
}

/// Add `error` to a run's info object.
fn with_error(info: Value, error: Option<String>) -> Value {
  let Some(error) = error else {
    return info;
  };
  let mut info = match info {
    Value::Object(map) => map,
    Value::Null => Default::default(),
    other => {
      let mut map = cadence_config::value::Map::new();
      map.insert("info".to_string(), other);
      map
    }
  };
  info.insert("error".to_string(), Value::String(error));
  Value::Object(info)
}
