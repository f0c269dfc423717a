//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_action::{
  ActionInvoker, Executor, ExecutorError, ExecutorRegistry, ExecutorRequest, InMemoryCatalog,
};
use cadence_config::{Action, Task, TemplateFields, Value};
use cadence_engine::{EngineConfig, TaskEngine};
use cadence_script::LuaEvaluator;
use serde_json::json;

/// Records every payload it receives. Fails when the payload has
/// `"fail": true` and sleeps for `"sleep_ms"` when present.
#[derive(Default)]
pub struct RecordingExecutor {
  calls: Mutex<Vec<Value>>,
  fields: TemplateFields,
}

impl RecordingExecutor {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn calls(&self) -> Vec<Value> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Executor for RecordingExecutor {
  fn name(&self) -> &str {
    "recording"
  }

  fn template_fields(&self) -> &TemplateFields {
    &self.fields
  }

  async fn execute(&self, request: ExecutorRequest) -> Result<Value, ExecutorError> {
    self.calls.lock().unwrap().push(request.payload.clone());

    if let Some(ms) = request.payload.get("sleep_ms").and_then(Value::as_u64) {
      tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    if request.payload.get("fail") == Some(&json!(true)) {
      return Err(ExecutorError::Failed {
        message: "asked to fail".to_string(),
        result: Value::Null,
      });
    }

    Ok(json!({ "received": request.payload }))
  }
}

/// A catalog action run by the recording executor.
pub fn recording_action(id: &str) -> Action {
  serde_json::from_value(json!({
    "action_id": id,
    "name": id,
    "executor_id": "recording",
    "executor_template": { "t": "Template", "c": [["body", "{{ payload }}"]] },
  }))
  .unwrap()
}

pub fn engine_with(executor: Arc<RecordingExecutor>, actions: Vec<Action>) -> TaskEngine {
  engine_with_config(executor, actions, EngineConfig::default())
}

pub fn engine_with_config(
  executor: Arc<RecordingExecutor>,
  actions: Vec<Action>,
  config: EngineConfig,
) -> TaskEngine {
  let evaluator = Arc::new(LuaEvaluator::new(config.script_timeout));
  let mut registry = ExecutorRegistry::with_builtins(evaluator.clone());
  registry.register(executor);

  let invoker = ActionInvoker::new(
    Arc::new(InMemoryCatalog::from_iter(actions)),
    Arc::new(registry),
    evaluator,
  )
  .with_default_timeout(config.default_action_timeout);

  TaskEngine::new(Arc::new(invoker), config)
}

/// A task with the given compiled config and `notify`/`audit` action bindings.
pub fn task(compiled: Value) -> Task {
  serde_json::from_value(json!({
    "task_id": "task-1",
    "name": "Test task",
    "enabled": true,
    "compiled": compiled,
    "actions": {
      "notify": { "action_id": "notify", "name": "Notify" },
      "audit": { "action_id": "audit", "name": "Audit" },
    },
    "triggers": {
      "start": { "input_id": "input-start", "name": "Start" },
      "stop": { "input_id": "input-stop", "name": "Stop" },
    },
  }))
  .unwrap()
}
