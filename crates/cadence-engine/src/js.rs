//! Whole-task scripts.
//!
//! The script sees the trigger payload as `event` and the parsed stored
//! context as `context`. Whatever it returns becomes the new context. Actions
//! it requests through `run_action(local_id, payload)` are invoked after the
//! script finishes, in request order.

use std::time::Duration;

use cadence_config::value::{parse_context, serialize_context};
use cadence_config::{TaskJsConfig, TaskJsState, TaskState};
use cadence_script::{Bindings, ScriptFormat, ScriptRequest};
use serde_json::json;
use tracing::{debug, instrument};

use crate::engine::{Run, Step, TriggerEvent};
use crate::error::EngineError;

#[instrument(name = "script_task", skip_all)]
pub(crate) async fn apply(
  run: &mut Run<'_>,
  config: &TaskJsConfig,
  state: &TaskJsState,
  event: &TriggerEvent,
) -> Result<Step, EngineError> {
  let context = parse_context(&state.context).map_err(EngineError::Context)?;

  let mut bindings = Bindings::new();
  bindings.insert("event".to_string(), event.payload.clone());
  bindings.insert("context".to_string(), context);

  let request = ScriptRequest::new(&config.script, &bindings)
    .format(ScriptFormat::Body)
    .timeout(config.timeout.map(Duration::from_millis))
    .with_actions();
  let output = run.script_with(request).await?;
  debug!(actions = output.actions.len(), "script finished");

  let mut first_error = None;
  for request in output.actions {
    let outcome = run
      .invoke(&request.task_action_local_id, request.payload)
      .await;
    if !outcome.succeeded() {
      first_error.get_or_insert(
        outcome
          .error
          .unwrap_or_else(|| format!("action '{}' failed", request.task_action_local_id)),
      );
    }
  }

  Ok(Step {
    state: TaskState::Js(TaskJsState {
      context: serialize_context(&output.value),
    }),
    error: first_error,
    info: json!({ "console": output.console }),
  })
}
