//! State machine execution.
//!
//! Each event is applied to every machine of the task in order. For one
//! machine:
//!
//! 1. find the handler for the trigger, state-local handlers first, then
//!    machine-wide ones, first match wins
//! 2. invoke the handler's actions in order, stopping at the first failure
//! 3. resolve the target and commit `{state, context}`
//!
//! An event no handler matches leaves the machine untouched.

use cadence_config::{
  EventHandler, StateMachine, StateMachineConfig, StateMachineData, StateMachineStates, TaskState,
  TransitionTarget, Value,
};
use cadence_script::{Bindings, ScriptFormat};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::engine::{Run, Step, TriggerEvent};
use crate::error::EngineError;

/// Find the handler a machine in `state` uses for `trigger_id`.
pub fn find_handler<'m>(
  machine: &'m StateMachine,
  state: &str,
  trigger_id: &str,
) -> Result<Option<&'m EventHandler>, EngineError> {
  let definition = machine
    .states
    .get(state)
    .ok_or_else(|| EngineError::UnknownState {
      machine: machine.name.clone(),
      state: state.to_string(),
    })?;

  Ok(
    definition
      .on
      .iter()
      .chain(machine.on.iter())
      .find(|h| h.trigger_id == trigger_id),
  )
}

pub(crate) async fn apply(
  run: &mut Run<'_>,
  machines: &StateMachineConfig,
  states: &StateMachineStates,
  event: &TriggerEvent,
) -> Result<Step, EngineError> {
  let mut next = Vec::with_capacity(machines.len());
  let mut transitions = Vec::new();
  let mut first_error = None;

  for (index, machine) in machines.iter().enumerate() {
    let current = states
      .get(index)
      .cloned()
      .unwrap_or_else(|| machine.initial_data());

    let Some(handler) = find_handler(machine, &current.state, &event.trigger_id)? else {
      debug!(machine = %machine.name, state = %current.state, "no handler for trigger");
      next.push(current);
      continue;
    };

    match apply_handler(run, machine, handler, &current, event).await? {
      Ok(data) => {
        transitions.push(json!({
          "machine": machine.name,
          "from": current.state,
          "to": data.state,
        }));
        next.push(data);
      }
      Err(error) => {
        transitions.push(json!({
          "machine": machine.name,
          "from": current.state,
          "to": current.state,
          "error": error,
        }));
        first_error.get_or_insert(error);
        next.push(current);
      }
    }
  }

  // Unhandled events commit the stored state as-is, without filling in
  // entries for machines it does not cover yet.
  if transitions.is_empty() {
    return Ok(Step {
      state: TaskState::StateMachine(states.clone()),
      error: None,
      info: json!({ "handled": false }),
    });
  }

  Ok(Step {
    state: TaskState::StateMachine(next),
    error: first_error,
    info: json!({ "handled": true, "transitions": transitions }),
  })
}

/// Run one handler. The inner `Err` is an action failure, which aborts only
/// this machine's transition; the outer one aborts the whole run.
#[instrument(
  name = "machine_handle",
  skip_all,
  fields(machine = %machine.name, state = %current.state, trigger_id = %handler.trigger_id)
)]
async fn apply_handler(
  run: &mut Run<'_>,
  machine: &StateMachine,
  handler: &EventHandler,
  current: &StateMachineData,
  event: &TriggerEvent,
) -> Result<Result<StateMachineData, String>, EngineError> {
  let mut results = Vec::new();

  for def in handler.actions.iter().flatten() {
    let outcome = run.invoke_def(def, &event.payload, &current.context).await;
    results.push(json!({
      "action": outcome.task_action_local_id,
      "status": outcome.status,
      "result": outcome.result,
    }));

    if !outcome.succeeded() {
      let error = outcome
        .error
        .unwrap_or_else(|| format!("action '{}' failed", def.task_action_local_id));
      return Ok(Err(error));
    }
  }

  let mut next = current.clone();
  match &handler.target {
    None => {}
    Some(TransitionTarget::One(state)) => next.state = state.clone(),
    Some(TransitionTarget::Script(code)) => {
      let mut bindings = Bindings::new();
      bindings.insert("context".to_string(), current.context.clone());
      bindings.insert("event".to_string(), event.payload.clone());
      bindings.insert("results".to_string(), Value::Array(results));

      let output = run.script(code, &bindings, ScriptFormat::Auto).await?;
      apply_script_target(machine, &mut next, output.value)?;
    }
  }

  if !machine.has_state(&next.state) {
    return Err(EngineError::InvalidTransitionTarget {
      machine: machine.name.clone(),
      target: next.state,
    });
  }

  info!(from = %current.state, to = %next.state, "transition");
  Ok(Ok(next))
}

/// A target script returns a state name, `null` to stay, or an object with
/// an optional `state` and an optional replacement `context`.
fn apply_script_target(
  machine: &StateMachine,
  data: &mut StateMachineData,
  value: Value,
) -> Result<(), EngineError> {
  let invalid = |value: &Value| EngineError::InvalidTransitionTarget {
    machine: machine.name.clone(),
    target: value.to_string(),
  };

  match value {
    Value::Null => {}
    Value::String(state) => data.state = state,
    Value::Object(mut fields) => {
      match fields.remove("state") {
        None | Some(Value::Null) => {}
        Some(Value::String(state)) => data.state = state,
        Some(other) => return Err(invalid(&other)),
      }
      if let Some(context) = fields.remove("context") {
        data.context = context;
      }
    }
    other => return Err(invalid(&other)),
  }
  Ok(())
}
