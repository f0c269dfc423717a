mod common;

use std::time::{Duration, Instant};

use cadence_config::{ActionStatus, InputStatus, TaskState};
use cadence_engine::{EngineConfig, TriggerEvent};
use common::{RecordingExecutor, engine_with, engine_with_config, recording_action, task};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const COUNTER: &str = r#"
local count = (context and context.count or 0) + event.n
print("count is", count)
run_action("notify", { count = count })
return { count = count }
"#;

fn script(code: &str) -> Value {
  json!({ "type": "Js", "data": { "script": code, "timeout": 1000 } })
}

fn context(state: &TaskState) -> &str {
  match state {
    TaskState::Js(state) => &state.context,
    other => panic!("unexpected state {other:?}"),
  }
}

#[tokio::test]
async fn test_context_evolves_across_runs() {
  let executor = RecordingExecutor::new();
  let engine = engine_with(executor.clone(), vec![recording_action("notify")]);
  let task = task(script(COUNTER));

  let first = engine
    .process(
      &task,
      task.current_state(),
      TriggerEvent::new("start", json!({ "n": 2 })),
      CancellationToken::new(),
    )
    .await;
  assert_eq!(context(&first.state), r#"{"count":2}"#);
  assert_eq!(first.log.info["console"][0]["message"], json!("count is 2\n"));

  let second = engine
    .process(
      &task,
      first.state,
      TriggerEvent::new("start", json!({ "n": 3 })),
      CancellationToken::new(),
    )
    .await;
  assert_eq!(context(&second.state), r#"{"count":5}"#);
  assert_eq!(second.log.input_status, InputStatus::Success);

  assert_eq!(executor.calls(), vec![json!({ "count": 2 }), json!({ "count": 5 })]);
  assert_eq!(second.log.actions[0].status, ActionStatus::Success);
}

#[tokio::test]
async fn test_script_error_leaves_state() {
  let executor = RecordingExecutor::new();
  let engine = engine_with(executor.clone(), vec![recording_action("notify")]);
  let task = task(script(
    "run_action('notify', { early = true })\nerror('nope')",
  ));
  let before: TaskState =
    serde_json::from_value(json!({ "type": "Js", "data": { "context": "{\"count\":1}" } }))
      .unwrap();

  let outcome = engine
    .process(
      &task,
      before.clone(),
      TriggerEvent::new("start", json!({})),
      CancellationToken::new(),
    )
    .await;

  assert_eq!(outcome.state, before);
  assert_eq!(outcome.log.input_status, InputStatus::Error);
  assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_failed_action_still_commits_context() {
  let executor = RecordingExecutor::new();
  let config = EngineConfig {
    default_action_timeout: Duration::from_millis(100),
    ..EngineConfig::default()
  };
  let engine = engine_with_config(executor.clone(), vec![recording_action("notify")], config);
  let task = task(script(
    "run_action('notify', { sleep_ms = 2000 })\nreturn { done = true }",
  ));

  let outcome = engine
    .process(
      &task,
      task.current_state(),
      TriggerEvent::new("start", json!({})),
      CancellationToken::new(),
    )
    .await;

  assert_eq!(context(&outcome.state), r#"{"done":true}"#);
  assert_eq!(outcome.log.input_status, InputStatus::Error);
  assert_eq!(outcome.log.actions[0].status, ActionStatus::Error);
  assert!(outcome.log.info["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_runaway_script_times_out() {
  let engine = engine_with(RecordingExecutor::new(), vec![]);
  let task = task(json!({
    "type": "Js",
    "data": { "script": "while true do end", "timeout": 50 },
  }));
  let before = task.current_state();

  let outcome = engine
    .process(
      &task,
      before.clone(),
      TriggerEvent::new("start", json!({})),
      CancellationToken::new(),
    )
    .await;

  assert_eq!(outcome.state, before);
  assert!(outcome.log.info["error"].as_str().unwrap().contains("time limit"));
}

#[tokio::test]
async fn test_cancel_interrupts_spinning_script() {
  let engine = engine_with(RecordingExecutor::new(), vec![]);
  let task = task(json!({
    "type": "Js",
    "data": { "script": "local t = 0 while true do t = t + 1 end", "timeout": 5000 },
  }));
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let started = Instant::now();
  let outcome = engine
    .process(&task, task.current_state(), TriggerEvent::new("start", json!({})), cancel)
    .await;

  assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
  assert_eq!(outcome.log.input_status, InputStatus::Error);
  assert_eq!(outcome.state, task.current_state());
  let error = outcome.log.info["error"].as_str().unwrap_or_default();
  assert!(error.contains("cancelled"), "{error}");
}

