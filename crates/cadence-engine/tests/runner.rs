mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_config::{TaskState, Value};
use cadence_engine::{EngineError, TaskRunner, TriggerEvent};
use common::{RecordingExecutor, engine_with, recording_action, task};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn counter() -> Value {
  json!({
    "type": "Js",
    "data": { "script": "return (context or 0) + event.n" },
  })
}

fn context(state: &TaskState) -> String {
  match state {
    TaskState::Js(state) => state.context.clone(),
    other => panic!("unexpected state {other:?}"),
  }
}

#[tokio::test]
async fn test_runner_threads_state_between_runs() {
  let engine = Arc::new(engine_with(RecordingExecutor::new(), vec![]));
  let runner = TaskRunner::new(task(counter()), engine);
  let handle = runner.handle();
  let cancel = CancellationToken::new();
  let join = tokio::spawn(runner.start(cancel.clone()));

  let first = handle
    .trigger(TriggerEvent::new("start", json!({ "n": 1 })))
    .await
    .unwrap();
  assert_eq!(context(&first.state), "1");

  let second = handle
    .trigger(TriggerEvent::new("start", json!({ "n": 2 })))
    .await
    .unwrap();
  assert_eq!(context(&second.state), "3");

  drop(handle);
  let final_state = join.await.unwrap();
  assert_eq!(context(&final_state), "3");
}

#[tokio::test]
async fn test_concurrent_triggers_are_serialized() {
  let executor = RecordingExecutor::new();
  let engine = Arc::new(engine_with(executor.clone(), vec![recording_action("notify")]));
  let runner = TaskRunner::new(
    task(json!({
      "type": "Js",
      "data": {
        "script": "local n = (context or 0) + 1\nrun_action('notify', { n = n, sleep_ms = 10 })\nreturn n",
      },
    })),
    engine,
  );
  let handle = runner.handle();
  let cancel = CancellationToken::new();
  let join = tokio::spawn(runner.start(cancel.clone()));

  let runs = (0..5).map(|_| handle.trigger(TriggerEvent::new("start", json!({}))));
  let outcomes = futures::future::join_all(runs).await;

  let mut seen: Vec<String> = outcomes
    .into_iter()
    .map(|outcome| context(&outcome.unwrap().state))
    .collect();
  seen.sort();
  assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);

  let counts: Vec<Value> = executor.calls().iter().map(|call| call["n"].clone()).collect();
  assert_eq!(counts, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);

  cancel.cancel();
  assert_eq!(context(&join.await.unwrap()), "5");
}

#[tokio::test]
async fn test_closed_runner_rejects_triggers() {
  let engine = Arc::new(engine_with(RecordingExecutor::new(), vec![]));
  let runner = TaskRunner::new(task(counter()), engine);
  let handle = runner.handle();
  let cancel = CancellationToken::new();
  let join = tokio::spawn(runner.start(cancel.clone()));

  cancel.cancel();
  join.await.unwrap();

  assert!(handle.is_closed());
  let err = handle
    .trigger(TriggerEvent::new("start", json!({ "n": 1 })))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::RunnerClosed));
}

#[tokio::test]
async fn test_spinning_task_does_not_stall_other_runners() {
  let engine = Arc::new(engine_with(RecordingExecutor::new(), vec![]));
  let spinning = TaskRunner::new(
    task(json!({
      "type": "Js",
      "data": { "script": "local t = 0 while true do t = t + 1 end", "timeout": 1500 },
    })),
    engine.clone(),
  );
  let quick = TaskRunner::new(
    task(json!({ "type": "Js", "data": { "script": "return { ok = true }" } })),
    engine,
  );
  let (spin_handle, quick_handle) = (spinning.handle(), quick.handle());
  let cancel = CancellationToken::new();
  tokio::spawn(spinning.start(cancel.clone()));
  tokio::spawn(quick.start(cancel.clone()));

  let spin = tokio::spawn(async move {
    spin_handle
      .trigger(TriggerEvent::new("start", json!({})))
      .await
  });
  tokio::time::sleep(Duration::from_millis(50)).await;

  let started = Instant::now();
  let outcome = quick_handle
    .trigger(TriggerEvent::new("start", json!({})))
    .await
    .unwrap();
  assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
  assert_eq!(context(&outcome.state), r#"{"ok":true}"#);

  let spun = spin.await.unwrap().unwrap();
  let error = spun.log.info["error"].as_str().unwrap_or_default().to_string();
  assert!(error.contains("time limit"), "{error}");
  cancel.cancel();
}

