//! Per-task runner with channel-based triggering.
//!
//! A [`TaskRunner`] owns one task and its current state and processes the
//! events it receives strictly one at a time, so a task's runs never
//! overlap. Runners for different tasks are independent and run in
//! parallel.

use std::sync::Arc;

use cadence_config::{Task, TaskState};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{RunOutcome, TaskEngine, TriggerEvent};
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};

struct Request {
  event: TriggerEvent,
  reply: Option<oneshot::Sender<RunOutcome>>,
}

/// Cloneable handle for sending events to a [`TaskRunner`].
#[derive(Clone)]
pub struct TaskHandle {
  sender: mpsc::Sender<Request>,
}

impl TaskHandle {
  /// Queue an event and wait for its run to finish.
  pub async fn trigger(&self, event: TriggerEvent) -> Result<RunOutcome, EngineError> {
    let (reply, receiver) = oneshot::channel();
    self
      .sender
      .send(Request {
        event,
        reply: Some(reply),
      })
      .await
      .map_err(|_| EngineError::RunnerClosed)?;
    receiver.await.map_err(|_| EngineError::RunnerClosed)
  }

  /// Queue an event without waiting for the run.
  pub async fn send(&self, event: TriggerEvent) -> Result<(), EngineError> {
    self
      .sender
      .send(Request { event, reply: None })
      .await
      .map_err(|_| EngineError::RunnerClosed)
  }

  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }
}

/// Serializes the runs of one task.
///
/// # Usage
///
/// ```ignore
/// let runner = TaskRunner::new(task, engine);
/// let handle = runner.handle();
///
/// let cancel = CancellationToken::new();
/// tokio::spawn(runner.start(cancel.clone()));
///
/// let outcome = handle.trigger(TriggerEvent::new("start", json!({}))).await?;
/// ```
pub struct TaskRunner<N: ExecutionNotifier = NoopNotifier> {
  task: Task,
  state: TaskState,
  engine: Arc<TaskEngine<N>>,
  sender: mpsc::Sender<Request>,
  receiver: mpsc::Receiver<Request>,
}

impl<N: ExecutionNotifier> TaskRunner<N> {
  /// Create a runner starting from the task's stored state, buffering up to
  /// the engine's `queue_size` events.
  pub fn new(task: Task, engine: Arc<TaskEngine<N>>) -> Self {
    let state = task.current_state();
    let queue_size = engine.config().queue_size.max(1);
    let (sender, receiver) = mpsc::channel(queue_size);
    Self {
      task,
      state,
      engine,
      sender,
      receiver,
    }
  }

  pub fn handle(&self) -> TaskHandle {
    TaskHandle {
      sender: self.sender.clone(),
    }
  }

  pub fn task(&self) -> &Task {
    &self.task
  }

  pub fn state(&self) -> &TaskState {
    &self.state
  }

  /// Run the event loop until the token is cancelled or every handle is
  /// dropped. Returns the task's final state.
  pub async fn start(self, cancel: CancellationToken) -> TaskState {
    let Self {
      task,
      mut state,
      engine,
      sender,
      mut receiver,
    } = self;
    // Only handles keep the channel open.
    drop(sender);

    info!(task_id = %task.task_id, task_name = %task.name, "starting task runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(task_id = %task.task_id, "task runner cancelled");
          break;
        }
        request = receiver.recv() => {
          let Some(Request { event, reply }) = request else {
            info!(task_id = %task.task_id, "task runner channel closed");
            break;
          };

          let outcome = engine
            .process(&task, state.clone(), event, cancel.child_token())
            .await;
          state = outcome.state.clone();

          if let Some(reply) = reply {
            // The caller may have stopped waiting.
            let _ = reply.send(outcome);
          }
        }
      }
    }

    state
  }
}
