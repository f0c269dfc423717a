//! Execution events and notifiers for observability.
//!
//! Events are emitted while a trigger event is processed so consumers can
//! persist state and audit entries, stream progress to a UI, and so on.

use cadence_config::{ActionStatus, InputsLogEntry, Value};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
  /// A trigger event is being processed.
  RunStarted {
    run_id: String,
    task_id: String,
    trigger_id: String,
  },

  /// An action moved through `pending → running → success | error`.
  ActionStatusChanged {
    run_id: String,
    task_action_local_id: String,
    status: ActionStatus,
  },

  /// A dataflow node produced a value.
  NodeCompleted {
    run_id: String,
    node: String,
    value: Value,
  },

  /// A dataflow node failed; its dependents are skipped.
  NodeFailed {
    run_id: String,
    node: String,
    error: String,
  },

  /// The run replaced the task's state.
  StateCommitted { run_id: String, task_id: String },

  /// The run is over. Carries the finished audit entry.
  RunFinished {
    run_id: String,
    log: Box<InputsLogEntry>,
  },
}

/// Trait for receiving engine events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them (persist, broadcast, log, ignore).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: EngineEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: EngineEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls a task's run; event volume is a
/// handful per action or node.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: EngineEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
