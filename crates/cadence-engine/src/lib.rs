//! Cadence Engine
//!
//! Processes trigger events for tasks. A task is configured as one of three
//! execution models, all sharing the same action invocation and payload
//! building from `cadence-action`:
//!
//! - **state machine**: per-state event handlers fire actions and move
//!   between declared states
//! - **dataflow**: a DAG of nodes evaluated in topological order from the
//!   trigger node that matches the event
//! - **script**: one script maps `(event, context)` to a new context and
//!   requests actions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskRunner                           │
//! │  - owns one task and its state                              │
//! │  - bounded mpsc queue, one run at a time                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskEngine                           │
//! │  - process(task, state, event, cancel) → RunOutcome         │
//! │  - dispatch on TaskConfig, audit entry for every event      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           state_machine  │  dataflow  │  js                 │
//! │  - ActionInvoker for side effects, ScriptEvaluator for code │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cadence_engine::{EngineConfig, TaskEngine, TaskRunner, TriggerEvent};
//!
//! let engine = Arc::new(TaskEngine::with_catalog(catalog, EngineConfig::default()));
//! let runner = TaskRunner::new(task, engine);
//! let handle = runner.handle();
//! tokio::spawn(runner.start(cancel.clone()));
//!
//! let outcome = handle.trigger(TriggerEvent::new("start", payload)).await?;
//! println!("{:?}", outcome.log.input_status);
//! ```

mod audit;
mod config;
mod dataflow;
mod engine;
mod error;
mod events;
mod js;
mod runner;
mod state_machine;

pub use audit::AuditRecorder;
pub use config::EngineConfig;
pub use dataflow::{DataFlowLog, DataFlowNodeLog};
pub use engine::{RunOutcome, TaskEngine, TriggerEvent};
pub use error::EngineError;
pub use events::{ChannelNotifier, EngineEvent, ExecutionNotifier, NoopNotifier};
pub use runner::{TaskHandle, TaskRunner};
pub use state_machine::find_handler;
