//! Cadence Config
//!
//! This crate contains the serializable types the cadence engine consumes and
//! produces: compiled task configurations and their persisted states, the
//! action catalog entries tasks bind to, and the audit records written for
//! every trigger event.
//!
//! These types are produced by components outside the engine (storage, the
//! task compiler, the HTTP API) and are treated as plain data here. The only
//! behaviour they carry is static validation (state machine targets, dataflow
//! ordering) and the dataflow topological sort, which has to be recomputed
//! whenever nodes or edges change.

mod action;
mod dataflow;
mod error;
mod log;
mod state_machine;
mod task;
pub mod value;

pub use action::{
  AccountId, Action, ActionId, ExecutorId, ExecutorInfo, ScriptOrTemplate, TemplateField,
  TemplateFieldFormat, TemplateFields,
};
pub use dataflow::{
  CodeSource, DataFlowAction, DataFlowConfig, DataFlowEdge, DataFlowJs, DataFlowNode,
  DataFlowNodeFunction, DataFlowState, DataFlowText, DataFlowTrigger, JsCodeFormat, TextRenderAs,
};
pub use error::ConfigError;
pub use log::{ActionStatus, InputLogEntryAction, InputStatus, InputsLogEntry};
pub use state_machine::{
  ActionInvokeDef, ActionInvokeDefDataField, ActionPayloadBuilder, EventHandler, StateDefinition,
  StateMachine, StateMachineConfig, StateMachineData, StateMachineStates, TransitionTarget,
};
pub use task::{
  PeriodicSchedule, PeriodicTaskTrigger, Task, TaskAction, TaskConfig, TaskJsConfig, TaskJsState,
  TaskKind, TaskState, TaskTrigger,
};
pub use value::Value;
