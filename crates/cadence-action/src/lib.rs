//! Cadence Action
//!
//! Turns an action binding plus a payload into a call against an external
//! executor.
//!
//! ```text
//! ActionInvokeDef ──build_payload──▶ payload
//!                                       │
//! ActionCatalog ──▶ Action ──render_template──▶ executor template
//!                                       │
//! ExecutorRegistry ──▶ Executor::execute (timeout, cancellation)
//!                                       │
//!                        postprocess_script ──▶ ActionOutcome
//! ```
//!
//! Executors are the only place external I/O happens. Two are built in:
//! `script` runs a Lua snippet and `http` performs a request with reqwest.

mod catalog;
mod error;
mod executor;
pub mod executors;
mod invoker;
mod payload;
mod template;

pub use catalog::{ActionCatalog, InMemoryCatalog};
pub use error::{ActionError, BuildError, CatalogError, ExecutorError};
pub use executor::{Executor, ExecutorRegistry, ExecutorRequest};
pub use invoker::{ActionInvoker, ActionOutcome, DEFAULT_ACTION_TIMEOUT};
pub use payload::build_payload;
pub use template::{check_template_fields, render_template};
