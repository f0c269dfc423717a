//! Cadence Script
//!
//! Script evaluation for the cadence engine. Every place a task runs user
//! code (payload builders, transition targets, postprocess scripts, dataflow
//! nodes, whole-task scripts) goes through the [`ScriptEvaluator`] trait, so
//! the concrete interpreter can be swapped or stubbed out in tests.
//!
//! [`LuaEvaluator`] is the bundled implementation. Each call gets a fresh,
//! sandboxed Lua 5.4 interpreter:
//!
//! ```text
//! ScriptRequest { code, bindings, format, timeout }
//!        │
//!        ▼
//! fresh Lua state ── math/string/table/utf8 only, no io/os/load
//!        │           bindings set as globals, unbound names raise
//!        ▼
//! ScriptOutput { value, console, actions } | ScriptError
//! ```
//!
//! Evaluation is synchronous. Async code calls [`run_blocking`], which moves
//! the interpreter onto tokio's blocking pool and honours the request's
//! cancellation token.

mod error;
mod evaluator;
mod lua;

pub use error::ScriptError;
pub use evaluator::{
  ActionRequest, Bindings, ConsoleMessage, ScriptEvaluator, ScriptFormat, ScriptOutput,
  ScriptRequest, run_blocking,
};
pub use lua::LuaEvaluator;
