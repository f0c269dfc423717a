//! Built-in executors.

mod http;
mod script;

pub use http::HttpExecutor;
pub use script::ScriptExecutor;
