use std::collections::HashSet;
use std::time::{Duration, Instant};

use cadence_config::Value;
use mlua::{
  Function, HookTriggers, Lua, LuaOptions, LuaSerdeExt, MultiValue, SerializeOptions, StdLib,
  VmState,
};
use tracing::{debug, instrument};

use crate::error::ScriptError;
use crate::evaluator::{
  ActionRequest, Bindings, ConsoleMessage, ScriptEvaluator, ScriptFormat, ScriptOutput,
  ScriptRequest,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const HOOK_INSTRUCTIONS: u32 = 1_000;

/// Globals stripped from every interpreter. `pcall` goes too so a script
/// cannot swallow its own deadline.
const REMOVED_GLOBALS: &[&str] = &[
  "dofile",
  "loadfile",
  "load",
  "require",
  "collectgarbage",
  "pcall",
  "xpcall",
];

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not defined")]
struct Unbound(String);

#[derive(Debug, thiserror::Error)]
#[error("script deadline exceeded")]
struct DeadlineExceeded;

#[derive(Debug, thiserror::Error)]
#[error("script cancelled")]
struct Interrupted;

#[derive(Default)]
struct Captured {
  console: Vec<ConsoleMessage>,
  actions: Vec<ActionRequest>,
}

/// [`ScriptEvaluator`] backed by a fresh Lua 5.4 state per call.
#[derive(Debug, Clone)]
pub struct LuaEvaluator {
  default_timeout: Duration,
}

impl Default for LuaEvaluator {
  fn default() -> Self {
    Self::new(DEFAULT_TIMEOUT)
  }
}

impl LuaEvaluator {
  /// Create an evaluator that applies `default_timeout` to requests without one.
  pub fn new(default_timeout: Duration) -> Self {
    Self { default_timeout }
  }

  pub fn default_timeout(&self) -> Duration {
    self.default_timeout
  }
}

impl ScriptEvaluator for LuaEvaluator {
  #[instrument(skip_all, fields(format = ?request.format))]
  fn run(&self, request: ScriptRequest<'_>) -> Result<ScriptOutput, ScriptError> {
    let timeout = request.timeout.unwrap_or(self.default_timeout);

    let (lua, pcall) = sandbox(request.capture_actions).map_err(|e| classify(&e, timeout))?;
    bind(&lua, request.bindings)?;

    let function = compile(&lua, request.code, request.format).map_err(|e| classify(&e, timeout))?;

    let deadline = Instant::now() + timeout;
    let cancel = request.cancel.cloned();
    lua.set_hook(
      HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTIONS),
      move |_lua, _debug| {
        if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
          Err(mlua::Error::external(Interrupted))
        } else if Instant::now() >= deadline {
          Err(mlua::Error::external(DeadlineExceeded))
        } else {
          Ok(VmState::Continue)
        }
      },
    );

    let (ok, value): (bool, mlua::Value) = pcall
      .call(function)
      .map_err(|e| classify(&e, timeout))?;
    lua.remove_hook();

    if !ok {
      let err = match value {
        mlua::Value::Error(err) => classify(&err, timeout),
        thrown => ScriptError::Thrown(
          lua
            .from_value::<Value>(thrown.clone())
            .unwrap_or_else(|_| Value::String(thrown.type_name().to_string())),
        ),
      };
      debug!(error = %err, "script failed");
      return Err(err);
    }

    let value = lua
      .from_value::<Value>(value)
      .map_err(|e| ScriptError::Conversion(e.to_string()))?;
    let captured = lua.remove_app_data::<Captured>().unwrap_or_default();

    Ok(ScriptOutput {
      value,
      console: captured.console,
      actions: captured.actions,
    })
  }
}

fn sandbox(capture_actions: bool) -> mlua::Result<(Lua, Function)> {
  let lua = Lua::new_with(
    StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::UTF8,
    LuaOptions::default(),
  )?;
  lua.set_memory_limit(MEMORY_LIMIT)?;

  let globals = lua.globals();
  let pcall: Function = globals.get("pcall")?;
  for name in REMOVED_GLOBALS {
    globals.raw_set(*name, mlua::Value::Nil)?;
  }

  lua.set_app_data(Captured::default());
  globals.raw_set("print", lua.create_function(print)?)?;
  if capture_actions {
    globals.raw_set("run_action", lua.create_function(run_action)?)?;
  }

  Ok((lua, pcall))
}

/// Set each binding as a global and install the unbound-name guard.
///
/// Null values become `nil`, so the guard keeps track of bound names and
/// only raises for names that were never bound.
fn bind(lua: &Lua, bindings: &Bindings) -> Result<(), ScriptError> {
  let conversion = |e: mlua::Error| ScriptError::Conversion(e.to_string());
  let options = || {
    SerializeOptions::new()
      .serialize_none_to_null(false)
      .serialize_unit_to_null(false)
  };

  let globals = lua.globals();
  let mut bound = HashSet::new();
  for (name, value) in bindings {
    let value = lua.to_value_with(value, options()).map_err(conversion)?;
    globals.raw_set(name.as_str(), value).map_err(conversion)?;
    bound.insert(name.clone());
  }

  let guard = lua
    .create_function(move |_, (_table, key): (mlua::Value, mlua::Value)| {
      let name = match key {
        mlua::Value::String(s) => s.to_string_lossy().to_string(),
        other => format!("{other:?}"),
      };
      if bound.contains(&name) {
        Ok(mlua::Value::Nil)
      } else {
        Err(mlua::Error::external(Unbound(name)))
      }
    })
    .map_err(conversion)?;

  let meta = lua.create_table().map_err(conversion)?;
  meta.raw_set("__index", guard).map_err(conversion)?;
  let setmetatable: Function = globals.get("setmetatable").map_err(conversion)?;
  setmetatable
    .call::<()>((globals, meta))
    .map_err(conversion)?;
  Ok(())
}

fn compile(lua: &Lua, code: &str, format: ScriptFormat) -> mlua::Result<Function> {
  let expression = || {
    lua
      .load(format!("return {code}"))
      .set_name("script")
      .into_function()
  };
  let body = || lua.load(code).set_name("script").into_function();

  match format {
    ScriptFormat::Expression => expression(),
    ScriptFormat::Body => body(),
    ScriptFormat::Auto => expression().or_else(|_| body()),
  }
}

fn print(lua: &Lua, args: MultiValue) -> mlua::Result<()> {
  let parts: Vec<String> = args.into_iter().map(|v| display(lua, v)).collect();
  if let Some(mut captured) = lua.app_data_mut::<Captured>() {
    captured.console.push(ConsoleMessage {
      message: format!("{}\n", parts.join(" ")),
    });
  }
  Ok(())
}

fn run_action(lua: &Lua, (local_id, payload): (String, mlua::Value)) -> mlua::Result<()> {
  let payload: Value = lua.from_value(payload)?;
  if let Some(mut captured) = lua.app_data_mut::<Captured>() {
    captured.actions.push(ActionRequest {
      task_action_local_id: local_id,
      payload,
    });
  }
  Ok(())
}

fn display(lua: &Lua, value: mlua::Value) -> String {
  match value {
    mlua::Value::String(s) => s.to_string_lossy().to_string(),
    mlua::Value::Nil => "nil".to_string(),
    other => match lua.from_value::<Value>(other.clone()) {
      Ok(json) => json.to_string(),
      Err(_) => other.type_name().to_string(),
    },
  }
}

fn classify(err: &mlua::Error, timeout: Duration) -> ScriptError {
  match err {
    mlua::Error::SyntaxError { message, .. } => ScriptError::Syntax(message.clone()),
    mlua::Error::CallbackError { cause, .. } => classify(cause, timeout),
    mlua::Error::ExternalError(inner) => {
      if let Some(Unbound(name)) = inner.downcast_ref::<Unbound>() {
        ScriptError::Reference(name.clone())
      } else if inner.downcast_ref::<DeadlineExceeded>().is_some() {
        ScriptError::Timeout(timeout)
      } else if inner.downcast_ref::<Interrupted>().is_some() {
        ScriptError::Cancelled
      } else {
        ScriptError::Runtime(inner.to_string())
      }
    }
    other => ScriptError::Runtime(other.to_string()),
  }
}
