//! Dataflow graph execution.
//!
//! Nodes run in the config's `toposorted` order, which is validated against
//! the edges before every run. Only nodes reachable from the trigger node
//! that matches the event are computed; every other node keeps its stored
//! value. Each node sees the values produced on its incoming edges this run,
//! keyed by edge name.
//!
//! A failing node keeps its stored value and its dependents are skipped;
//! branches that do not depend on it still run.

use cadence_config::value::Map;
use cadence_config::{
  DataFlowAction, DataFlowConfig, DataFlowJs, DataFlowNode, DataFlowNodeFunction, DataFlowState,
  DataFlowText, JsCodeFormat, TaskState, TextRenderAs, Value,
};
use cadence_script::{Bindings, ConsoleMessage, ScriptFormat};
use minijinja::{AutoEscape, Environment};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::engine::{Run, Step, TriggerEvent};
use crate::error::EngineError;
use crate::events::EngineEvent;

/// Console output and failures of the nodes that ran, kept in the run's
/// audit entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFlowLog {
  pub run: Vec<DataFlowNodeLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowNodeLog {
  pub node: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub console: Vec<ConsoleMessage>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// How a node fared in the current run.
#[derive(Debug, Clone, PartialEq)]
enum Visit {
  /// Not reached from the matched trigger.
  Skipped,
  Computed(Value),
  /// Failed, or depends on a node that did.
  Blocked,
}

struct NodeResult {
  value: Value,
  console: Vec<ConsoleMessage>,
}

#[derive(Debug, thiserror::Error)]
enum NodeError {
  #[error(transparent)]
  Script(#[from] cadence_script::ScriptError),
  #[error("render failed: {0}")]
  Render(#[from] minijinja::Error),
  #[error("action '{local_id}' failed: {message}")]
  Action { local_id: String, message: String },
}

/// The work a non-trigger node does.
enum Compute<'a> {
  Script { code: &'a str, format: ScriptFormat },
  Text(&'a DataFlowText),
  /// Table and graph nodes pass their inputs through as one object.
  Collect,
  Action(&'a DataFlowAction),
}

impl<'a> Compute<'a> {
  /// `None` for trigger nodes, which take the event payload instead.
  fn of(func: &'a DataFlowNodeFunction) -> Option<Self> {
    let compute = match func {
      DataFlowNodeFunction::Trigger(_) => return None,
      DataFlowNodeFunction::Js(js) => Self::Script {
        code: &js.code,
        format: script_format(js),
      },
      DataFlowNodeFunction::Code(source) => Self::Script {
        code: source.code(),
        format: ScriptFormat::Body,
      },
      DataFlowNodeFunction::Text(text) => Self::Text(text),
      DataFlowNodeFunction::Table | DataFlowNodeFunction::Graph => Self::Collect,
      DataFlowNodeFunction::Action(action) => Self::Action(action),
    };
    Some(compute)
  }
}

pub(crate) async fn apply(
  run: &mut Run<'_>,
  config: &DataFlowConfig,
  state: &DataFlowState,
  event: &TriggerEvent,
) -> Result<Step, EngineError> {
  config.validate_order().map_err(EngineError::InvalidGraph)?;

  let is_trigger = |node: &DataFlowNode| {
    matches!(&node.func, DataFlowNodeFunction::Trigger(t) if t.local_id == event.trigger_id)
  };
  if !config.nodes.iter().any(|node| is_trigger(node)) {
    return Err(EngineError::TriggerNotFound(event.trigger_id.clone()));
  }

  let mut stored = state.nodes.clone();
  stored.resize(config.nodes.len(), Value::Null);

  let mut visits = vec![Visit::Skipped; config.nodes.len()];
  let mut log = DataFlowLog::default();
  let mut first_error = None;

  for &index in &config.toposorted {
    let idx = index as usize;
    let node = &config.nodes[idx];

    let Some(compute) = Compute::of(&node.func) else {
      if is_trigger(node) {
        debug!(node = %node.name, "trigger matched");
        stored[idx] = event.payload.clone();
        visits[idx] = Visit::Computed(event.payload.clone());
      }
      continue;
    };

    let mut bindings = Bindings::new();
    let mut reached = false;
    let mut blocked = false;
    for edge in config.incoming(index) {
      let value = match &visits[edge.from as usize] {
        Visit::Computed(value) => {
          reached = true;
          value.clone()
        }
        Visit::Blocked => {
          blocked = true;
          Value::Null
        }
        Visit::Skipped => Value::Null,
      };
      bindings.insert(edge.name.clone(), value);
    }

    if blocked {
      debug!(node = %node.name, "skipping node downstream of a failure");
      visits[idx] = Visit::Blocked;
      continue;
    }
    if !reached {
      continue;
    }

    match evaluate_node(run, node, compute, bindings).await {
      Ok(result) => {
        if !result.console.is_empty() {
          log.run.push(DataFlowNodeLog {
            node: node.name.clone(),
            console: result.console,
            error: None,
          });
        }
        run.notify(EngineEvent::NodeCompleted {
          run_id: run.run_id(),
          node: node.name.clone(),
          value: result.value.clone(),
        });
        stored[idx] = result.value.clone();
        visits[idx] = Visit::Computed(result.value);
      }
      Err(e) => {
        let error = format!("node '{}': {}", node.name, e);
        warn!(node = %node.name, error = %e, "node failed");
        run.notify(EngineEvent::NodeFailed {
          run_id: run.run_id(),
          node: node.name.clone(),
          error: e.to_string(),
        });
        log.run.push(DataFlowNodeLog {
          node: node.name.clone(),
          console: Vec::new(),
          error: Some(e.to_string()),
        });
        first_error.get_or_insert(error);
        visits[idx] = Visit::Blocked;
      }
    }
  }

  Ok(Step {
    state: TaskState::DataFlow(DataFlowState { nodes: stored }),
    error: first_error,
    info: serde_json::to_value(&log).unwrap_or_default(),
  })
}

#[instrument(name = "node_evaluate", skip_all, fields(node = %node.name))]
async fn evaluate_node(
  run: &mut Run<'_>,
  node: &DataFlowNode,
  compute: Compute<'_>,
  bindings: Bindings,
) -> Result<NodeResult, NodeError> {
  match compute {
    Compute::Script { code, format } => run_code(run, code, format, &bindings).await,
    Compute::Text(text) => render_text(text, bindings).map(|value| NodeResult {
      value,
      console: Vec::new(),
    }),
    Compute::Collect => Ok(NodeResult {
      value: Value::Object(bindings),
      console: Vec::new(),
    }),
    Compute::Action(action) => {
      let payload = run_code(
        run,
        &action.payload_code.code,
        script_format(&action.payload_code),
        &bindings,
      )
      .await?;
      if payload.value.is_null() {
        debug!(action = %action.action_id, "payload is null, not invoking action");
        return Ok(payload);
      }

      let outcome = run.invoke(&action.action_id, payload.value).await;
      if outcome.succeeded() {
        Ok(NodeResult {
          value: outcome.result,
          console: payload.console,
        })
      } else {
        Err(NodeError::Action {
          local_id: action.action_id.clone(),
          message: outcome.error.unwrap_or_default(),
        })
      }
    }
  }
}

async fn run_code(
  run: &Run<'_>,
  code: &str,
  format: ScriptFormat,
  bindings: &Bindings,
) -> Result<NodeResult, NodeError> {
  let output = run.script(code, bindings, format).await?;
  Ok(NodeResult {
    value: output.value,
    console: output.console,
  })
}

fn script_format(js: &DataFlowJs) -> ScriptFormat {
  match js.format {
    JsCodeFormat::Expression => ScriptFormat::Expression,
    JsCodeFormat::Function | JsCodeFormat::AsyncFunction => ScriptFormat::Body,
  }
}

fn render_text(text: &DataFlowText, bindings: Map<String, Value>) -> Result<Value, NodeError> {
  let mut env = Environment::new();
  if text.render_as == TextRenderAs::Html {
    env.set_auto_escape_callback(|_| AutoEscape::Html);
  }
  let rendered = env.render_str(&text.body, Value::Object(bindings))?;
  Ok(Value::String(rendered))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn text(body: &str, render_as: TextRenderAs) -> DataFlowText {
    DataFlowText {
      body: body.to_string(),
      render_as,
    }
  }

  fn bindings(value: Value) -> Bindings {
    match value {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[test]
  fn test_render_plain_text() {
    let rendered = render_text(
      &text("Hello {{ user.name }}!", TextRenderAs::PlainText),
      bindings(json!({ "user": { "name": "a & b <c>" } })),
    )
    .unwrap();
    assert_eq!(rendered, json!("Hello a & b <c>!"));
  }

  #[test]
  fn test_render_html_escapes() {
    let rendered = render_text(
      &text("<p>{{ name }}</p>", TextRenderAs::Html),
      bindings(json!({ "name": "a & b <c>" })),
    )
    .unwrap();
    assert_eq!(rendered, json!("<p>a &amp; b &lt;c&gt;</p>"));
  }

  #[test]
  fn test_script_format_mapping() {
    let js = |format| DataFlowJs {
      code: String::new(),
      format,
    };
    assert_eq!(script_format(&js(JsCodeFormat::Expression)), ScriptFormat::Expression);
    assert_eq!(script_format(&js(JsCodeFormat::Function)), ScriptFormat::Body);
    assert_eq!(script_format(&js(JsCodeFormat::AsyncFunction)), ScriptFormat::Body);
  }
}
