//! Executor template rendering using minijinja.
//!
//! A `Template` is a list of executor fields. String values are minijinja
//! templates rendered against the payload, whose fields are available both
//! at the top level and under `payload`:
//!
//! ```json
//! [["to", "{{ email }}"], ["subject", "Order {{ payload.order_id }} shipped"]]
//! ```
//!
//! A string that is exactly one `{{ expr }}` keeps the expression's typed
//! value, so `"{{ items }}"` renders to an array rather than its text form.

use std::sync::Arc;

use cadence_config::value::Map;
use cadence_config::{ScriptOrTemplate, TemplateFields, Value};
use cadence_script::{Bindings, ScriptError, ScriptEvaluator, ScriptRequest, run_blocking};
use minijinja::Environment;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;

/// Render an action's executor template against a payload.
///
/// `overrides` come from the task's binding and replace same-named entries
/// of the action's template; entries only present in the overrides are
/// appended.
pub async fn render_template(
  evaluator: &Arc<dyn ScriptEvaluator>,
  template: &ScriptOrTemplate,
  overrides: Option<&[(String, Value)]>,
  payload: &Value,
  cancel: &CancellationToken,
) -> Result<Value, ActionError> {
  match template {
    ScriptOrTemplate::Script(code) => {
      let mut bindings = Bindings::new();
      bindings.insert("payload".to_string(), payload.clone());
      let request = ScriptRequest::new(code, &bindings).cancel(cancel);
      run_blocking(evaluator.clone(), request)
        .await
        .map(|output| output.value)
        .map_err(|e| match e {
          ScriptError::Cancelled => ActionError::Cancelled,
          e => ActionError::Template(e.to_string()),
        })
    }
    ScriptOrTemplate::Template(entries) => {
      let env = Environment::new();
      let context = minijinja::Value::from_serialize(template_context(payload));

      let mut rendered = Map::new();
      for (name, value) in merge_entries(entries, overrides.unwrap_or_default()) {
        let value = render_value(&env, value, &context)
          .map_err(|e| ActionError::Template(format!("failed to render '{}': {}", name, e)))?;
        rendered.insert(name.to_string(), value);
      }

      Ok(Value::Object(rendered))
    }
  }
}

/// Check a rendered template against the fields an executor declares.
pub fn check_template_fields(fields: &TemplateFields, template: &Value) -> Result<(), ActionError> {
  for field in fields {
    match template.get(&field.name).filter(|v| !v.is_null()) {
      None if field.optional => {}
      None => {
        return Err(ActionError::Template(format!(
          "missing required field '{}'",
          field.name
        )));
      }
      Some(value) if !field.format.accepts(value) => {
        return Err(ActionError::Template(format!(
          "field '{}' does not match its declared format",
          field.name
        )));
      }
      Some(_) => {}
    }
  }
  Ok(())
}

fn merge_entries<'a>(
  entries: &'a [(String, Value)],
  overrides: &'a [(String, Value)],
) -> Vec<(&'a str, &'a Value)> {
  let mut merged: Vec<(&str, &Value)> = entries
    .iter()
    .map(|(name, value)| {
      let value = overrides
        .iter()
        .find(|(o, _)| o == name)
        .map_or(value, |(_, o)| o);
      (name.as_str(), value)
    })
    .collect();

  for (name, value) in overrides {
    if !entries.iter().any(|(e, _)| e == name) {
      merged.push((name.as_str(), value));
    }
  }

  merged
}

fn template_context(payload: &Value) -> Value {
  let mut context = match payload {
    Value::Object(map) => map.clone(),
    _ => Map::new(),
  };
  context.insert("payload".to_string(), payload.clone());
  Value::Object(context)
}

fn render_value(
  env: &Environment,
  value: &Value,
  context: &minijinja::Value,
) -> Result<Value, minijinja::Error> {
  match value {
    Value::String(template) => render_string(env, template, context),
    Value::Array(items) => items
      .iter()
      .map(|item| render_value(env, item, context))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => map
      .iter()
      .map(|(k, v)| Ok((k.clone(), render_value(env, v, context)?)))
      .collect::<Result<Map<_, _>, _>>()
      .map(Value::Object),
    other => Ok(other.clone()),
  }
}

fn render_string(
  env: &Environment,
  template: &str,
  context: &minijinja::Value,
) -> Result<Value, minijinja::Error> {
  if let Some(expr) = single_expression(template) {
    let result = env.compile_expression(expr)?.eval(context)?;
    return serde_json::to_value(&result).map_err(|e| {
      minijinja::Error::new(minijinja::ErrorKind::BadSerialization, e.to_string())
    });
  }

  env.render_str(template, context).map(Value::String)
}

/// The inner expression of a string that is exactly one `{{ ... }}` block.
fn single_expression(template: &str) -> Option<&str> {
  let inner = template
    .trim()
    .strip_prefix("{{")?
    .strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") {
    return None;
  }
  Some(inner.trim())
}

#[cfg(test)]
mod tests {
  use super::*;
  use cadence_config::{TemplateField, TemplateFieldFormat};
  use cadence_script::LuaEvaluator;
  use serde_json::json;

  async fn render(
    template: &ScriptOrTemplate,
    overrides: Option<&[(String, Value)]>,
    payload: &Value,
  ) -> Value {
    let evaluator: Arc<dyn ScriptEvaluator> = Arc::new(LuaEvaluator::default());
    render_template(&evaluator, template, overrides, payload, &CancellationToken::new())
      .await
      .unwrap()
  }

  fn entries(value: Value) -> Vec<(String, Value)> {
    value
      .as_object()
      .unwrap()
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  #[tokio::test]
  async fn test_render_string_fields() {
    let template = ScriptOrTemplate::Template(entries(json!({
      "to": "{{ email }}",
      "subject": "Order {{ payload.order_id }} shipped",
    })));
    let payload = json!({ "email": "a@example.com", "order_id": 42 });

    let rendered = render(&template, None, &payload).await;
    assert_eq!(
      rendered,
      json!({ "to": "a@example.com", "subject": "Order 42 shipped" })
    );
  }

  #[tokio::test]
  async fn test_single_expression_keeps_type() {
    let template = ScriptOrTemplate::Template(entries(json!({
      "items": "{{ items }}",
      "count": "{{ items | length }}",
      "missing": "{{ nothing }}",
    })));
    let payload = json!({ "items": [1, 2, 3] });

    let rendered = render(&template, None, &payload).await;
    assert_eq!(rendered["items"], json!([1, 2, 3]));
    assert_eq!(rendered["count"], json!(3));
    assert_eq!(rendered["missing"], Value::Null);
  }

  #[tokio::test]
  async fn test_nested_values_render() {
    let template = ScriptOrTemplate::Template(entries(json!({
      "headers": { "x-user": "{{ user }}" },
      "tags": ["static", "{{ user }}"],
      "retries": 3,
    })));
    let payload = json!({ "user": "ana" });

    let rendered = render(&template, None, &payload).await;
    assert_eq!(
      rendered,
      json!({
        "headers": { "x-user": "ana" },
        "tags": ["static", "ana"],
        "retries": 3,
      })
    );
  }

  #[tokio::test]
  async fn test_overrides_replace_and_append() {
    let template = ScriptOrTemplate::Template(vec![
      ("url".to_string(), json!("https://default.example.com")),
      ("method".to_string(), json!("GET")),
    ]);
    let overrides = vec![
      ("url".to_string(), json!("https://{{ host }}/hook")),
      ("extra".to_string(), json!(true)),
    ];

    let rendered = render(&template, Some(&overrides), &json!({ "host": "api.example.com" })).await;
    assert_eq!(
      rendered,
      json!({ "url": "https://api.example.com/hook", "method": "GET", "extra": true })
    );
  }

  #[tokio::test]
  async fn test_script_template() {
    let template = ScriptOrTemplate::Script("return { script = 'return 1', args = payload }".into());
    let payload = json!({ "n": 1 });

    let rendered = render(&template, None, &payload).await;
    assert_eq!(rendered, json!({ "script": "return 1", "args": { "n": 1 } }));
  }

  #[test]
  fn test_check_template_fields() {
    let fields = vec![
      TemplateField {
        name: "url".into(),
        format: TemplateFieldFormat::String { default: None },
        optional: false,
        description: None,
      },
      TemplateField {
        name: "retries".into(),
        format: TemplateFieldFormat::Integer { default: None },
        optional: true,
        description: None,
      },
    ];

    assert!(check_template_fields(&fields, &json!({ "url": "https://x" })).is_ok());
    assert!(matches!(
      check_template_fields(&fields, &json!({ "retries": 2 })),
      Err(ActionError::Template(msg)) if msg.contains("url")
    ));
    assert!(matches!(
      check_template_fields(&fields, &json!({ "url": "https://x", "retries": "two" })),
      Err(ActionError::Template(msg)) if msg.contains("retries")
    ));
  }
}
