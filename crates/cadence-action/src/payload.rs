//! Payload building.
//!
//! A payload builder is either a map of independently sourced fields or a
//! single script producing the whole payload. Scripts see `input` (the
//! triggering event) and `context` (the task's current context).

use std::sync::Arc;

use cadence_config::value::{self, Map};
use cadence_config::{ActionInvokeDefDataField, ActionPayloadBuilder, Value};
use cadence_script::{Bindings, ScriptError, ScriptEvaluator, ScriptRequest, run_blocking};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::BuildError;

/// Build the payload for one action.
///
/// Every field of a `FieldMap` is evaluated even after a failure so each
/// problem shows up in the logs; the first failure in field-name order is
/// returned.
pub async fn build_payload(
  evaluator: &Arc<dyn ScriptEvaluator>,
  builder: &ActionPayloadBuilder,
  input: &Value,
  context: &Value,
  cancel: &CancellationToken,
) -> Result<Value, BuildError> {
  let bindings = script_bindings(input, context);

  match builder {
    ActionPayloadBuilder::Script(code) => evaluate(evaluator, code, &bindings, cancel)
      .await
      .map_err(BuildError::PayloadScript),
    ActionPayloadBuilder::FieldMap(fields) => {
      let mut payload = Map::new();
      let mut first_error = None;

      for (name, field) in fields {
        let resolved = match field {
          ActionInvokeDefDataField::Script(code) => evaluate(evaluator, code, &bindings, cancel)
            .await
            .map(Some)
            .map_err(|source| BuildError::Script {
              field: name.clone(),
              source,
            }),
          field => resolve_field(name, field, input, context),
        };
        match resolved {
          Ok(Some(value)) => {
            payload.insert(name.clone(), value);
          }
          Ok(None) => {}
          Err(e) => {
            warn!(field = %name, error = %e, "payload field failed");
            first_error.get_or_insert(e);
          }
        }
      }

      match first_error {
        Some(e) => Err(e),
        None => Ok(Value::Object(payload)),
      }
    }
  }
}

fn script_bindings(input: &Value, context: &Value) -> Bindings {
  let mut bindings = Bindings::new();
  bindings.insert("input".to_string(), input.clone());
  bindings.insert("context".to_string(), context.clone());
  bindings
}

async fn evaluate(
  evaluator: &Arc<dyn ScriptEvaluator>,
  code: &str,
  bindings: &Bindings,
  cancel: &CancellationToken,
) -> Result<Value, ScriptError> {
  let request = ScriptRequest::new(code, bindings).cancel(cancel);
  run_blocking(evaluator.clone(), request)
    .await
    .map(|output| output.value)
}

/// Resolve a non-script field. `Ok(None)` means an optional field was absent
/// and is left out.
fn resolve_field(
  name: &str,
  field: &ActionInvokeDefDataField,
  input: &Value,
  context: &Value,
) -> Result<Option<Value>, BuildError> {
  let from_path = |source: &Value, path: &str, required: bool| match value::lookup(source, path) {
    Some(v) => Ok(Some(v.clone())),
    None if required => Err(BuildError::MissingField(name.to_string())),
    None => Ok(None),
  };

  match field {
    ActionInvokeDefDataField::Input(path, required) => from_path(input, path, *required),
    ActionInvokeDefDataField::Context(path, required) => from_path(context, path, *required),
    ActionInvokeDefDataField::Constant(value) => Ok(Some(value.clone())),
    ActionInvokeDefDataField::Script(_) => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use cadence_script::{LuaEvaluator, ScriptOutput};
  use serde_json::json;

  /// Fails the test if any script is evaluated.
  struct NoScripts;

  impl ScriptEvaluator for NoScripts {
    fn run(&self, request: ScriptRequest<'_>) -> Result<ScriptOutput, ScriptError> {
      panic!("unexpected script evaluation: {}", request.code)
    }
  }

  async fn build(
    evaluator: impl ScriptEvaluator + 'static,
    builder: &ActionPayloadBuilder,
    input: &Value,
    context: &Value,
  ) -> Result<Value, BuildError> {
    let evaluator: Arc<dyn ScriptEvaluator> = Arc::new(evaluator);
    build_payload(&evaluator, builder, input, context, &CancellationToken::new()).await
  }

  fn field_map(fields: Vec<(&str, ActionInvokeDefDataField)>) -> ActionPayloadBuilder {
    ActionPayloadBuilder::FieldMap(
      fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect::<BTreeMap<_, _>>(),
    )
  }

  #[tokio::test]
  async fn test_constants_round_trip() {
    let constants = json!({
      "count": 3,
      "nested": { "list": [1, "two", null], "flag": true },
      "text": "hello",
    });
    let builder = field_map(
      constants
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.as_str(), ActionInvokeDefDataField::Constant(v.clone())))
        .collect(),
    );

    let payload = build(NoScripts, &builder, &json!({}), &Value::Null).await.unwrap();
    let reparsed: Value = serde_json::from_str(&payload.to_string()).unwrap();
    assert_eq!(reparsed, constants);
  }

  #[tokio::test]
  async fn test_input_and_context_paths() {
    let builder = field_map(vec![
      ("amount", ActionInvokeDefDataField::Input("order.amount".into(), true)),
      ("owner", ActionInvokeDefDataField::Context("owner".into(), true)),
      ("note", ActionInvokeDefDataField::Input("note".into(), false)),
    ]);

    let payload = build(
      NoScripts,
      &builder,
      &json!({ "order": { "amount": 12 } }),
      &json!({ "owner": "ana" }),
    )
    .await
    .unwrap();

    assert_eq!(payload, json!({ "amount": 12, "owner": "ana" }));
  }

  #[tokio::test]
  async fn test_missing_required_field() {
    let builder = field_map(vec![(
      "amount",
      ActionInvokeDefDataField::Input("amount".into(), true),
    )]);

    let err = build(NoScripts, &builder, &json!({}), &Value::Null).await.unwrap_err();
    assert!(matches!(err, BuildError::MissingField(name) if name == "amount"));
  }

  #[tokio::test]
  async fn test_first_failure_in_field_order() {
    let builder = field_map(vec![
      ("zeta", ActionInvokeDefDataField::Input("z".into(), true)),
      ("alpha", ActionInvokeDefDataField::Input("a".into(), true)),
    ]);

    let err = build(NoScripts, &builder, &json!({}), &Value::Null).await.unwrap_err();
    assert!(matches!(err, BuildError::MissingField(name) if name == "alpha"));
  }

  #[tokio::test]
  async fn test_script_field_sees_input_and_context() {
    let builder = field_map(vec![(
      "total",
      ActionInvokeDefDataField::Script("input.amount * context.rate".into()),
    )]);

    let payload = build(
      LuaEvaluator::default(),
      &builder,
      &json!({ "amount": 4 }),
      &json!({ "rate": 3 }),
    )
    .await
    .unwrap();
    assert_eq!(payload, json!({ "total": 12 }));
  }

  #[tokio::test]
  async fn test_script_field_error_names_field() {
    let builder = field_map(vec![(
      "broken",
      ActionInvokeDefDataField::Script("nope.value".into()),
    )]);

    let err = build(LuaEvaluator::default(), &builder, &json!({}), &Value::Null)
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      BuildError::Script { field, source: ScriptError::Reference(_) } if field == "broken"
    ));
  }

  #[tokio::test]
  async fn test_whole_payload_script() {
    let builder =
      ActionPayloadBuilder::Script("return { to = input.email, subject = 'hi' }".into());

    let payload = build(
      LuaEvaluator::default(),
      &builder,
      &json!({ "email": "a@example.com" }),
      &Value::Null,
    )
    .await
    .unwrap();
    assert_eq!(payload, json!({ "to": "a@example.com", "subject": "hi" }));
  }
}
