use std::sync::Arc;

use async_trait::async_trait;
use cadence_config::{TemplateField, TemplateFieldFormat, TemplateFields, Value};
use cadence_script::{
  Bindings, ScriptError, ScriptEvaluator, ScriptFormat, ScriptRequest, run_blocking,
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::ExecutorError;
use crate::executor::{Executor, ExecutorRequest};

/// Runs the `script` template field as a statement block with `args` bound.
///
/// Returns `{ "result": <return value>, "console": [...] }`.
pub struct ScriptExecutor {
  evaluator: Arc<dyn ScriptEvaluator>,
  template_fields: TemplateFields,
}

impl ScriptExecutor {
  pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
    let template_fields = vec![
      TemplateField {
        name: "name".to_string(),
        format: TemplateFieldFormat::String { default: None },
        optional: true,
        description: Some("The name of the script, used in logs".to_string()),
      },
      TemplateField {
        name: "script".to_string(),
        format: TemplateFieldFormat::String { default: None },
        optional: false,
        description: Some("The script to execute".to_string()),
      },
      TemplateField {
        name: "args".to_string(),
        format: TemplateFieldFormat::Object {
          nested: true,
          default: None,
        },
        optional: true,
        description: Some("Arguments to the script. Exposed as 'args' in the script".to_string()),
      },
    ];

    Self {
      evaluator,
      template_fields,
    }
  }
}

#[async_trait]
impl Executor for ScriptExecutor {
  fn name(&self) -> &str {
    "script"
  }

  fn template_fields(&self) -> &TemplateFields {
    &self.template_fields
  }

  #[instrument(skip_all, fields(executor = "script"))]
  async fn execute(&self, request: ExecutorRequest) -> Result<Value, ExecutorError> {
    let script = request.required_str("script")?;
    let args = request.field("args").cloned().unwrap_or_else(|| json!({}));

    let mut bindings = Bindings::new();
    bindings.insert("args".to_string(), args);

    debug!(%script, "executing script");
    let script_request = ScriptRequest::new(script, &bindings)
      .format(ScriptFormat::Body)
      .timeout(Some(request.timeout))
      .cancel(&request.cancel);
    let output = run_blocking(self.evaluator.clone(), script_request)
      .await
      .map_err(|e| match e {
        ScriptError::Timeout(limit) => ExecutorError::Timeout(limit),
        ScriptError::Cancelled => ExecutorError::Cancelled,
        e => ExecutorError::Failed {
          message: e.to_string(),
          result: Value::Null,
        },
      })?;

    Ok(json!({
      "result": output.value,
      "console": output.console,
    }))
  }
}
