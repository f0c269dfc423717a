//! Action catalog entries.
//!
//! Actions are defined outside of any task. A task binds an action under a
//! local id (see [`TaskAction`](crate::TaskAction)) and the engine looks the
//! catalog entry up when the binding is invoked.

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub type ActionId = String;
pub type AccountId = String;
pub type ExecutorId = String;

/// How an action turns its payload into the executor's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum ScriptOrTemplate {
  /// A list of executor fields, each a value whose strings are templates
  /// rendered against the payload.
  Template(Vec<(String, Value)>),
  /// A script evaluated with `payload` bound; its result is the executor input.
  Script(String),
}

/// The expected format of an executor template field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateFieldFormat {
  String {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
  },
  StringArray {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Vec<String>>,
  },
  Integer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<i64>,
  },
  Float {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<f64>,
  },
  Boolean {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<bool>,
  },
  Object {
    /// Whether the object's values may themselves be arrays or objects.
    #[serde(default)]
    nested: bool,
    /// The default value, represented as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
  },
  Choice {
    choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Vec<String>>,
  },
}

impl TemplateFieldFormat {
  /// Check that a rendered value has the shape this format expects.
  pub fn accepts(&self, value: &Value) -> bool {
    match self {
      Self::String { .. } => value.is_string(),
      Self::StringArray { .. } => value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string)),
      Self::Integer { .. } => value.is_i64() || value.is_u64(),
      Self::Float { .. } => value.is_number(),
      Self::Boolean { .. } => value.is_boolean(),
      Self::Object { nested, .. } => value.as_object().is_some_and(|map| {
        *nested || map.values().all(|v| !v.is_object() && !v.is_array())
      }),
      Self::Choice {
        choices, min, max, ..
      } => {
        let picked: Vec<&str> = match value {
          Value::String(s) => vec![s.as_str()],
          Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
          _ => return false,
        };

        picked.iter().all(|p| choices.iter().any(|c| c == p))
          && min.is_none_or(|min| picked.len() >= min)
          && max.is_none_or(|max| picked.len() <= max)
      }
    }
  }
}

/// A field an executor accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
  pub name: String,
  pub format: TemplateFieldFormat,
  pub optional: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

pub type TemplateFields = Vec<TemplateField>;

/// A catalog action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  pub action_id: ActionId,
  #[serde(default)]
  pub action_category_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub executor_id: ExecutorId,
  pub executor_template: ScriptOrTemplate,
  #[serde(default)]
  pub template_fields: TemplateFields,
  /// Timeout in seconds. The engine default applies when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout: Option<u32>,
  /// Processes the executor's result. The result is bound as `result` and the
  /// payload as `payload`; the returned value replaces the result, and a thrown
  /// value marks the action failed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub postprocess_script: Option<String>,
  #[serde(default)]
  pub account_required: bool,
  #[serde(default)]
  pub account_types: Vec<String>,
  #[serde(default = "enabled_by_default")]
  pub enabled: bool,
}

fn enabled_by_default() -> bool {
  true
}

/// Public description of a registered executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
  pub name: String,
  pub template_fields: TemplateFields,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_action_deserialize_defaults() {
    let action: Action = serde_json::from_value(json!({
      "action_id": "send_email",
      "name": "Send Email",
      "executor_id": "http",
      "executor_template": { "t": "Template", "c": [["url", "https://mail/{{ to }}"]] }
    }))
    .unwrap();

    assert!(action.enabled);
    assert!(!action.account_required);
    assert_eq!(action.timeout, None);
    assert_eq!(
      action.executor_template,
      ScriptOrTemplate::Template(vec![("url".to_string(), json!("https://mail/{{ to }}"))])
    );
  }

  #[test]
  fn test_script_template_tagging() {
    let template: ScriptOrTemplate =
      serde_json::from_value(json!({ "t": "Script", "c": "return payload" })).unwrap();
    assert_eq!(template, ScriptOrTemplate::Script("return payload".into()));
  }

  #[test]
  fn test_format_accepts() {
    let string = TemplateFieldFormat::String { default: None };
    assert!(string.accepts(&json!("x")));
    assert!(!string.accepts(&json!(1)));

    let flat = TemplateFieldFormat::Object {
      nested: false,
      default: None,
    };
    assert!(flat.accepts(&json!({ "a": 1 })));
    assert!(!flat.accepts(&json!({ "a": { "b": 1 } })));

    let choice = TemplateFieldFormat::Choice {
      choices: vec!["GET".into(), "POST".into()],
      min: None,
      max: Some(1),
      default: None,
    };
    assert!(choice.accepts(&json!("GET")));
    assert!(!choice.accepts(&json!(["GET", "POST"])));
    assert!(!choice.accepts(&json!("DELETE")));
  }
}
