use std::collections::HashMap;

use async_trait::async_trait;
use cadence_config::{TemplateField, TemplateFieldFormat, TemplateFields, Value};
use reqwest::{Client, Method};
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::ExecutorError;
use crate::executor::{Executor, ExecutorRequest};

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Performs an HTTP request described by the template.
///
/// Template fields:
/// - `url`: target URL
/// - `method`: defaults to `GET`
/// - `headers`: optional header map
/// - `json`: a body sent as JSON, or `body`: a raw string body
///
/// Returns `{ "status", "headers", "body" }`, with the body parsed as JSON
/// when possible. A non-2xx status is a failure carrying the same value.
pub struct HttpExecutor {
  client: Client,
  template_fields: TemplateFields,
}

impl Default for HttpExecutor {
  fn default() -> Self {
    Self::new()
  }
}

impl HttpExecutor {
  pub fn new() -> Self {
    Self::with_client(Client::new())
  }

  pub fn with_client(client: Client) -> Self {
    let field = |name: &str, format: TemplateFieldFormat, optional: bool, description: &str| {
      TemplateField {
        name: name.to_string(),
        format,
        optional,
        description: Some(description.to_string()),
      }
    };

    let template_fields = vec![
      field(
        "url",
        TemplateFieldFormat::String { default: None },
        false,
        "The URL to request",
      ),
      field(
        "method",
        TemplateFieldFormat::Choice {
          choices: METHODS.iter().map(|m| m.to_string()).collect(),
          min: Some(1),
          max: Some(1),
          default: Some(vec!["GET".to_string()]),
        },
        true,
        "The HTTP method",
      ),
      field(
        "headers",
        TemplateFieldFormat::Object {
          nested: false,
          default: None,
        },
        true,
        "Request headers",
      ),
      field(
        "json",
        TemplateFieldFormat::Object {
          nested: true,
          default: None,
        },
        true,
        "A body to send as JSON",
      ),
      field(
        "body",
        TemplateFieldFormat::String { default: None },
        true,
        "A raw string body",
      ),
    ];

    Self {
      client,
      template_fields,
    }
  }
}

#[async_trait]
impl Executor for HttpExecutor {
  fn name(&self) -> &str {
    "http"
  }

  fn template_fields(&self) -> &TemplateFields {
    &self.template_fields
  }

  #[instrument(skip_all, fields(executor = "http"))]
  async fn execute(&self, request: ExecutorRequest) -> Result<Value, ExecutorError> {
    let url = request.required_str("url")?;
    let method = parse_method(request.str_field("method")?.unwrap_or("GET"))?;

    let mut builder = self
      .client
      .request(method.clone(), url)
      .timeout(request.timeout);

    if let Some(headers) = request.field("headers") {
      let headers = headers.as_object().ok_or_else(|| ExecutorError::FieldFormat {
        field: "headers".to_string(),
        expected: "an object".to_string(),
      })?;
      for (key, value) in headers {
        let value = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        builder = builder.header(key, value);
      }
    }

    if let Some(body) = request.field("json") {
      builder = builder.json(body);
    } else if let Some(body) = request.str_field("body")? {
      builder = builder.body(body.to_string());
    }

    debug!(%method, %url, "sending request");
    let response = builder.send().await?;

    let status = response.status();
    let headers: HashMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();

    let body = response.text().await?;
    let body = serde_json::from_str(&body).unwrap_or(Value::String(body));

    let output = json!({
      "status": status.as_u16(),
      "headers": headers,
      "body": body,
    });

    if status.is_success() {
      Ok(output)
    } else {
      Err(ExecutorError::Failed {
        message: format!("request to {} returned {}", url, status),
        result: output,
      })
    }
  }
}

fn parse_method(method: &str) -> Result<Method, ExecutorError> {
  let upper = method.to_uppercase();
  if !METHODS.contains(&upper.as_str()) {
    return Err(ExecutorError::FieldFormat {
      field: "method".to_string(),
      expected: format!("one of {}", METHODS.join(", ")),
    });
  }
  Method::from_bytes(upper.as_bytes()).map_err(|_| ExecutorError::FieldFormat {
    field: "method".to_string(),
    expected: "a valid HTTP method".to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_method() {
    assert_eq!(parse_method("post").unwrap(), Method::POST);
    assert_eq!(parse_method("GET").unwrap(), Method::GET);
    assert!(matches!(
      parse_method("BREW"),
      Err(ExecutorError::FieldFormat { field, .. }) if field == "method"
    ));
  }
}
