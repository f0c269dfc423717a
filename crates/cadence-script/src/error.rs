use std::time::Duration;

use cadence_config::Value;

/// Errors raised while evaluating a script.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
  /// The script read a variable that was never bound.
  #[error("reference to unbound variable '{0}'")]
  Reference(String),

  /// The script raised a value with `error(...)`.
  #[error("script threw: {0}")]
  Thrown(Value),

  /// The script failed to parse.
  #[error("syntax error: {0}")]
  Syntax(String),

  /// The script ran past its wall-clock limit.
  #[error("script exceeded its time limit of {0:?}")]
  Timeout(Duration),

  /// The caller cancelled the evaluation.
  #[error("script cancelled")]
  Cancelled,

  /// The interpreter failed for another reason.
  #[error("script runtime error: {0}")]
  Runtime(String),

  /// A binding or the result could not be converted to or from a value.
  #[error("value conversion failed: {0}")]
  Conversion(String),
}
