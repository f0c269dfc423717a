//! The value model shared by payloads, contexts, node results and script
//! bindings.
//!
//! Values are plain JSON values. Cloning a value is a deep copy, so nothing
//! handed to a node or an action can alias the task's persisted state.

pub use serde_json::{Map, Value};

/// Look up a path inside a value.
///
/// Segments are separated by `.`, numeric segments index into arrays. An empty
/// path (or `.`) refers to the value itself. A leading `$.` is ignored, and a
/// path starting with `/` is read as a JSON pointer.
///
/// An explicit `null` at the end of the path counts as present.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  let path = path.trim();

  if path.starts_with('/') {
    return value.pointer(path);
  }

  let path = path
    .strip_prefix("$.")
    .or_else(|| path.strip_prefix('$'))
    .unwrap_or(path);

  if path.is_empty() || path == "." {
    return Some(value);
  }

  path
    .split('.')
    .try_fold(value, |current, segment| match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
}

/// Build an object value from name/value pairs.
pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
  Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

/// Parse a serialized task context. An empty string is a `null` context.
pub fn parse_context(context: &str) -> Result<Value, serde_json::Error> {
  if context.trim().is_empty() {
    Ok(Value::Null)
  } else {
    serde_json::from_str(context)
  }
}

/// Serialize a context value for storage alongside a script task.
pub fn serialize_context(context: &Value) -> String {
  context.to_string()
}
