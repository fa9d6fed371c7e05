use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cast;

/// A dynamically typed scalar, as stored in variables, list items and
/// reported by blocks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Number(f64),
  String(String),
}

impl Value {
  pub fn empty() -> Value {
    Value::String(String::new())
  }

  pub fn to_f64(&self) -> f64 {
    cast::to_number(self)
  }

  pub fn to_bool(&self) -> bool {
    cast::to_boolean(self)
  }

  pub fn is_int(&self) -> bool {
    cast::is_int(self)
  }

  pub fn is_number(&self) -> bool {
    matches!(self, Value::Number(_))
  }

  /// Runs `map` over the string form of this value without allocating
  /// when it already is a string.
  pub fn map_as_str<T, F: FnOnce(&str) -> T>(&self, map: F) -> T {
    match self {
      Value::String(string) => map(string.as_str()),
      other => map(other.to_string().as_str()),
    }
  }
}

impl Default for Value {
  fn default() -> Self {
    Value::Number(0.)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(true) => write!(f, "true"),
      Value::Bool(false) => write!(f, "false"),
      Value::Number(number) => write!(f, "{}", cast::format_number(*number)),
      Value::String(string) => write!(f, "{string}"),
    }
  }
}

impl From<f64> for Value {
  fn from(number: f64) -> Self {
    Value::Number(number)
  }
}

impl From<i32> for Value {
  fn from(number: i32) -> Self {
    Value::Number(number as f64)
  }
}

impl From<usize> for Value {
  fn from(number: usize) -> Self {
    Value::Number(number as f64)
  }
}

impl From<bool> for Value {
  fn from(boolean: bool) -> Self {
    Value::Bool(boolean)
  }
}

impl From<&str> for Value {
  fn from(string: &str) -> Self {
    Value::String(string.to_string())
  }
}

impl From<String> for Value {
  fn from(string: String) -> Self {
    Value::String(string)
  }
}
