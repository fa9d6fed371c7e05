//! Type coercion shared by the interpreter, the compiler's constant folding
//! and the code the compiler emits. Every path must agree bit for bit, so
//! nothing else in the crate converts values on its own.

use std::cmp::Ordering;

use crate::value::Value;

/// Result of resolving a user supplied list index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListIndex {
  /// 1-based position inside the list.
  Item(usize),
  All,
  Invalid,
}

/// Numeric conversion with the `Number(x)` rules: unparsable strings give
/// NaN, blank strings give 0.
pub fn js_number(value: &Value) -> f64 {
  match value {
    Value::Number(number) => *number,
    Value::Bool(true) => 1.,
    Value::Bool(false) => 0.,
    Value::String(string) => parse_number(string),
  }
}

fn is_js_whitespace(c: char) -> bool {
  c.is_whitespace() || c == '\u{feff}'
}

pub fn parse_number(string: &str) -> f64 {
  let trimmed = string.trim_matches(is_js_whitespace);
  if trimmed.is_empty() {
    return 0.;
  }
  let radix = match trimmed.get(..2) {
    Some("0x") | Some("0X") => Some(16),
    Some("0b") | Some("0B") => Some(2),
    Some("0o") | Some("0O") => Some(8),
    _ => None,
  };
  if let Some(radix) = radix {
    return u64::from_str_radix(&trimmed[2..], radix)
      .map(|n| n as f64)
      .unwrap_or(f64::NAN);
  }
  match trimmed {
    "Infinity" | "+Infinity" => return f64::INFINITY,
    "-Infinity" => return f64::NEG_INFINITY,
    _ => {}
  }
  if !trimmed
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
  {
    return f64::NAN;
  }
  trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// General numeric coercion: NaN becomes 0.
pub fn to_number(value: &Value) -> f64 {
  let number = js_number(value);
  if number.is_nan() {
    0.
  } else {
    number
  }
}

pub fn to_boolean(value: &Value) -> bool {
  match value {
    Value::Bool(boolean) => *boolean,
    Value::Number(number) => *number != 0. && !number.is_nan(),
    Value::String(string) => {
      !(string.is_empty()
        || string == "0"
        || string.eq_ignore_ascii_case("false"))
    }
  }
}

/// Formats a number the way `Number.prototype.toString` does.
pub fn format_number(number: f64) -> String {
  if number.is_nan() {
    return "NaN".to_string();
  }
  if number.is_infinite() {
    return if number > 0. { "Infinity" } else { "-Infinity" }.to_string();
  }
  if number == 0. {
    return "0".to_string();
  }
  let magnitude = number.abs();
  if !(1e-6..1e21).contains(&magnitude) {
    let formatted = format!("{number:e}");
    return match formatted.split_once('e') {
      Some((mantissa, exponent)) if !exponent.starts_with('-') => {
        format!("{mantissa}e+{exponent}")
      }
      _ => formatted,
    };
  }
  format!("{number}")
}

/// Blank or whitespace-only string.
pub fn is_white_space(value: &Value) -> bool {
  match value {
    Value::String(string) => string.trim_matches(is_js_whitespace).is_empty(),
    _ => false,
  }
}

/// Compares two values the way the comparison blocks do.
///
/// Values are compared numerically unless one of them is non-numeric and
/// not blank, in which case a case-insensitive string comparison decides.
/// Blank strings count as NaN here (not 0), so a blank value against a
/// number is unordered: `<`, `>` and `=` are all false.
pub fn compare(v1: &Value, v2: &Value) -> Option<Ordering> {
  let blank1 = is_white_space(v1);
  let blank2 = is_white_space(v2);
  let n1 = if blank1 { f64::NAN } else { js_number(v1) };
  let n2 = if blank2 { f64::NAN } else { js_number(v2) };
  let textual = (n1.is_nan() && !blank1) || (n2.is_nan() && !blank2);
  if textual || (blank1 && blank2) {
    let s1 = v1.to_string().to_lowercase();
    let s2 = v2.to_string().to_lowercase();
    return Some(s1.cmp(&s2));
  }
  if n1.is_nan() || n2.is_nan() {
    return None;
  }
  if n1.is_infinite() && n1 == n2 {
    return Some(Ordering::Equal);
  }
  n1.partial_cmp(&n2)
}

pub fn lt(v1: &Value, v2: &Value) -> bool {
  compare(v1, v2) == Some(Ordering::Less)
}

pub fn gt(v1: &Value, v2: &Value) -> bool {
  compare(v1, v2) == Some(Ordering::Greater)
}

pub fn equals(v1: &Value, v2: &Value) -> bool {
  compare(v1, v2) == Some(Ordering::Equal)
}

/// Whether a value should be treated as an integer by `pick random`.
pub fn is_int(value: &Value) -> bool {
  match value {
    Value::Number(number) => number.is_nan() || number.fract() == 0.,
    Value::Bool(_) => true,
    Value::String(string) => !string.contains('.'),
  }
}

pub fn to_list_index(
  index: &Value,
  length: usize,
  accept_all: bool,
) -> ListIndex {
  if let Value::String(string) = index {
    match string.as_str() {
      "all" => {
        return if accept_all {
          ListIndex::All
        } else {
          ListIndex::Invalid
        };
      }
      "last" => {
        return if length > 0 {
          ListIndex::Item(length)
        } else {
          ListIndex::Invalid
        };
      }
      "random" | "any" => {
        return if length > 0 {
          ListIndex::Item(1 + (random_fraction() * length as f64) as usize)
        } else {
          ListIndex::Invalid
        };
      }
      _ => {}
    }
  }
  let index = to_number(index).floor();
  if index < 1. || index > length as f64 {
    return ListIndex::Invalid;
  }
  ListIndex::Item(index as usize)
}

/// `Math.round`: halves round towards positive infinity.
pub fn js_round(number: f64) -> f64 {
  (number + 0.5).floor()
}

/// Uniform value in `[0, 1)`.
pub fn random_fraction() -> f64 {
  let sample = unsafe { libc::rand() } as f64;
  sample / (libc::RAND_MAX as f64 + 1.)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_strings_coerce_to_zero_in_arithmetic() {
    assert_eq!(to_number(&Value::from("")), 0.);
    assert_eq!(to_number(&Value::from("   ")), 0.);
    assert_eq!(to_number(&Value::from(" 12 ")), 12.);
    assert_eq!(to_number(&Value::from("abc")), 0.);
    assert_eq!(to_number(&Value::from("0x10")), 16.);
    assert_eq!(to_number(&Value::from("inf")), 0.);
    assert_eq!(to_number(&Value::from("-Infinity")), f64::NEG_INFINITY);
  }

  #[test]
  fn blank_against_number_is_unordered() {
    let blank = Value::from("");
    let zero = Value::from(0.);
    assert!(!lt(&blank, &zero));
    assert!(!lt(&zero, &blank));
    assert!(!gt(&blank, &zero));
    assert!(!equals(&blank, &zero));
  }

  #[test]
  fn text_comparisons_ignore_case() {
    assert!(equals(&Value::from("Hello"), &Value::from("hELLO")));
    assert!(lt(&Value::from("a"), &Value::from("Z")));
    assert!(lt(&Value::from(""), &Value::from("a")));
    assert!(equals(&Value::from(""), &Value::from("")));
  }

  #[test]
  fn numeric_strings_compare_as_numbers() {
    assert!(lt(&Value::from("2"), &Value::from("10")));
    assert!(equals(&Value::from(123.), &Value::from("123")));
    assert!(equals(&Value::from(true), &Value::from(1.)));
    assert!(equals(
      &Value::from(f64::INFINITY),
      &Value::from("Infinity")
    ));
  }

  #[test]
  fn booleans_from_strings() {
    assert!(!to_boolean(&Value::from("false")));
    assert!(!to_boolean(&Value::from("FALSE")));
    assert!(!to_boolean(&Value::from("0")));
    assert!(!to_boolean(&Value::from("")));
    assert!(to_boolean(&Value::from("0.0")));
    assert!(!to_boolean(&Value::from(f64::NAN)));
  }

  #[test]
  fn formats_like_javascript() {
    assert_eq!(format_number(1e21), "1e+21");
    assert_eq!(format_number(1.5e-7), "1.5e-7");
    assert_eq!(format_number(-0.), "0");
    assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    assert_eq!(format_number(123456789.), "123456789");
  }

  #[test]
  fn list_indices() {
    assert_eq!(to_list_index(&Value::from("last"), 3, false), ListIndex::Item(3));
    assert_eq!(to_list_index(&Value::from("all"), 3, false), ListIndex::Invalid);
    assert_eq!(to_list_index(&Value::from("all"), 3, true), ListIndex::All);
    assert_eq!(to_list_index(&Value::from(2.7), 3, false), ListIndex::Item(2));
    assert_eq!(to_list_index(&Value::from(4.), 3, false), ListIndex::Invalid);
    assert_eq!(to_list_index(&Value::from("last"), 0, false), ListIndex::Invalid);
  }

  #[test]
  fn rounds_halves_up() {
    assert_eq!(js_round(2.5), 3.);
    assert_eq!(js_round(-2.5), -2.);
  }
}
