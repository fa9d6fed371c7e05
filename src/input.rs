use std::fmt;
use std::fmt::Formatter;

use serde::de::{Error, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::block::BlockId;
use crate::value::Value;

/// An input slot: the block plugged into it, and the shadow it falls back to
/// when nothing is plugged in. `block` equals `shadow` for unobscured
/// shadows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Input {
  pub block: Option<BlockId>,
  pub shadow: Option<BlockId>,
}

impl Input {
  pub fn new(block: Option<BlockId>, shadow: Option<BlockId>) -> Self {
    Input { block, shadow }
  }
}

/// Inputs are written either as `{"block": .., "shadow": ..}` or in the
/// compact `[kind, block, shadow?]` form.
impl<'de> Deserialize<'de> for Input {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct InputVisitor;
    impl<'de> Visitor<'de> for InputVisitor {
      type Value = Input;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "an input object or [kind, block, shadow] array")
      }
      fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
      ) -> Result<Self::Value, A::Error> {
        let kind = seq
          .next_element::<u8>()?
          .ok_or_else(|| A::Error::missing_field("kind"))?;
        let block = seq.next_element::<Option<BlockId>>()?.flatten();
        let shadow = match kind {
          // 1: shadow only, 2: no shadow, 3: block obscuring a shadow.
          1 => block.clone(),
          2 => None,
          3 => seq.next_element::<Option<BlockId>>()?.flatten(),
          other => {
            return Err(A::Error::custom(format!(
              "unknown input kind {other}; inline primitives must be \
               expanded into shadow blocks"
            )))
          }
        };
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(Input { block, shadow })
      }
      fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
      ) -> Result<Self::Value, A::Error> {
        let mut input = Input::default();
        while let Some(key) = map.next_key::<String>()? {
          match key.as_str() {
            "block" => input.block = map.next_value()?,
            "shadow" => input.shadow = map.next_value()?,
            _ => {
              map.next_value::<serde_json::Value>()?;
            }
          }
        }
        Ok(input)
      }
    }
    de.deserialize_any(InputVisitor)
  }
}

/// A field: a literal value typed into the block itself, plus the id of the
/// variable, list or broadcast it names, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub value: Value,
  pub id: Option<String>,
}

impl Field {
  pub fn new(value: impl Into<Value>) -> Self {
    Field {
      value: value.into(),
      id: None,
    }
  }

  pub fn with_id(value: impl Into<Value>, id: impl Into<String>) -> Self {
    Field {
      value: value.into(),
      id: Some(id.into()),
    }
  }

  pub fn text(&self) -> String {
    self.value.to_string()
  }
}

/// Fields are written as `[value, id?]`, `{"value": .., "id": ..}` or as a
/// bare scalar.
impl<'de> Deserialize<'de> for Field {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct FieldVisitor;
    impl<'de> Visitor<'de> for FieldVisitor {
      type Value = Field;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Field")
      }
      fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
      ) -> Result<Self::Value, A::Error> {
        let value = seq
          .next_element::<Value>()?
          .ok_or_else(|| A::Error::missing_field("value"))?;
        let id = seq.next_element::<Option<String>>()?.flatten();
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(Field { value, id })
      }
      fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
      ) -> Result<Self::Value, A::Error> {
        let mut value = None;
        let mut id = None;
        while let Some(key) = map.next_key::<String>()? {
          match key.as_str() {
            "value" => value = Some(map.next_value::<Value>()?),
            "id" => id = map.next_value::<Option<String>>()?,
            _ => {
              map.next_value::<serde_json::Value>()?;
            }
          }
        }
        Ok(Field {
          value: value.ok_or_else(|| A::Error::missing_field("value"))?,
          id,
        })
      }
      fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Field::new(v))
      }
      fn visit_f64<E: Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Field::new(v))
      }
      fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Field::new(v as f64))
      }
      fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Field::new(v as f64))
      }
      fn visit_bool<E: Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Field::new(v))
      }
    }
    de.deserialize_any(FieldVisitor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compact_inputs() {
    let shadow: Input = serde_json::from_str(r#"[1, "a"]"#).unwrap();
    assert_eq!(shadow, Input::new(Some("a".into()), Some("a".into())));
    let obscured: Input = serde_json::from_str(r#"[3, "b", "a"]"#).unwrap();
    assert_eq!(obscured, Input::new(Some("b".into()), Some("a".into())));
    let bare: Input = serde_json::from_str(r#"[2, null]"#).unwrap();
    assert_eq!(bare, Input::default());
    assert!(serde_json::from_str::<Input>(r#"[1, [4, "10"]]"#).is_err());
  }

  #[test]
  fn field_forms() {
    let list: Field = serde_json::from_str(r#"["my var", "v1"]"#).unwrap();
    assert_eq!(list, Field::with_id("my var", "v1"));
    let map: Field = serde_json::from_str(r#"{"value": 10}"#).unwrap();
    assert_eq!(map, Field::new(10.));
    let bare: Field = serde_json::from_str(r#""all""#).unwrap();
    assert_eq!(bare.text(), "all");
  }
}
