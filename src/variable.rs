use crate::cast;
use crate::value::Value;

pub const DEFAULT_LIST_ITEM_LIMIT: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
  Scalar(Value),
  List(Vec<Value>),
  BroadcastMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
  pub id: String,
  pub name: String,
  pub value: VariableValue,
  pub is_cloud: bool,
  pub is_local: bool,
  /// Cleared on every list mutation; list monitors refresh only when it is
  /// false.
  pub monitor_up_to_date: bool,
}

impl Variable {
  pub fn scalar(id: &str, name: &str, value: impl Into<Value>) -> Self {
    Variable {
      id: id.to_string(),
      name: name.to_string(),
      value: VariableValue::Scalar(value.into()),
      is_cloud: false,
      is_local: false,
      monitor_up_to_date: true,
    }
  }

  pub fn list(id: &str, name: &str, items: Vec<Value>) -> Self {
    Variable {
      value: VariableValue::List(items),
      monitor_up_to_date: false,
      ..Variable::scalar(id, name, 0.)
    }
  }

  pub fn broadcast(id: &str, name: &str) -> Self {
    Variable {
      value: VariableValue::BroadcastMessage,
      ..Variable::scalar(id, name, 0.)
    }
  }

  pub fn is_list(&self) -> bool {
    matches!(self.value, VariableValue::List(_))
  }

  pub fn get(&self) -> Value {
    match &self.value {
      VariableValue::Scalar(value) => value.clone(),
      VariableValue::List(_) => Value::from(list_contents(self.items())),
      VariableValue::BroadcastMessage => Value::from(self.name.as_str()),
    }
  }

  pub fn set(&mut self, value: Value) {
    self.value = VariableValue::Scalar(value);
  }

  pub fn items(&self) -> &[Value] {
    match &self.value {
      VariableValue::List(items) => items,
      _ => &[],
    }
  }

  /// Mutable access to the items; converts a non-list into an empty list
  /// and marks the list monitor stale.
  fn items_mut(&mut self) -> &mut Vec<Value> {
    if !self.is_list() {
      self.value = VariableValue::List(Vec::new());
    }
    self.monitor_up_to_date = false;
    match &mut self.value {
      VariableValue::List(items) => items,
      _ => unreachable!("value was just made a list"),
    }
  }

  /// Appends unless the list is already at `limit`. Returns whether the item
  /// was added.
  pub fn push_item(&mut self, item: Value, limit: usize) -> bool {
    if self.items().len() >= limit {
      return false;
    }
    self.items_mut().push(item);
    true
  }

  /// Inserts at a 1-based position; `len + 1` appends.
  pub fn insert_item(
    &mut self,
    index: usize,
    item: Value,
    limit: usize,
  ) -> bool {
    let len = self.items().len();
    if index == 0 || index > len + 1 {
      return false;
    }
    let items = self.items_mut();
    items.insert(index - 1, item);
    if items.len() > limit {
      items.pop();
    }
    true
  }

  pub fn delete_item(&mut self, index: usize) -> Option<Value> {
    if index == 0 || index > self.items().len() {
      return None;
    }
    Some(self.items_mut().remove(index - 1))
  }

  pub fn delete_all_items(&mut self) {
    self.items_mut().clear();
  }

  pub fn replace_item(&mut self, index: usize, item: Value) -> bool {
    if index == 0 || index > self.items().len() {
      return false;
    }
    self.items_mut()[index - 1] = item;
    true
  }
}

/// 1-based position of the first item equal to `item` under the comparison
/// rules, or 0. `123` matches `"123"`.
pub fn item_num_of_list(items: &[Value], item: &Value) -> usize {
  items
    .iter()
    .position(|candidate| cast::equals(candidate, item))
    .map_or(0, |index| index + 1)
}

/// Lists of single characters join without separators, others with spaces.
pub fn list_contents(items: &[Value]) -> String {
  let all_single = items
    .iter()
    .all(|item| item.map_as_str(|s| s.chars().count() == 1));
  let separator = if all_single { "" } else { " " };
  items
    .iter()
    .map(|item| item.to_string())
    .collect::<Vec<_>>()
    .join(separator)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn appending_stops_at_the_limit() {
    let mut list =
      Variable::list("l", "list", vec![Value::from(1.), Value::from(2.)]);
    list.monitor_up_to_date = true;
    assert!(!list.push_item(Value::from(3.), 2));
    assert_eq!(list.items().len(), 2);
    assert!(list.monitor_up_to_date);
    assert!(list.push_item(Value::from(3.), 3));
    assert_eq!(list.items().len(), 3);
    assert!(!list.monitor_up_to_date);
  }

  #[test]
  fn inserting_at_the_limit_drops_the_last_item() {
    let mut list =
      Variable::list("l", "list", vec![Value::from("a"), Value::from("b")]);
    assert!(list.insert_item(1, Value::from("z"), 2));
    assert_eq!(list.items(), &[Value::from("z"), Value::from("a")]);
  }

  #[test]
  fn item_number_compares_by_value() {
    let items = vec![Value::from(4.), Value::from(7.), Value::from("123")];
    assert_eq!(item_num_of_list(&items, &Value::from(123.)), 3);
    assert_eq!(item_num_of_list(&items, &Value::from("7")), 2);
    assert_eq!(item_num_of_list(&items, &Value::from(12.)), 0);
  }

  #[test]
  fn contents_join() {
    let letters = vec![Value::from("a"), Value::from("b")];
    assert_eq!(list_contents(&letters), "ab");
    let words = vec![Value::from("ab"), Value::from(1.)];
    assert_eq!(list_contents(&words), "ab 1");
  }

  #[test]
  fn every_mutation_marks_the_monitor_stale() {
    let mut list = Variable::list("l", "list", vec![Value::from(1.)]);
    list.monitor_up_to_date = true;
    list.replace_item(1, Value::from(2.));
    assert!(!list.monitor_up_to_date);
    list.monitor_up_to_date = true;
    list.delete_item(1);
    assert!(!list.monitor_up_to_date);
    list.monitor_up_to_date = true;
    list.delete_all_items();
    assert!(!list.monitor_up_to_date);
  }
}
