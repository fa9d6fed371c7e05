use super::{BlockArgs, BlockLibrary, BlockRegistry, Reported};
use crate::block_utility::BlockUtility;
use crate::cast::{self, ListIndex};
use crate::compiler::{generator, Generator};
use crate::error::BlockError;
use crate::value::Value;
use crate::variable::{self, Variable};

pub fn add_to_list(list: &mut Variable, item: Value, limit: usize) {
  if !list.push_item(item, limit) {
    log::debug!("list {} is full", list.name);
  }
}

/// Accepts `all` besides the usual positions.
pub fn delete_of_list(list: &mut Variable, index: &Value) {
  match cast::to_list_index(index, list.items().len(), true) {
    ListIndex::Item(index) => {
      list.delete_item(index);
    }
    ListIndex::All => list.delete_all_items(),
    ListIndex::Invalid => {}
  }
}

pub fn insert_at_list(
  list: &mut Variable,
  index: &Value,
  item: Value,
  limit: usize,
) {
  if let ListIndex::Item(index) =
    cast::to_list_index(index, list.items().len() + 1, false)
  {
    if index <= limit {
      list.insert_item(index, item, limit);
    }
  }
}

pub fn replace_item_of_list(list: &mut Variable, index: &Value, item: Value) {
  if let ListIndex::Item(index) =
    cast::to_list_index(index, list.items().len(), false)
  {
    list.replace_item(index, item);
  }
}

pub fn item_of_list(items: &[Value], index: &Value) -> Value {
  match cast::to_list_index(index, items.len(), false) {
    ListIndex::Item(index) => items[index - 1].clone(),
    _ => Value::empty(),
  }
}

pub fn list_contains_item(items: &[Value], item: &Value) -> bool {
  items
    .iter()
    .any(|candidate| candidate == item || cast::equals(candidate, item))
}

type Outcome = Result<Reported, BlockError>;

fn variable_ref(args: &BlockArgs, field: &str) -> (String, String) {
  args.reference(field).unwrap_or_default()
}

fn get_variable(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "VARIABLE");
  Ok(util.lookup_or_create_variable(&id, &name)?.get().into())
}

fn set_variable_to(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "VARIABLE");
  util.set_variable(&id, &name, args.get("VALUE"))?;
  Ok(Reported::Nothing)
}

fn change_variable_by(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "VARIABLE");
  let old = util.lookup_or_create_variable(&id, &name)?.get();
  let value = cast::to_number(&old) + args.number("VALUE");
  util.set_variable(&id, &name, Value::from(value))?;
  Ok(Reported::Nothing)
}

fn list_contents(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let list = util.lookup_or_create_list(&id, &name)?;
  Ok(variable::list_contents(list.items()).into())
}

fn add_to_list_block(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let limit = util.list_item_limit();
  add_to_list(util.lookup_or_create_list(&id, &name)?, args.get("ITEM"), limit);
  Ok(Reported::Nothing)
}

fn delete_of_list_block(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  delete_of_list(util.lookup_or_create_list(&id, &name)?, &args.get("INDEX"));
  Ok(Reported::Nothing)
}

fn delete_all_of_list(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  util.lookup_or_create_list(&id, &name)?.delete_all_items();
  Ok(Reported::Nothing)
}

fn insert_at_list_block(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let limit = util.list_item_limit();
  let list = util.lookup_or_create_list(&id, &name)?;
  insert_at_list(list, &args.get("INDEX"), args.get("ITEM"), limit);
  Ok(Reported::Nothing)
}

fn replace_item_block(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let list = util.lookup_or_create_list(&id, &name)?;
  replace_item_of_list(list, &args.get("INDEX"), args.get("ITEM"));
  Ok(Reported::Nothing)
}

fn item_of_list_block(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let list = util.lookup_or_create_list(&id, &name)?;
  Ok(item_of_list(list.items(), &args.get("INDEX")).into())
}

fn item_num_of_list(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let list = util.lookup_or_create_list(&id, &name)?;
  Ok(variable::item_num_of_list(list.items(), &args.get("ITEM")).into())
}

fn length_of_list(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  Ok(util.lookup_or_create_list(&id, &name)?.items().len().into())
}

fn list_contains_item_block(
  args: &BlockArgs,
  util: &mut BlockUtility,
) -> Outcome {
  let (id, name) = variable_ref(args, "LIST");
  let list = util.lookup_or_create_list(&id, &name)?;
  Ok(list_contains_item(list.items(), &args.get("ITEM")).into())
}

#[derive(Debug, Default)]
pub struct DataBlocks;

impl BlockLibrary for DataBlocks {
  fn name(&self) -> &'static str {
    "data"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    registry.register_fn("data_variable", get_variable);
    registry.register_fn("data_setvariableto", set_variable_to);
    registry.register_fn("data_changevariableby", change_variable_by);
    registry.register_fn("data_listcontents", list_contents);
    registry.register_fn("data_addtolist", add_to_list_block);
    registry.register_fn("data_deleteoflist", delete_of_list_block);
    registry.register_fn("data_deletealloflist", delete_all_of_list);
    registry.register_fn("data_insertatlist", insert_at_list_block);
    registry.register_fn("data_replaceitemoflist", replace_item_block);
    registry.register_fn("data_itemoflist", item_of_list_block);
    registry.register_fn("data_itemnumoflist", item_num_of_list);
    registry.register_fn("data_lengthoflist", length_of_list);
    registry.register_fn("data_listcontainsitem", list_contains_item_block);

    let generators: [(&str, Generator); 13] = [
      ("data_variable", Generator::Reporter(generator::variable)),
      ("data_setvariableto", Generator::Statement(generator::set_variable)),
      (
        "data_changevariableby",
        Generator::Statement(generator::change_variable),
      ),
      ("data_listcontents", Generator::Reporter(generator::list_contents)),
      ("data_addtolist", Generator::Statement(generator::add_to_list)),
      ("data_deleteoflist", Generator::Statement(generator::delete_of_list)),
      (
        "data_deletealloflist",
        Generator::Statement(generator::delete_all_of_list),
      ),
      ("data_insertatlist", Generator::Statement(generator::insert_at_list)),
      (
        "data_replaceitemoflist",
        Generator::Statement(generator::replace_item_of_list),
      ),
      ("data_itemoflist", Generator::Reporter(generator::item_of_list)),
      ("data_itemnumoflist", Generator::Reporter(generator::item_num_of_list)),
      ("data_lengthoflist", Generator::Reporter(generator::length_of_list)),
      (
        "data_listcontainsitem",
        Generator::Reporter(generator::list_contains_item),
      ),
    ];
    for (opcode, generator) in generators {
      registry.register_generator(opcode, generator);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn list(items: &[&str]) -> Variable {
    let items = items.iter().map(|item| Value::from(*item)).collect();
    Variable::list("l", "things", items)
  }

  #[test]
  fn delete_accepts_all_and_last() {
    let mut things = list(&["a", "b", "c"]);
    delete_of_list(&mut things, &Value::from("last"));
    assert_eq!(things.items(), &[Value::from("a"), Value::from("b")]);
    delete_of_list(&mut things, &Value::from(5.));
    assert_eq!(things.items().len(), 2);
    delete_of_list(&mut things, &Value::from("all"));
    assert!(things.items().is_empty());
  }

  #[test]
  fn insert_respects_the_limit() {
    let mut things = list(&["a", "b"]);
    insert_at_list(&mut things, &Value::from(1.), Value::from("z"), 2);
    assert_eq!(things.items(), &[Value::from("z"), Value::from("a")]);
    insert_at_list(&mut things, &Value::from(3.), Value::from("y"), 2);
    assert_eq!(things.items().len(), 2);
    add_to_list(&mut things, Value::from("x"), 2);
    assert_eq!(things.items().len(), 2);
  }

  #[test]
  fn insert_at_last_appends() {
    let mut things = list(&["a"]);
    insert_at_list(&mut things, &Value::from("last"), Value::from("b"), 10);
    assert_eq!(things.items(), &[Value::from("a"), Value::from("b")]);
  }

  #[test]
  fn lookups_use_the_comparison_rules() {
    let items = vec![Value::from("1"), Value::from("2"), Value::from("123")];
    assert!(list_contains_item(&items, &Value::from(123.)));
    assert!(!list_contains_item(&items, &Value::from(4.)));
    assert_eq!(item_of_list(&items, &Value::from(2.)), Value::from("2"));
    assert_eq!(item_of_list(&items, &Value::from(0.)), Value::empty());
    assert_eq!(item_of_list(&items, &Value::from("all")), Value::empty());
  }
}
