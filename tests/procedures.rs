mod common;

use common::*;
use rustphorus_vm::compiler::{compile, ProcedureKey};
use rustphorus_vm::{
  Block, BlockContainer, Field, Input, Runtime, Value, Variable,
};

fn argument(id: &str, name: &str) -> Block {
  Block::new(id, "argument_reporter_string_number")
    .field("VALUE", Field::new(name))
}

#[test]
fn arguments_are_bound_by_name() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let mut blocks = stack(vec![
      flag("flag"),
      call("call", "greet %s", &[("arg-id", "hello")]),
    ]);
    blocks.push(text("hello", "hello"));
    blocks.extend(procedure(
      "def",
      "greet %s",
      &[("arg-id", "greeting")],
      false,
      "set",
    ));
    blocks.push(set_variable("set", "v", "arg").parent("def"));
    blocks.push(argument("arg", "greeting"));
    let variables = vec![Variable::scalar("v", "v", 0.)];
    let stage = stage(&mut runtime, blocks, variables);

    runtime.green_flag();
    run(&mut runtime, 5);
    assert_eq!(
      value_of(&runtime, stage, "v"),
      Value::from("hello"),
      "compiler enabled: {compiler_enabled}"
    );
  }
}

#[test]
fn missing_arguments_fall_back_to_defaults() {
  let (mut runtime, _) = runtime(true);
  let mut blocks = stack(vec![flag("flag"), call("call", "greet %s", &[])]);
  blocks.extend(procedure(
    "def",
    "greet %s",
    &[("arg-id", "greeting")],
    false,
    "set",
  ));
  blocks.push(set_variable("set", "v", "arg").parent("def"));
  blocks.push(argument("arg", "greeting"));
  let stage = stage(&mut runtime, blocks, vec![Variable::scalar("v", "v", 0.)]);

  runtime.green_flag();
  run(&mut runtime, 5);
  assert_eq!(value_of(&runtime, stage, "v"), Value::from(""));
}

#[test]
fn stop_this_script_returns_from_the_procedure_only() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let mut blocks = stack(vec![
      flag("flag"),
      call("call", "early", &[]),
      add_to_list("after", "log", "after_item"),
    ]);
    blocks.push(text("after_item", "after"));
    blocks.extend(procedure("def", "early", &[], false, "inside"));
    blocks.extend(stack(vec![
      add_to_list("inside", "log", "inside_item").parent("def"),
      Block::new("stop", "control_stop")
        .field("STOP_OPTION", Field::new("this script")),
      add_to_list("never", "log", "never_item"),
    ]));
    blocks.push(text("inside_item", "inside"));
    blocks.push(text("never_item", "never"));
    let list = vec![Variable::list("log", "log", Vec::new())];
    let stage = stage(&mut runtime, blocks, list);

    runtime.green_flag();
    run(&mut runtime, 5);
    assert_eq!(
      strings(&items_of(&runtime, stage, "log")),
      ["inside", "after"],
      "compiler enabled: {compiler_enabled}"
    );
  }
}

#[test]
fn each_procedure_is_compiled_once_per_script() {
  let mut blocks = stack(vec![
    flag("flag"),
    call("first", "outer", &[]),
    call("second", "outer", &[]),
  ]);
  blocks.extend(procedure("outer_def", "outer", &[], false, "inner_a"));
  blocks.extend(stack(vec![
    call("inner_a", "inner", &[]).parent("outer_def"),
    call("inner_b", "inner", &[]),
  ]));
  blocks.extend(procedure("inner_def", "inner", &[], false, "chg"));
  blocks.push(change_variable("chg", "v", "by").parent("inner_def"));
  blocks.push(number("by", 1.));
  let container = BlockContainer::from_blocks(blocks);
  let runtime = Runtime::default();

  let result = compile(&container, runtime.registry(), "flag").unwrap();
  assert_eq!(result.procedures.len(), 2);
  let key = |proccode: &str| ProcedureKey {
    proccode: proccode.to_string(),
    warp: false,
  };
  assert!(result.procedures.contains_key(&key("outer")));
  assert!(result.procedures.contains_key(&key("inner")));
}

#[test]
fn recursive_procedures_compile() {
  let mut blocks = stack(vec![
    flag("flag"),
    call("call", "count %s", &[("n-id", "ten")]),
  ]);
  blocks.push(number("ten", 10.));
  blocks.extend(procedure("def", "count %s", &[("n-id", "n")], true, "if"));
  blocks.push(
    Block::new("if", "control_if")
      .parent("def")
      .input("CONDITION", "gt")
      .input("SUBSTACK", "chg"),
  );
  blocks.push(
    Block::new("gt", "operator_gt")
      .input("OPERAND1", "n")
      .input("OPERAND2", "zero"),
  );
  blocks.push(argument("n", "n"));
  blocks.push(number("zero", 0.));
  blocks.extend(stack(vec![
    change_variable("chg", "v", "one"),
    call("recurse", "count %s", &[("n-id", "minus")]),
  ]));
  blocks.push(number("one", 1.));
  blocks.push(
    Block::new("minus", "operator_subtract")
      .input("NUM1", "n2")
      .input("NUM2", "one2"),
  );
  blocks.push(argument("n2", "n"));
  blocks.push(number("one2", 1.));

  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let stage = stage(
      &mut runtime,
      blocks.clone(),
      vec![Variable::scalar("v", "v", 0.)],
    );
    runtime.green_flag();
    runtime.step();
    assert_eq!(
      value_of(&runtime, stage, "v"),
      Value::from(10.),
      "compiler enabled: {compiler_enabled}"
    );
    assert!(runtime.threads().is_empty());
  }
}

/// Sums the even numbers up to ten and joins the result onto a prefix.
fn arithmetic_script() -> Vec<Block> {
  let mut blocks = stack(vec![
    flag("flag"),
    set_variable("reset_i", "i", "zero_i"),
    set_variable("reset_total", "total", "zero_total"),
    repeat("repeat", "ten", "step"),
    set_variable("label", "label", "join"),
  ]);
  blocks.push(number("zero_i", 0.));
  blocks.push(number("zero_total", 0.));
  blocks.push(number("ten", 10.));
  blocks.extend(stack(vec![
    change_variable("step", "i", "one").parent("repeat"),
    Block::new("if", "control_if")
      .input("CONDITION", "even")
      .input("SUBSTACK", "add"),
  ]));
  blocks.push(number("one", 1.));
  blocks.push(
    Block::new("even", "operator_equals")
      .input("OPERAND1", "mod")
      .input("OPERAND2", "zero_even"),
  );
  blocks.push(
    Block::new("mod", "operator_mod")
      .input("NUM1", "i_mod")
      .input("NUM2", "two"),
  );
  blocks.push(
    Block::new("i_mod", "data_variable")
      .field("VARIABLE", Field::with_id("i", "i")),
  );
  blocks.push(number("two", 2.));
  blocks.push(text("zero_even", "0"));
  blocks.push(change_variable("add", "total", "i_add").parent("if"));
  blocks.push(
    Block::new("i_add", "data_variable")
      .field("VARIABLE", Field::with_id("i", "i")),
  );
  blocks.push(
    Block::new("join", "operator_join")
      .input("STRING1", "prefix")
      .input("STRING2", "total_join"),
  );
  blocks.push(text("prefix", "total: "));
  blocks.push(
    Block::new("total_join", "data_variable")
      .field("VARIABLE", Field::with_id("total", "total")),
  );
  blocks
}

#[test]
fn compiled_and_interpreted_scripts_agree() {
  let mut results = Vec::new();
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let variables = vec![
      Variable::scalar("i", "i", 0.),
      Variable::scalar("total", "total", 0.),
      Variable::scalar("label", "label", 0.),
    ];
    let stage = stage(&mut runtime, arithmetic_script(), variables);
    runtime.green_flag();
    let steps = run(&mut runtime, 20);
    results.push((
      steps,
      value_of(&runtime, stage, "total"),
      value_of(&runtime, stage, "label"),
    ));
  }
  assert_eq!(results[0], results[1]);
  assert_eq!(results[0].1, Value::from(30.));
  assert_eq!(results[0].2, Value::from("total: 30"));
}

#[test]
fn empty_argument_slots_use_the_declared_default() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let mut call_block = call("call", "greet %s", &[]);
    call_block
      .inputs
      .insert("arg-id".into(), Input::new(None, None));
    let mut blocks = stack(vec![flag("flag"), call_block]);
    let mut definition = procedure(
      "def",
      "greet %s",
      &[("arg-id", "greeting")],
      false,
      "set",
    );
    for block in &mut definition {
      if let Some(mutation) = block.mutation.as_mut() {
        mutation.argumentdefaults = Some(r#"["fallback"]"#.to_string());
      }
    }
    blocks.extend(definition);
    blocks.push(set_variable("set", "v", "arg").parent("def"));
    blocks.push(argument("arg", "greeting"));
    let variables = vec![Variable::scalar("v", "v", 0.)];
    let stage = stage(&mut runtime, blocks, variables);

    runtime.green_flag();
    run(&mut runtime, 5);
    assert_eq!(
      value_of(&runtime, stage, "v"),
      Value::from("fallback"),
      "compiler enabled: {compiler_enabled}"
    );
  }
}
