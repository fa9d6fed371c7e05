mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use rustphorus_vm::{
  Block, BlockContainer, BlockError, Field, Input, IoDevice, Reported,
  RuntimeConfig, RuntimeEvent, Target, Value, Variable,
};

#[test]
fn lists_stop_growing_at_the_item_limit() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime_with(RuntimeConfig {
      list_item_limit: 3,
      ..config(compiler_enabled)
    });
    let mut blocks = stack(vec![flag("flag"), repeat("add", "five", "push")]);
    blocks.push(number("five", 5.));
    blocks.push(add_to_list("push", "items", "item").parent("add"));
    blocks.push(text("item", "x"));
    let list = vec![Variable::list("items", "items", Vec::new())];
    let stage = stage(&mut runtime, blocks, list);

    runtime.green_flag();
    run(&mut runtime, 10);
    assert_eq!(
      items_of(&runtime, stage, "items").len(),
      3,
      "compiler enabled: {compiler_enabled}"
    );
  }
}

#[test]
fn item_numbers_match_numbers_against_numeric_strings() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let mut blocks =
      stack(vec![flag("flag"), set_variable("set", "v", "find")]);
    blocks.push(
      Block::new("find", "data_itemnumoflist")
        .input("ITEM", "needle")
        .field("LIST", Field::with_id("items", "items")),
    );
    blocks.push(number("needle", 123.));
    let items = vec![Value::from(4.), Value::from(7.), Value::from("123")];
    let variables = vec![
      Variable::list("items", "items", items),
      Variable::scalar("v", "v", 0.),
    ];
    let stage = stage(&mut runtime, blocks, variables);

    runtime.green_flag();
    run(&mut runtime, 3);
    assert_eq!(value_of(&runtime, stage, "v"), Value::from(3.));
  }
}

fn reported(events: &[RuntimeEvent], block: &str) -> Option<Value> {
  events.iter().find_map(|event| match event {
    RuntimeEvent::VisualReport { block: id, value } if &**id == block => {
      Some(value.clone())
    }
    _ => None,
  })
}

#[test]
fn clicked_reporters_report_their_value() {
  let (mut runtime, _) = runtime(true);
  let equals = |id: &str, left: &str, right: &str| {
    Block::new(id, "operator_equals")
      .top_level()
      .input("OPERAND1", left)
      .input("OPERAND2", right)
  };
  let blocks = vec![
    equals("blank", "space", "zero"),
    text("space", " "),
    number("zero", 0.),
    equals("numeric", "ten_text", "ten"),
    text("ten_text", "10"),
    number("ten", 10.),
    equals("words", "lower", "upper"),
    text("lower", "apple"),
    text("upper", "APPLE"),
  ];
  let stage = stage(&mut runtime, blocks, Vec::new());

  for block in ["blank", "numeric", "words"] {
    runtime.toggle_script(block, stage);
  }
  run(&mut runtime, 3);
  let events = runtime.take_events();
  assert_eq!(reported(&events, "blank"), Some(Value::from(false)));
  assert_eq!(reported(&events, "numeric"), Some(Value::from(true)));
  assert_eq!(reported(&events, "words"), Some(Value::from(true)));
}

#[test]
fn clicking_a_running_script_stops_it() {
  let (mut runtime, _) = runtime(false);
  let mut blocks = vec![Block::new("forever", "control_forever")
    .top_level()
    .input("SUBSTACK", "chg")];
  blocks.push(change_variable("chg", "v", "one").parent("forever"));
  blocks.push(number("one", 1.));
  let stage = stage(&mut runtime, blocks, vec![Variable::scalar("v", "v", 0.)]);

  assert!(runtime.toggle_script("forever", stage).is_some());
  runtime.step();
  runtime.step();
  assert_eq!(value_of(&runtime, stage, "v"), Value::from(2.));
  assert!(runtime.toggle_script("forever", stage).is_none());
  runtime.step();
  assert!(runtime.threads().is_empty());
  assert_eq!(value_of(&runtime, stage, "v"), Value::from(2.));
}

#[test]
fn clones_keep_their_own_variables() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    stage(&mut runtime, Vec::new(), Vec::new());
    let mut blocks = stack(vec![
      flag("flag"),
      Block::new("clone", "control_create_clone_of")
        .input("CLONE_OPTION", "menu"),
    ]);
    blocks.push(
      Block::new("menu", "control_create_clone_of_menu")
        .shadow()
        .field("CLONE_OPTION", Field::new("_myself_")),
    );
    blocks.extend(stack(vec![
      Block::new("start", "control_start_as_clone").top_level(),
      set_variable("set", "v", "five"),
    ]));
    blocks.push(number("five", 5.));
    let sprite = Target::sprite("cat", BlockContainer::from_blocks(blocks))
      .with_variable(Variable::scalar("v", "v", 0.));
    let cat = runtime.add_target(sprite);

    runtime.green_flag();
    run(&mut runtime, 5);
    assert_eq!(runtime.clone_count(), 1);
    let clone = runtime
      .executable_targets()
      .iter()
      .copied()
      .find(|&id| runtime.is_clone(id))
      .unwrap();
    assert_eq!(value_of(&runtime, cat, "v"), Value::from(0.));
    assert_eq!(value_of(&runtime, clone, "v"), Value::from(5.));

    runtime.stop_all();
    assert_eq!(runtime.clone_count(), 0);
    assert!(!runtime.has_target(clone));
  }
}

#[test]
fn clones_are_layered_behind_their_original() {
  let (mut runtime, _) = runtime(true);
  stage(&mut runtime, Vec::new(), Vec::new());
  let mut blocks = stack(vec![
    flag("flag"),
    Block::new("clone", "control_create_clone_of")
      .input("CLONE_OPTION", "menu"),
  ]);
  blocks.push(
    Block::new("menu", "control_create_clone_of_menu")
      .shadow()
      .field("CLONE_OPTION", Field::new("_myself_")),
  );
  let cat = runtime.add_target(Target::sprite(
    "cat",
    BlockContainer::from_blocks(blocks),
  ));

  runtime.green_flag();
  run(&mut runtime, 3);
  let targets = runtime.executable_targets();
  let original = targets.iter().position(|&id| id == cat).unwrap();
  let clone = targets.iter().position(|&id| runtime.is_clone(id)).unwrap();
  assert!(clone < original);
}

#[test]
fn empty_inputs_read_their_shadow() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let mut set = set_variable("set", "v", "unused");
    set
      .inputs
      .insert("VALUE".into(), Input::new(None, Some("sh".into())));
    let mut blocks = stack(vec![flag("flag"), set]);
    blocks.push(text("sh", "shadow"));
    let variables = vec![Variable::scalar("v", "v", 0.)];
    let stage = stage(&mut runtime, blocks, variables);

    runtime.green_flag();
    run(&mut runtime, 3);
    assert_eq!(
      value_of(&runtime, stage, "v"),
      Value::from("shadow"),
      "compiler enabled: {compiler_enabled}"
    );
  }
}

/// Records every update sent to the cloud.
struct CloudLog(Rc<RefCell<Vec<Vec<Value>>>>);

impl IoDevice for CloudLog {
  fn query(
    &mut self,
    function: &str,
    args: &[Value],
    _: f64,
  ) -> Result<Reported, BlockError> {
    assert_eq!(function, "requestUpdateVariable");
    self.0.borrow_mut().push(args.to_vec());
    Ok(Reported::Nothing)
  }
}

#[test]
fn cloud_variables_forward_assignments() {
  for compiler_enabled in [false, true] {
    let (mut runtime, _) = runtime(compiler_enabled);
    let updates = Rc::new(RefCell::new(Vec::new()));
    let device = CloudLog(Rc::clone(&updates));
    runtime.register_io_device("cloud", Box::new(device));
    let mut blocks = stack(vec![
      flag("flag"),
      set_variable("score", "c", "ten"),
      set_variable("local", "v", "ten"),
    ]);
    blocks.push(number("ten", 10.));
    let mut score = Variable::scalar("c", "☁ score", 0.);
    score.is_cloud = true;
    let variables = vec![score, Variable::scalar("v", "v", 0.)];
    let stage = stage(&mut runtime, blocks, variables);

    runtime.green_flag();
    run(&mut runtime, 3);
    assert_eq!(value_of(&runtime, stage, "c"), Value::from(10.));
    assert_eq!(
      *updates.borrow(),
      [vec![Value::from("☁ score"), Value::from(10.)]],
      "compiler enabled: {compiler_enabled}"
    );
  }
}
