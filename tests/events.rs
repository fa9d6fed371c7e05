mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use rustphorus_vm::{
  Block, BlockLibrary, BlockRegistry, Field, Promise, Reported, Resolver,
  Runtime, RuntimeEvent, TargetId, ThreadStatus, Value, Variable,
};

/// Blocks whose results arrive whenever the test resolves them.
#[derive(Default)]
struct DeferredBlocks {
  resolvers: Rc<RefCell<Vec<Resolver>>>,
}

impl BlockLibrary for DeferredBlocks {
  fn name(&self) -> &'static str {
    "deferred"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    let resolvers = Rc::clone(&self.resolvers);
    registry.register_fn("deferred_wait", move |_, _| {
      let (promise, resolver) = Promise::pending();
      resolvers.borrow_mut().push(resolver);
      Ok(Reported::Promise(promise))
    });
    let resolvers = Rc::clone(&self.resolvers);
    registry.register_fn("deferred_value", move |_, _| {
      let (promise, resolver) = Promise::pending();
      resolvers.borrow_mut().push(resolver);
      Ok(Reported::Promise(promise))
    });
    registry.register_fn("deferred_print", |_, util| {
      util.io_query("printer", "print", &[])?;
      Ok(Reported::Nothing)
    });
  }
}

fn deferred_runtime(
  compiler_enabled: bool,
  script: Vec<Block>,
) -> (Runtime, TargetId, Rc<RefCell<Vec<Resolver>>>) {
  let (mut runtime, _) = runtime(compiler_enabled);
  let library = DeferredBlocks::default();
  let resolvers = Rc::clone(&library.resolvers);
  runtime.register_library(Box::new(library));
  let variables = vec![Variable::scalar("v", "v", 0.)];
  let stage = stage(&mut runtime, script, variables);
  (runtime, stage, resolvers)
}

fn wait_then_count() -> Vec<Block> {
  let mut blocks = stack(vec![
    flag("flag"),
    Block::new("wait", "deferred_wait"),
    change_variable("chg", "v", "one"),
  ]);
  blocks.push(number("one", 1.));
  blocks
}

#[test]
fn threads_resume_once_their_promise_resolves() {
  for compiler_enabled in [false, true] {
    let (mut runtime, stage, resolvers) =
      deferred_runtime(compiler_enabled, wait_then_count());

    runtime.green_flag();
    runtime.step();
    runtime.step();
    assert_eq!(runtime.threads()[0].status, ThreadStatus::PromiseWait);
    assert_eq!(value_of(&runtime, stage, "v"), Value::from(0.));

    resolvers.borrow()[0].resolve(Value::from("done"));
    runtime.step();
    assert_eq!(value_of(&runtime, stage, "v"), Value::from(1.));
    assert!(runtime.threads().is_empty());
    assert_eq!(resolvers.borrow().len(), 1);
  }
}

#[test]
fn stopped_threads_ignore_late_resolutions() {
  for compiler_enabled in [false, true] {
    let (mut runtime, stage, resolvers) =
      deferred_runtime(compiler_enabled, wait_then_count());

    runtime.green_flag();
    runtime.step();
    runtime.stop_all();
    resolvers.borrow()[0].resolve(Value::from("late"));
    runtime.step();
    runtime.step();
    assert!(runtime.threads().is_empty());
    assert_eq!(value_of(&runtime, stage, "v"), Value::from(0.));
  }
}

#[test]
fn resolved_values_feed_the_waiting_block() {
  for compiler_enabled in [false, true] {
    let mut blocks =
      stack(vec![flag("flag"), set_variable("set", "v", "join")]);
    blocks.push(
      Block::new("join", "operator_join")
        .input("STRING1", "prefix")
        .input("STRING2", "value"),
    );
    blocks.push(text("prefix", "got "));
    blocks.push(Block::new("value", "deferred_value"));
    let (mut runtime, stage, resolvers) =
      deferred_runtime(compiler_enabled, blocks);

    runtime.green_flag();
    runtime.step();
    resolvers.borrow()[0].resolve(Value::from("it"));
    run(&mut runtime, 5);
    assert_eq!(
      value_of(&runtime, stage, "v"),
      Value::from("got it"),
      "compiler enabled: {compiler_enabled}"
    );
  }
}

#[test]
fn rejected_promises_abandon_the_stack() {
  let (mut runtime, stage, resolvers) =
    deferred_runtime(false, wait_then_count());

  runtime.green_flag();
  runtime.step();
  resolvers.borrow()[0].reject("offline");
  run(&mut runtime, 3);
  assert_eq!(value_of(&runtime, stage, "v"), Value::from(0.));
}

#[test]
fn monitors_report_only_changes() {
  let (mut runtime, _) = runtime(true);
  let blocks = vec![Block::new("show", "data_variable")
    .top_level()
    .field("VARIABLE", Field::with_id("v", "v"))];
  let variables = vec![
    Variable::scalar("v", "v", 0.),
    Variable::list("items", "items", vec![Value::from(1.)]),
  ];
  let stage = stage(&mut runtime, blocks, variables);
  runtime.add_monitor("show", stage);

  runtime.step();
  let events = runtime.take_events();
  assert!(events.iter().any(|event| matches!(
    event,
    RuntimeEvent::MonitorUpdate { value, .. } if *value == Value::from(0.)
  )));
  assert!(events.iter().any(|event| matches!(
    event,
    RuntimeEvent::ListMonitorUpdate { list, items, .. }
      if list == "items" && items.len() == 1
  )));

  runtime.step();
  assert!(runtime.take_events().is_empty());

  let target = runtime.target_mut(stage).unwrap();
  target.variable_mut("v").unwrap().set(Value::from(7.));
  target
    .variable_mut("items")
    .unwrap()
    .push_item(Value::from(2.), 10);
  runtime.step();
  let events = runtime.take_events();
  assert!(events.iter().any(|event| matches!(
    event,
    RuntimeEvent::MonitorUpdate { value, .. } if *value == Value::from(7.)
  )));
  assert!(events.iter().any(|event| matches!(
    event,
    RuntimeEvent::ListMonitorUpdate { items, .. } if items.len() == 2
  )));
}

#[test]
fn failing_threads_report_an_error() {
  for compiler_enabled in [false, true] {
    let mut blocks = stack(vec![
      flag("flag"),
      Block::new("print", "deferred_print"),
      change_variable("chg", "v", "one"),
    ]);
    blocks.push(number("one", 1.));
    let (mut runtime, stage, _) = deferred_runtime(compiler_enabled, blocks);

    runtime.green_flag();
    runtime.step();
    assert!(runtime.threads().is_empty());
    assert_eq!(value_of(&runtime, stage, "v"), Value::from(0.));
    assert!(runtime.take_events().iter().any(|event| matches!(
      event,
      RuntimeEvent::ThreadError { target, .. } if *target == stage
    )));
  }
}
