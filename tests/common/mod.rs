#![allow(dead_code)]

use std::rc::Rc;

use rustphorus_vm::{
  Block, BlockContainer, Field, ManualClock, Mutation, Runtime, RuntimeConfig,
  Target, TargetId, Value, Variable,
};

/// One pass per frame, so every yield costs exactly one `step`.
pub fn config(compiler_enabled: bool) -> RuntimeConfig {
  RuntimeConfig {
    work_time_ratio: 0.,
    compiler_enabled,
    ..RuntimeConfig::default()
  }
}

pub fn runtime(compiler_enabled: bool) -> (Runtime, Rc<ManualClock>) {
  runtime_with(config(compiler_enabled))
}

pub fn runtime_with(config: RuntimeConfig) -> (Runtime, Rc<ManualClock>) {
  let clock = Rc::new(ManualClock::new());
  let runtime = Runtime::with_clock(config, clock.clone());
  (runtime, clock)
}

pub fn stage(
  runtime: &mut Runtime,
  blocks: Vec<Block>,
  variables: Vec<Variable>,
) -> TargetId {
  let mut stage = Target::stage(BlockContainer::from_blocks(blocks));
  for variable in variables {
    stage.add_variable(variable);
  }
  runtime.add_target(stage)
}

/// Links `blocks` into one stack, each block's `next` being the one after.
pub fn stack(mut blocks: Vec<Block>) -> Vec<Block> {
  for index in 1..blocks.len() {
    let (head, tail) = blocks.split_at_mut(index);
    let previous = &mut head[index - 1];
    let current = &mut tail[0];
    previous.next = Some(current.id.clone());
    current.parent = Some(previous.id.clone());
  }
  blocks
}

pub fn flag(id: &str) -> Block {
  Block::new(id, "event_whenflagclicked").top_level()
}

pub fn number(id: &str, value: f64) -> Block {
  Block::new(id, "math_number")
    .shadow()
    .field("NUM", Field::new(value))
}

pub fn text(id: &str, value: &str) -> Block {
  Block::new(id, "text").shadow().field("TEXT", Field::new(value))
}

pub fn set_variable(id: &str, variable: &str, value: &str) -> Block {
  Block::new(id, "data_setvariableto")
    .input("VALUE", value)
    .field("VARIABLE", Field::with_id(variable, variable))
}

pub fn change_variable(id: &str, variable: &str, by: &str) -> Block {
  Block::new(id, "data_changevariableby")
    .input("VALUE", by)
    .field("VARIABLE", Field::with_id(variable, variable))
}

pub fn add_to_list(id: &str, list: &str, item: &str) -> Block {
  Block::new(id, "data_addtolist")
    .input("ITEM", item)
    .field("LIST", Field::with_id(list, list))
}

pub fn repeat(id: &str, times: &str, body: &str) -> Block {
  Block::new(id, "control_repeat")
    .input("TIMES", times)
    .input("SUBSTACK", body)
}

pub fn wait(id: &str, duration: &str) -> Block {
  Block::new(id, "control_wait").input("DURATION", duration)
}

/// The definition and prototype of a custom block taking `params` as
/// `(argument id, argument name)` pairs.
pub fn procedure(
  id: &str,
  proccode: &str,
  params: &[(&str, &str)],
  warp: bool,
  body: &str,
) -> Vec<Block> {
  let prototype_id = format!("{id}_prototype");
  let ids: Vec<&str> = params.iter().map(|(id, _)| *id).collect();
  let names: Vec<&str> = params.iter().map(|(_, name)| *name).collect();
  let defaults: Vec<&str> = params.iter().map(|_| "").collect();
  let mutation = Mutation {
    proccode: Some(proccode.to_string()),
    argumentids: serde_json::to_string(&ids).ok(),
    argumentnames: serde_json::to_string(&names).ok(),
    argumentdefaults: serde_json::to_string(&defaults).ok(),
    warp: Some(serde_json::Value::Bool(warp)),
  };
  vec![
    Block::new(id, "procedures_definition")
      .top_level()
      .input("custom_block", &prototype_id)
      .next(body),
    Block::new(&prototype_id, "procedures_prototype")
      .shadow()
      .parent(id)
      .mutation(mutation),
  ]
}

/// Calls `proccode` with `(argument id, input block)` pairs.
pub fn call(id: &str, proccode: &str, args: &[(&str, &str)]) -> Block {
  let mut block =
    Block::new(id, "procedures_call").mutation(Mutation::procedure(proccode));
  for (arg, input) in args {
    block = block.input(arg, input);
  }
  block
}

pub fn value_of(runtime: &Runtime, target: TargetId, variable: &str) -> Value {
  runtime
    .target(target)
    .and_then(|target| target.variable(variable))
    .map(|variable| variable.get())
    .unwrap_or_default()
}

pub fn items_of(runtime: &Runtime, target: TargetId, list: &str) -> Vec<Value> {
  runtime
    .target(target)
    .and_then(|target| target.variable(list))
    .map(|list| list.items().to_vec())
    .unwrap_or_default()
}

pub fn strings(values: &[Value]) -> Vec<String> {
  values.iter().map(Value::to_string).collect()
}

/// Steps until no thread is left, at most `max_steps` times. Returns the
/// number of steps taken.
pub fn run(runtime: &mut Runtime, max_steps: usize) -> usize {
  for steps in 1..=max_steps {
    runtime.step();
    if runtime.threads().is_empty() {
      return steps;
    }
  }
  panic!("threads still running after {max_steps} steps");
}
