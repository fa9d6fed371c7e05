//! The interpreter: runs the block at the top of a thread's stack.

use std::mem;
use std::rc::Rc;

use crate::block::{is_stack_input, BlockId};
use crate::block_utility::{BlockUtility, UtilityMode};
use crate::blocks::{BlockArgs, Reported};
use crate::cast;
use crate::error::BlockError;
use crate::sequencer::Sequencer;
use crate::thread::{PendingPromise, Thread, ThreadStatus, WaitKind};
use crate::value::Value;

/// Applies a hat's predicate result. Edge-activated hats fire only on a
/// false to true transition, other hats whenever the value is true.
/// Retires the thread and returns false when the hat does not fire.
pub(crate) fn report_hat_value(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
  block: &BlockId,
  opcode: &str,
  value: &Value,
) -> bool {
  let value = cast::to_boolean(value);
  let edge_activated = seq
    .runtime
    .registry
    .get_hat(opcode)
    .is_some_and(|hat| hat.edge_activated);
  let fired = if edge_activated {
    seq.runtime.edge_activated(thread, block, value)
  } else {
    value
  };
  if !fired {
    thread.retire();
  }
  fired
}

/// Executes the block on top of `thread`'s stack once, evaluating its
/// inputs first. Reporter inputs run on their own frames so a reporter
/// returning a promise can suspend the whole thread.
pub(crate) fn execute(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
) -> Result<(), BlockError> {
  if !seq.runtime.has_target(thread.target) {
    log::debug!("thread {} lost its target", thread.id);
    thread.retire();
    return Ok(());
  }
  let Some(block_id) = thread.peek_stack() else {
    return Ok(());
  };
  let blocks = Rc::clone(&thread.blocks);
  let Some(block) = blocks.get_block(&block_id) else {
    log::warn!("block {block_id} does not exist");
    thread.retire();
    return Ok(());
  };
  let opcode = block.opcode.as_str();
  let is_hat = seq.runtime.registry.is_hat(opcode);

  let Some(primitive) = seq.runtime.registry.get_opcode_function(opcode)
  else {
    if is_hat {
      return Ok(());
    }
    if block.inputs.is_empty() && block.fields.len() == 1 {
      let value = block
        .fields
        .values()
        .next()
        .map(|field| field.value.clone())
        .unwrap_or_default();
      thread.push_reported_value(value);
    } else {
      log::warn!("no primitive for {opcode}");
    }
    return Ok(());
  };

  let frame_index = thread.stack_depth() - 1;
  let mut args = BlockArgs::new(opcode, Some(block_id.clone()));
  args.mutation = block.mutation.clone();
  for (name, field) in &block.fields {
    args.insert_field(name, field.clone());
  }

  let mut reported = mem::take(&mut thread.stack[frame_index].reported);
  thread.stack[frame_index].waiting_reporter = None;
  for (name, input) in &block.inputs {
    if is_stack_input(name) {
      continue;
    }
    if let Some(value) = reported.remove(name) {
      args.insert(name, value);
      continue;
    }
    let Some(input_block) = block.input_block(name).cloned() else {
      continue;
    };
    thread.stack[frame_index].waiting_reporter = Some(name.clone());
    thread.push_stack(Some(input_block));
    execute(seq, thread)?;

    if thread.status == ThreadStatus::PromiseWait {
      // Inputs evaluated so far are reused when the thread resumes.
      if let Some(frame) = thread.stack.get_mut(frame_index) {
        frame.reported.extend(args.into_values());
      }
      return Ok(());
    }
    if thread.stack_depth() != frame_index + 2 || thread.is_done() {
      return Ok(());
    }
    thread.pop_stack_frame();
    let frame = &mut thread.stack[frame_index];
    frame.waiting_reporter = None;
    let value = frame.reported.remove(name).unwrap_or_default();
    args.insert(name, value);
  }

  let mut context =
    mem::take(&mut thread.stack[frame_index].execution_context);
  let result = {
    let mut util =
      BlockUtility::new(seq, thread, &mut context, UtilityMode::Interpreted);
    primitive(&args, &mut util)
  };
  if thread.stack_depth() > frame_index {
    thread.stack[frame_index].execution_context = context;
  }

  match result? {
    Reported::Nothing => {}
    Reported::Promise(promise) => {
      thread.status = ThreadStatus::PromiseWait;
      thread.pending = Some(PendingPromise {
        promise,
        kind: WaitKind::Block { hat: is_hat },
      });
    }
    Reported::Value(value) if is_hat => {
      report_hat_value(seq, thread, &block_id, opcode, &value);
    }
    Reported::Value(value) => thread.push_reported_value(value),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::block::{Block, BlockContainer};
  use crate::config::RuntimeConfig;
  use crate::input::Field;
  use crate::runtime::Runtime;
  use crate::target::Target;
  use crate::timer::ManualClock;

  fn runtime_with(blocks: Vec<Block>) -> (Runtime, usize) {
    let config = RuntimeConfig {
      compiler_enabled: false,
      ..RuntimeConfig::default()
    };
    let mut runtime = Runtime::with_clock(config, Rc::new(ManualClock::new()));
    let target = runtime
      .add_target(Target::stage(BlockContainer::from_blocks(blocks)));
    (runtime, target)
  }

  fn number(id: &str, value: f64) -> Block {
    Block::new(id, "math_number")
      .shadow()
      .field("NUM", Field::new(value))
  }

  #[test]
  fn nested_reporters_feed_their_parent() {
    let (mut runtime, target) = runtime_with(vec![
      Block::new("sum", "operator_add")
        .top_level()
        .input("NUM1", "product")
        .input("NUM2", "two"),
      Block::new("product", "operator_multiply")
        .input("NUM1", "three")
        .input("NUM2", "four"),
      number("two", 2.),
      number("three", 3.),
      number("four", 4.),
    ]);
    let blocks = Rc::clone(&runtime.target(target).unwrap().blocks);
    let mut thread = Thread::new(7, target, "sum".into(), blocks);
    execute(&mut Sequencer::new(&mut runtime), &mut thread).unwrap();
    assert_eq!(thread.reported_value, Some(Value::from(14.)));
    assert_eq!(thread.stack_depth(), 1);
  }

  #[test]
  fn unknown_opcodes_are_skipped() {
    let (mut runtime, target) =
      runtime_with(vec![Block::new("odd", "pen_clear").top_level()]);
    let blocks = Rc::clone(&runtime.target(target).unwrap().blocks);
    let mut thread = Thread::new(1, target, "odd".into(), blocks);
    execute(&mut Sequencer::new(&mut runtime), &mut thread).unwrap();
    assert_eq!(thread.status, ThreadStatus::Running);
    assert_eq!(thread.reported_value, None);
  }

  #[test]
  fn threads_without_a_target_retire() {
    let (mut runtime, target) =
      runtime_with(vec![Block::new("a", "control_wait").top_level()]);
    let blocks = Rc::clone(&runtime.target(target).unwrap().blocks);
    let mut thread = Thread::new(1, target + 5, "a".into(), blocks);
    execute(&mut Sequencer::new(&mut runtime), &mut thread).unwrap();
    assert_eq!(thread.status, ThreadStatus::Done);
  }
}
