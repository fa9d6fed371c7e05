//! Runs compiled instruction lists. Every piece of state lives in the
//! thread's frames, so a thread can stop after any instruction and pick up
//! where it left off on its next step.

use std::collections::HashMap;
use std::rc::Rc;

use super::ir::{Expr, ExprEnv, Op, StopOption, VarRef};
use crate::blocks::data;
use crate::cast;
use crate::compat::run_in_compatibility_layer;
use crate::error::BlockError;
use crate::runtime::Runtime;
use crate::sequencer::Sequencer;
use crate::thread::{
  CodeCursor, ExecutionContext, FrameKind, Thread, ThreadStatus,
};
use crate::value::Value;

/// Whether the runner keeps going after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
  Continue,
  Return,
}

/// Reads for expressions evaluated in the top frame of a thread.
pub(crate) struct FrameEnv<'a> {
  runtime: &'a mut Runtime,
  thread: &'a Thread,
}

impl ExprEnv for FrameEnv<'_> {
  fn local(&self, slot: usize) -> Value {
    self
      .thread
      .peek_stack_frame()
      .and_then(|frame| frame.code.as_ref())
      .and_then(|cursor| cursor.locals.get(slot))
      .cloned()
      .unwrap_or_default()
  }

  fn argument(&self, name: &str) -> Option<Value> {
    self.thread.get_param(name)
  }

  fn variable(&mut self, var: &VarRef) -> Result<Value, BlockError> {
    let target = self.thread.target;
    Ok(
      self
        .runtime
        .lookup_or_create_variable(target, &var.id, &var.name)?
        .get(),
    )
  }

  fn list(&mut self, var: &VarRef) -> Result<&[Value], BlockError> {
    let target = self.thread.target;
    let list = self.runtime.lookup_or_create_list(target, &var.id, &var.name)?;
    Ok(list.items())
  }

  fn timer(&mut self) -> Result<f64, BlockError> {
    let timer = self.runtime.io_query("clock", "projectTimer", &[])?;
    Ok(timer.into_value().map_or(0., |timer| timer.to_f64()))
  }
}

pub(crate) fn eval(
  seq: &mut Sequencer<'_>,
  thread: &Thread,
  expr: &Expr,
) -> Result<Value, BlockError> {
  let mut env = FrameEnv {
    runtime: &mut *seq.runtime,
    thread,
  };
  expr.eval(&mut env)
}

pub(crate) fn cursor_mut(thread: &mut Thread) -> Option<&mut CodeCursor> {
  thread.peek_stack_frame_mut()?.code.as_mut()
}

pub(crate) fn advance(thread: &mut Thread) {
  if let Some(cursor) = cursor_mut(thread) {
    cursor.pc += 1;
  }
}

fn jump(thread: &mut Thread, target: usize) {
  if let Some(cursor) = cursor_mut(thread) {
    cursor.pc = target;
  }
}

fn set_local(thread: &mut Thread, slot: usize, value: Value) {
  if let Some(local) =
    cursor_mut(thread).and_then(|cursor| cursor.locals.get_mut(slot))
  {
    *local = value;
  }
}

/// What a suspend point does: carry on while a warp thread still has
/// budget, otherwise end the turn.
pub(crate) fn yield_point(seq: &Sequencer<'_>, thread: &Thread) -> Flow {
  if thread.is_warp_mode() && !seq.warp_expired(thread) {
    Flow::Continue
  } else {
    Flow::Return
  }
}

/// Leaves the current script or procedure. The thread is done when there
/// is no caller to return to.
pub(crate) fn stop_this_script(thread: &mut Thread) {
  while let Some(frame) = thread.peek_stack_frame() {
    let kind = frame.code.as_ref().map(|cursor| cursor.kind);
    thread.pop_stack_frame();
    if kind == Some(FrameKind::Procedure) {
      break;
    }
  }
  if thread.stack_depth() == 0 {
    thread.status = ThreadStatus::Done;
  }
}

/// Pops a frame whose instructions ran out.
fn finish_frame(seq: &Sequencer<'_>, thread: &mut Thread) -> Flow {
  let kind = thread
    .peek_stack_frame()
    .and_then(|frame| frame.code.as_ref())
    .map(|cursor| cursor.kind);
  thread.pop_stack_frame();
  if thread.stack_depth() == 0 {
    thread.status = ThreadStatus::Done;
    return Flow::Return;
  }
  match kind {
    Some(FrameKind::Branch { is_loop: true }) => yield_point(seq, thread),
    _ => Flow::Continue,
  }
}

/// Steps a thread whose top frame is compiled until it yields, waits or
/// finishes.
pub(crate) fn step_compiled(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
) -> Result<(), BlockError> {
  if thread.status == ThreadStatus::Yield {
    thread.status = ThreadStatus::Running;
  }
  while thread.status == ThreadStatus::Running {
    let position = thread
      .peek_stack_frame()
      .and_then(|frame| frame.code.as_ref())
      .map(|cursor| (Rc::clone(&cursor.script), cursor.pc));
    let Some((script, pc)) = position else {
      log::warn!("thread {} left compiled code unexpectedly", thread.id);
      thread.retire();
      break;
    };
    let flow = match script.ops.get(pc) {
      Some(op) => run_op(seq, thread, op, pc)?,
      None => finish_frame(seq, thread),
    };
    if flow == Flow::Return {
      break;
    }
  }
  Ok(())
}

fn run_op(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
  op: &Op,
  pc: usize,
) -> Result<Flow, BlockError> {
  let target = thread.target;
  let limit = seq.runtime.config.list_item_limit;
  match op {
    Op::SetVariable { var, value } => {
      let value = eval(seq, thread, value)?;
      seq.runtime.set_variable(target, &var.id, &var.name, value)?;
    }
    Op::ChangeVariable { var, by } => {
      let by = cast::to_number(&eval(seq, thread, by)?);
      let old = seq
        .runtime
        .lookup_or_create_variable(target, &var.id, &var.name)?
        .get();
      let value = Value::from(cast::to_number(&old) + by);
      seq.runtime.set_variable(target, &var.id, &var.name, value)?;
    }
    Op::AddToList { list, item } => {
      let item = eval(seq, thread, item)?;
      let list = seq.runtime.lookup_or_create_list(target, &list.id, &list.name)?;
      data::add_to_list(list, item, limit);
    }
    Op::DeleteOfList { list, index } => {
      let index = eval(seq, thread, index)?;
      let list = seq.runtime.lookup_or_create_list(target, &list.id, &list.name)?;
      data::delete_of_list(list, &index);
    }
    Op::DeleteAllOfList { list } => {
      seq
        .runtime
        .lookup_or_create_list(target, &list.id, &list.name)?
        .delete_all_items();
    }
    Op::InsertAtList { list, index, item } => {
      let index = eval(seq, thread, index)?;
      let item = eval(seq, thread, item)?;
      let list = seq.runtime.lookup_or_create_list(target, &list.id, &list.name)?;
      data::insert_at_list(list, &index, item, limit);
    }
    Op::ReplaceItemOfList { list, index, item } => {
      let index = eval(seq, thread, index)?;
      let item = eval(seq, thread, item)?;
      let list = seq.runtime.lookup_or_create_list(target, &list.id, &list.name)?;
      data::replace_item_of_list(list, &index, item);
    }
    Op::Store { slot, value } => {
      let value = eval(seq, thread, value)?;
      set_local(thread, *slot, value);
    }
    Op::Jump(to) => {
      jump(thread, *to);
      return Ok(Flow::Continue);
    }
    Op::JumpIfFalse { condition, target } => {
      if !cast::to_boolean(&eval(seq, thread, condition)?) {
        jump(thread, *target);
        return Ok(Flow::Continue);
      }
    }
    Op::JumpIfTrue { condition, target } => {
      if cast::to_boolean(&eval(seq, thread, condition)?) {
        jump(thread, *target);
        return Ok(Flow::Continue);
      }
    }
    Op::RepeatInit { slot, times } => {
      let times = cast::js_round(cast::to_number(&eval(seq, thread, times)?));
      set_local(thread, *slot, Value::from(times));
    }
    Op::RepeatTest { slot, exit } => {
      let remaining = cursor_mut(thread)
        .and_then(|cursor| cursor.locals.get(*slot))
        .map_or(0., cast::to_number);
      if remaining >= 0.5 {
        set_local(thread, *slot, Value::from(remaining - 1.));
      } else {
        jump(thread, *exit);
        return Ok(Flow::Continue);
      }
    }
    Op::Yield => {
      advance(thread);
      return Ok(Flow::Return);
    }
    Op::YieldIfNeeded => {
      advance(thread);
      return Ok(yield_point(seq, thread));
    }
    Op::YieldTick => {
      advance(thread);
      thread.status = ThreadStatus::YieldTick;
      return Ok(Flow::Return);
    }
    Op::Wait { duration } => return wait(seq, thread, duration, pc),
    Op::Call { key, args } => {
      let mut params = HashMap::new();
      for (name, expr) in args {
        params.insert(name.clone(), eval(seq, thread, expr)?);
      }
      advance(thread);
      let body = thread
        .compiled
        .as_ref()
        .and_then(|compiled| compiled.procedures.get(key))
        .cloned();
      let Some(body) = body else {
        log::warn!("no compiled body for {:?}", key.proccode);
        return Ok(Flow::Continue);
      };
      let frame = thread.push_stack_frame(false);
      frame.warp_mode |= key.warp;
      frame.params = Some(params);
      frame.code = Some(CodeCursor::new(body, FrameKind::Procedure));
      seq.start_warp_timer(thread);
      return Ok(Flow::Continue);
    }
    Op::Compat(call) => {
      return run_in_compatibility_layer(seq, thread, call, pc);
    }
    Op::Stop(StopOption::All) => {
      seq.runtime.stop_all();
      thread.retire();
      return Ok(Flow::Return);
    }
    Op::Stop(StopOption::ThisScript) => {
      stop_this_script(thread);
      return Ok(Flow::Continue);
    }
    Op::Stop(StopOption::OtherScripts) => {
      seq.runtime.stop_for_target(target, Some(thread.id));
    }
    Op::Nop(_) => {}
  }
  advance(thread);
  Ok(Flow::Continue)
}

/// Times the wait in the instruction's context so it survives yields.
/// Always yields at least once, and asks for a redraw when it starts.
fn wait(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
  duration: &Expr,
  pc: usize,
) -> Result<Flow, BlockError> {
  let now = seq.runtime.current_msecs();
  let started = cursor_mut(thread)
    .and_then(|cursor| cursor.contexts.get(&pc))
    .map(|context| (context.timer_start.unwrap_or(now), context.duration));
  match started {
    None => {
      let seconds = cast::to_number(&eval(seq, thread, duration)?);
      let duration = (1000. * seconds).max(0.);
      if let Some(cursor) = cursor_mut(thread) {
        let context = ExecutionContext {
          timer_start: Some(now),
          duration,
          ..ExecutionContext::default()
        };
        cursor.contexts.insert(pc, context);
      }
      seq.runtime.request_redraw();
      Ok(yield_point(seq, thread))
    }
    Some((start, duration)) if now - start >= duration => {
      if let Some(cursor) = cursor_mut(thread) {
        cursor.contexts.remove(&pc);
        cursor.pc += 1;
      }
      Ok(Flow::Continue)
    }
    Some(_) => Ok(yield_point(seq, thread)),
  }
}

#[cfg(test)]
mod tests {
  use std::rc::Rc;

  use super::*;
  use crate::block::{Block, BlockContainer};
  use crate::compiler::compile_cached;
  use crate::config::RuntimeConfig;
  use crate::input::Field;
  use crate::target::Target;
  use crate::timer::ManualClock;
  use crate::variable::Variable;

  fn number(id: &str, value: f64) -> Block {
    Block::new(id, "math_number")
      .shadow()
      .field("NUM", Field::new(value))
  }

  #[test]
  fn repeat_runs_one_iteration_per_step() {
    let blocks = BlockContainer::from_blocks(vec![
      Block::new("loop", "control_repeat")
        .top_level()
        .input("TIMES", "three")
        .input("SUBSTACK", "inc"),
      number("three", 3.),
      Block::new("inc", "data_changevariableby")
        .field("VARIABLE", Field::with_id("n", "v"))
        .input("VALUE", "one"),
      number("one", 1.),
    ]);
    let mut runtime = Runtime::with_clock(
      RuntimeConfig::default(),
      Rc::new(ManualClock::new()),
    );
    let target = runtime.add_target(
      Target::stage(blocks).with_variable(Variable::scalar("v", "n", 0.)),
    );
    let container = Rc::clone(&runtime.target(target).unwrap().blocks);
    let mut thread = Thread::new(1, target, "loop".into(), Rc::clone(&container));
    thread.compiled =
      compile_cached(&container, runtime.registry(), &"loop".into());
    assert!(thread.enter_compiled());

    let value = |runtime: &Runtime| {
      runtime.target(target).unwrap().variable("v").unwrap().get()
    };
    for expected in 1..=3 {
      step_compiled(&mut Sequencer::new(&mut runtime), &mut thread).unwrap();
      assert_eq!(value(&runtime), Value::from(expected as f64));
      assert_eq!(thread.status, ThreadStatus::Running);
    }
    step_compiled(&mut Sequencer::new(&mut runtime), &mut thread).unwrap();
    assert_eq!(thread.status, ThreadStatus::Done);
    assert_eq!(value(&runtime), Value::from(3.));
  }

  #[test]
  fn stop_this_script_returns_to_the_caller() {
    let mut thread = Thread::new(
      1,
      0,
      "top".into(),
      Rc::new(BlockContainer::new()),
    );
    let script = Rc::new(Default::default());
    thread.peek_stack_frame_mut().unwrap().code =
      Some(CodeCursor::new(Rc::clone(&script), FrameKind::Script));
    thread.push_stack_frame(false).code =
      Some(CodeCursor::new(Rc::clone(&script), FrameKind::Procedure));
    thread.push_stack_frame(false).code =
      Some(CodeCursor::new(Rc::clone(&script), FrameKind::Branch {
        is_loop: false,
      }));
    stop_this_script(&mut thread);
    assert_eq!(thread.stack_depth(), 1);
    assert_ne!(thread.status, ThreadStatus::Done);
    stop_this_script(&mut thread);
    assert_eq!(thread.status, ThreadStatus::Done);
  }
}
