//! Runs blocks without a generator from compiled code, by calling their
//! primitive with a [`BlockUtility`] in compiled mode. Yields, branches and
//! promises the primitive asks for are translated into compiled control
//! flow here.

use std::mem;

use crate::block_utility::{BlockUtility, UtilityMode};
use crate::blocks::{BlockArgs, Reported};
use crate::compiler::runner::{
  advance, cursor_mut, eval, stop_this_script, yield_point, Flow,
};
use crate::compiler::CompatCall;
use crate::error::BlockError;
use crate::sequencer::Sequencer;
use crate::thread::{
  CodeCursor, ExecutionContext, FrameKind, PendingPromise, Thread,
  ThreadStatus, WaitKind,
};

fn save_context(thread: &mut Thread, pc: usize, context: ExecutionContext) {
  if let Some(cursor) = cursor_mut(thread) {
    cursor.contexts.insert(pc, context);
  }
}

/// Calls the primitive behind `call`, the instruction at `pc` of the top
/// frame. The instruction's execution context is kept while the block is
/// unfinished, so the next visit resumes it.
pub(crate) fn run_in_compatibility_layer(
  seq: &mut Sequencer<'_>,
  thread: &mut Thread,
  call: &CompatCall,
  pc: usize,
) -> Result<Flow, BlockError> {
  let Some(primitive) = seq.runtime.registry.get_opcode_function(&call.opcode)
  else {
    log::warn!("no primitive for {}", call.opcode);
    advance(thread);
    return Ok(Flow::Continue);
  };

  let mut args = BlockArgs::new(&call.opcode, Some(call.block.clone()));
  args.mutation = call.mutation.clone();
  for (name, field) in &call.fields {
    args.insert_field(name, field.clone());
  }
  for (name, expr) in &call.args {
    let value = eval(seq, thread, expr)?;
    args.insert(name, value);
  }

  let depth = thread.stack_depth();
  let mut context = cursor_mut(thread)
    .and_then(|cursor| cursor.contexts.remove(&pc))
    .unwrap_or_default();

  loop {
    let warp = thread.is_warp_mode();
    let (result, requests) = {
      let mode = UtilityMode::Compiled { warp };
      let mut util = BlockUtility::new(seq, thread, &mut context, mode);
      let result = primitive(&args, &mut util);
      (result, mem::take(&mut util.requests))
    };
    let reported = result?;

    if thread.status == ThreadStatus::Done || thread.stack_depth() < depth {
      return Ok(Flow::Return);
    }
    if requests.stop_this_script {
      stop_this_script(thread);
      return Ok(Flow::Continue);
    }
    if let Reported::Promise(promise) = reported {
      thread.status = ThreadStatus::PromiseWait;
      thread.pending = Some(PendingPromise {
        promise,
        kind: WaitKind::Compiled { dest: call.dest },
      });
      advance(thread);
      return Ok(Flow::Return);
    }

    match thread.status {
      ThreadStatus::Yield => {
        thread.status = ThreadStatus::Running;
        if warp && !seq.warp_expired(thread) {
          continue;
        }
        save_context(thread, pc, context);
        return Ok(Flow::Return);
      }
      ThreadStatus::YieldTick => {
        save_context(thread, pc, context);
        return Ok(Flow::Return);
      }
      _ => {}
    }

    if let Some((branch_num, is_loop)) = requests.branch {
      if is_loop {
        save_context(thread, pc, context);
      } else {
        advance(thread);
      }
      let body = branch_num
        .checked_sub(1)
        .and_then(|index| call.branches.get(index))
        .cloned()
        .flatten();
      return Ok(match body {
        Some(body) => {
          let frame = thread.push_stack_frame(is_loop);
          let kind = FrameKind::Branch { is_loop };
          frame.code = Some(CodeCursor::new(body, kind));
          Flow::Continue
        }
        None if is_loop => yield_point(seq, thread),
        None => Flow::Continue,
      });
    }

    if let (Some(dest), Some(value)) = (call.dest, reported.into_value()) {
      if let Some(local) =
        cursor_mut(thread).and_then(|cursor| cursor.locals.get_mut(dest))
      {
        *local = value;
      }
    }
    advance(thread);
    return Ok(Flow::Continue);
  }
}
