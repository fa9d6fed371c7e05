use std::rc::Rc;

use crate::block::BlockContainer;
use crate::blocks::Reported;
use crate::error::BlockError;
use crate::runtime::Runtime;
use crate::sequencer::Sequencer;
use crate::target::TargetId;
use crate::thread::{ExecutionContext, Thread, ThreadId, ThreadStatus};
use crate::value::Value;
use crate::variable::Variable;

/// Which executor a primitive is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UtilityMode {
  Interpreted,
  /// Called from compiled code; control flow requests are handed back to
  /// the compatibility layer instead of touching the stack.
  Compiled { warp: bool },
}

/// Control flow a primitive asked for while running in compiled code.
#[derive(Debug, Default)]
pub(crate) struct CompatRequests {
  pub branch: Option<(usize, bool)>,
  pub stop_this_script: bool,
}

/// Everything a primitive may do to the thread and runtime it runs in.
pub struct BlockUtility<'s, 'r> {
  sequencer: &'s mut Sequencer<'r>,
  thread: &'s mut Thread,
  context: &'s mut ExecutionContext,
  mode: UtilityMode,
  pub(crate) requests: CompatRequests,
}

impl<'s, 'r> BlockUtility<'s, 'r> {
  pub(crate) fn new(
    sequencer: &'s mut Sequencer<'r>,
    thread: &'s mut Thread,
    context: &'s mut ExecutionContext,
    mode: UtilityMode,
  ) -> Self {
    BlockUtility {
      sequencer,
      thread,
      context,
      mode,
      requests: CompatRequests::default(),
    }
  }

  pub fn target_id(&self) -> TargetId {
    self.thread.target
  }

  pub fn thread_id(&self) -> ThreadId {
    self.thread.id
  }

  pub fn runtime(&mut self) -> &mut Runtime {
    &mut *self.sequencer.runtime
  }

  pub fn blocks(&self) -> Rc<BlockContainer> {
    Rc::clone(&self.thread.blocks)
  }

  /// Scratch state of the running block, kept across yields.
  pub fn execution_context(&mut self) -> &mut ExecutionContext {
    &mut *self.context
  }

  pub fn is_warp(&self) -> bool {
    match self.mode {
      UtilityMode::Interpreted => self.thread.is_warp_mode(),
      UtilityMode::Compiled { warp } => warp,
    }
  }

  pub fn current_msecs(&self) -> f64 {
    self.sequencer.runtime.current_msecs()
  }

  // Thread control

  /// Lets other threads run; the block is visited again later.
  pub fn yield_thread(&mut self) {
    self.thread.status = ThreadStatus::Yield;
  }

  /// Sleeps until the next tick.
  pub fn yield_tick(&mut self) {
    self.thread.status = ThreadStatus::YieldTick;
  }

  pub fn start_branch(&mut self, branch_num: usize, is_loop: bool) {
    match self.mode {
      UtilityMode::Interpreted => {
        self
          .sequencer
          .step_to_branch(self.thread, branch_num, is_loop)
      }
      UtilityMode::Compiled { .. } => {
        self.requests.branch = Some((branch_num, is_loop))
      }
    }
  }

  pub fn start_procedure(&mut self, proccode: &str) {
    match self.mode {
      UtilityMode::Interpreted => {
        self.sequencer.step_to_procedure(self.thread, proccode)
      }
      UtilityMode::Compiled { .. } => {
        log::warn!("{proccode:?} cannot be entered from compiled code")
      }
    }
  }

  pub fn stop_all(&mut self) {
    self.sequencer.runtime.stop_all();
    self.thread.retire();
  }

  pub fn stop_other_target_threads(&mut self) {
    let target = self.thread.target;
    let id = self.thread.id;
    self.sequencer.runtime.stop_for_target(target, Some(id));
  }

  pub fn stop_this_script(&mut self) {
    match self.mode {
      UtilityMode::Interpreted => self.thread.stop_this_script(),
      UtilityMode::Compiled { .. } => self.requests.stop_this_script = true,
    }
  }

  /// Finishes this thread.
  pub fn stop_thread(&mut self) {
    self.sequencer.retire_thread(self.thread);
  }

  pub fn request_redraw(&mut self) {
    self.sequencer.runtime.request_redraw();
  }

  // Timers

  pub fn stack_timer_needs_init(&self) -> bool {
    self.context.timer_start.is_none()
  }

  pub fn start_stack_timer(&mut self, duration: f64) {
    self.context.timer_start = Some(self.current_msecs());
    self.context.duration = duration;
  }

  pub fn stack_timer_finished(&self) -> bool {
    let start = self.context.timer_start.unwrap_or_default();
    self.current_msecs() - start >= self.context.duration
  }

  // Parameters

  pub fn init_params(&mut self) {
    self.thread.init_params();
  }

  pub fn push_param(&mut self, name: &str, value: Value) {
    self.thread.push_param(name, value);
  }

  pub fn get_param(&self, name: &str) -> Option<Value> {
    self.thread.get_param(name)
  }

  // Runtime services

  /// Starts matching hats on every target.
  pub fn start_hats(
    &mut self,
    opcode: &str,
    match_fields: &[(&str, &str)],
  ) -> Vec<ThreadId> {
    self.sequencer.runtime.start_hats(opcode, match_fields, None)
  }

  pub fn io_query(
    &mut self,
    device: &str,
    function: &str,
    args: &[Value],
  ) -> Result<Reported, BlockError> {
    self.sequencer.runtime.io_query(device, function, args)
  }

  pub fn lookup_or_create_variable(
    &mut self,
    id: &str,
    name: &str,
  ) -> Result<&mut Variable, BlockError> {
    let target = self.thread.target;
    self.sequencer.runtime.lookup_or_create_variable(target, id, name)
  }

  pub fn lookup_or_create_list(
    &mut self,
    id: &str,
    name: &str,
  ) -> Result<&mut Variable, BlockError> {
    let target = self.thread.target;
    self.sequencer.runtime.lookup_or_create_list(target, id, name)
  }

  pub fn set_variable(
    &mut self,
    id: &str,
    name: &str,
    value: Value,
  ) -> Result<(), BlockError> {
    let target = self.thread.target;
    self.sequencer.runtime.set_variable(target, id, name, value)
  }

  pub fn list_item_limit(&self) -> usize {
    self.sequencer.runtime.config.list_item_limit
  }
}
