use std::collections::HashMap;
use std::rc::Rc;

use crate::block::{BlockContainer, BlockId};
use crate::compiler::{CompileResult, CompiledScript};
use crate::promise::Promise;
use crate::target::TargetId;
use crate::timer::Timer;
use crate::value::Value;

pub type ThreadId = u64;

/// How far back `is_recursive_call` looks for an enclosing call.
const RECURSION_SCAN_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
  /// Runs on the next visit.
  Running,
  /// Gave up the rest of this pass; may run again in the same tick.
  Yield,
  /// Sleeps until the next tick.
  YieldTick,
  /// Waits for a promise to settle.
  PromiseWait,
  Done,
}

/// Scratch space a block keeps between visits: loop counters, timers and
/// whatever else a primitive needs to remember while it yields.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
  pub loop_counter: Option<f64>,
  pub timer_start: Option<f64>,
  pub duration: f64,
  pub executed: bool,
  pub started_threads: Option<Vec<ThreadId>>,
  pub values: HashMap<String, Value>,
}

impl ExecutionContext {
  fn clear(&mut self) {
    self.loop_counter = None;
    self.timer_start = None;
    self.duration = 0.;
    self.executed = false;
    self.started_threads = None;
    self.values.clear();
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
  /// The body of the script the thread was started with.
  Script,
  /// A custom block body; returning pops back into the caller.
  Procedure,
  /// A substack entered by a block running through the compatibility
  /// layer.
  Branch { is_loop: bool },
}

/// Position inside a compiled script.
#[derive(Debug, Clone)]
pub struct CodeCursor {
  pub script: Rc<CompiledScript>,
  pub pc: usize,
  pub locals: Vec<Value>,
  /// Execution contexts of compatibility calls that are mid-flight, by
  /// instruction index.
  pub contexts: HashMap<usize, ExecutionContext>,
  pub kind: FrameKind,
}

impl CodeCursor {
  pub fn new(script: Rc<CompiledScript>, kind: FrameKind) -> Self {
    let locals = vec![Value::default(); script.locals];
    CodeCursor {
      script,
      pc: 0,
      locals,
      contexts: HashMap::new(),
      kind,
    }
  }
}

/// One activation record. Interpreted frames track the block they are at,
/// compiled frames carry a [`CodeCursor`].
#[derive(Debug, Default)]
pub struct StackFrame {
  pub block: Option<BlockId>,
  pub is_loop: bool,
  pub warp_mode: bool,
  pub execution_context: ExecutionContext,
  pub params: Option<HashMap<String, Value>>,
  pub reported: HashMap<String, Value>,
  pub waiting_reporter: Option<String>,
  pub code: Option<CodeCursor>,
}

impl StackFrame {
  fn reuse(&mut self, block: Option<BlockId>, warp_mode: bool) {
    self.block = block;
    self.is_loop = false;
    self.warp_mode = warp_mode;
    self.execution_context.clear();
    self.params = None;
    self.reported.clear();
    self.waiting_reporter = None;
    self.code = None;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitKind {
  /// An interpreted block; `hat` when it was a hat predicate.
  Block { hat: bool },
  /// A compatibility call in compiled code; the value lands in `dest`.
  Compiled { dest: Option<usize> },
}

#[derive(Debug, Clone)]
pub(crate) struct PendingPromise {
  pub promise: Promise,
  pub kind: WaitKind,
}

/// One running instance of a script.
#[derive(Debug)]
pub struct Thread {
  pub id: ThreadId,
  pub target: TargetId,
  pub top_block: BlockId,
  pub status: ThreadStatus,
  pub stack_click: bool,
  pub update_monitor: bool,
  /// Result of a top-level reporter, for stack clicks and monitors.
  pub reported_value: Option<Value>,
  pub(crate) blocks: Rc<BlockContainer>,
  pub(crate) stack: Vec<StackFrame>,
  frame_pool: Vec<StackFrame>,
  pub(crate) compiled: Option<Rc<CompileResult>>,
  pub(crate) warp_timer: Option<Timer>,
  pub(crate) pending: Option<PendingPromise>,
}

impl Thread {
  pub fn new(
    id: ThreadId,
    target: TargetId,
    top_block: BlockId,
    blocks: Rc<BlockContainer>,
  ) -> Self {
    let mut thread = Thread {
      id,
      target,
      top_block: top_block.clone(),
      status: ThreadStatus::Running,
      stack_click: false,
      update_monitor: false,
      reported_value: None,
      blocks,
      stack: Vec::new(),
      frame_pool: Vec::new(),
      compiled: None,
      warp_timer: None,
      pending: None,
    };
    thread.push_stack(Some(top_block));
    thread
  }

  /// Holds a thread's place in the runtime's list while the real thread is
  /// being stepped.
  pub(crate) fn stand_in(&self) -> Thread {
    Thread {
      id: self.id,
      target: self.target,
      top_block: self.top_block.clone(),
      status: self.status,
      stack_click: self.stack_click,
      update_monitor: self.update_monitor,
      reported_value: None,
      blocks: Rc::clone(&self.blocks),
      stack: Vec::new(),
      frame_pool: Vec::new(),
      compiled: None,
      warp_timer: None,
      pending: None,
    }
  }

  pub fn is_done(&self) -> bool {
    self.status == ThreadStatus::Done || self.stack.is_empty()
  }

  pub fn is_compiled(&self) -> bool {
    self.compiled.is_some()
  }

  pub fn stack_depth(&self) -> usize {
    self.stack.len()
  }

  fn take_frame(&mut self, block: Option<BlockId>) -> StackFrame {
    let warp_mode = self.peek_stack_frame().is_some_and(|frame| frame.warp_mode);
    let mut frame = self.frame_pool.pop().unwrap_or_default();
    frame.reuse(block, warp_mode);
    frame
  }

  /// Pushes a frame for `block`, inheriting warp mode from the current
  /// frame. `None` marks an empty branch.
  pub fn push_stack(&mut self, block: Option<BlockId>) {
    let frame = self.take_frame(block);
    self.stack.push(frame);
  }

  /// Pushes a block-less frame, as compiled code does for branches and
  /// procedure calls.
  pub fn push_stack_frame(&mut self, is_loop: bool) -> &mut StackFrame {
    let mut frame = self.take_frame(None);
    frame.is_loop = is_loop;
    self.stack.push(frame);
    let top = self.stack.len() - 1;
    &mut self.stack[top]
  }

  /// Pops the current frame and returns the block it was at.
  pub fn pop_stack_frame(&mut self) -> Option<BlockId> {
    let mut frame = self.stack.pop()?;
    let block = frame.block.take();
    frame.code = None;
    self.frame_pool.push(frame);
    block
  }

  pub fn peek_stack(&self) -> Option<BlockId> {
    self.stack.last().and_then(|frame| frame.block.clone())
  }

  pub fn peek_stack_frame(&self) -> Option<&StackFrame> {
    self.stack.last()
  }

  pub fn peek_stack_frame_mut(&mut self) -> Option<&mut StackFrame> {
    self.stack.last_mut()
  }

  pub fn peek_parent_stack_frame_mut(&mut self) -> Option<&mut StackFrame> {
    let len = self.stack.len();
    if len < 2 {
      return None;
    }
    self.stack.get_mut(len - 2)
  }

  pub fn is_warp_mode(&self) -> bool {
    self.peek_stack_frame().is_some_and(|frame| frame.warp_mode)
  }

  /// Moves the current frame on to the block after the one it is at,
  /// clearing its per-block state.
  pub fn go_to_next_block(&mut self) {
    let next = self
      .peek_stack()
      .and_then(|block| self.blocks.get_next_block(&block));
    if let Some(frame) = self.stack.last_mut() {
      let warp_mode = frame.warp_mode;
      frame.reuse(next, warp_mode);
    }
  }

  pub fn init_params(&mut self) {
    if let Some(frame) = self.stack.last_mut() {
      frame.params = Some(HashMap::new());
    }
  }

  pub fn push_param(&mut self, name: &str, value: Value) {
    if let Some(frame) = self.stack.last_mut() {
      frame
        .params
        .get_or_insert_with(HashMap::new)
        .insert(name.to_string(), value);
    }
  }

  /// Looks a parameter up in the innermost frame that has bound any.
  pub fn get_param(&self, name: &str) -> Option<Value> {
    self
      .stack
      .iter()
      .rev()
      .find_map(|frame| frame.params.as_ref())
      .and_then(|params| params.get(name).cloned())
  }

  /// Hands a reporter's value to the block waiting for it, or keeps it as
  /// the thread's result when the reporter is at the top level.
  pub fn push_reported_value(&mut self, value: Value) {
    match self.peek_parent_stack_frame_mut() {
      Some(parent) => {
        if let Some(name) = parent.waiting_reporter.clone() {
          parent.reported.insert(name, value);
        }
      }
      None => self.reported_value = Some(value),
    }
  }

  /// Unwinds to the innermost procedure call, or finishes the thread when
  /// there is none.
  pub fn stop_this_script(&mut self) {
    while let Some(block) = self.peek_stack() {
      if self.blocks.get_opcode(&block) == Some("procedures_call") {
        break;
      }
      self.pop_stack_frame();
    }
    if self.stack.is_empty() {
      self.status = ThreadStatus::Done;
    }
  }

  /// Whether a call to `proccode` is already among the last few enclosing
  /// procedure calls.
  pub fn is_recursive_call(&self, proccode: &str) -> bool {
    self
      .stack
      .iter()
      .rev()
      .skip(1)
      .take(RECURSION_SCAN_DEPTH + 1)
      .filter_map(|frame| frame.block.as_ref())
      .filter_map(|block| self.blocks.get_block(block))
      .any(|block| {
        block.opcode == "procedures_call"
          && block
            .mutation
            .as_ref()
            .and_then(|mutation| mutation.proccode.as_deref())
            == Some(proccode)
      })
  }

  /// Replaces the stack with the compiled body, if the script compiled.
  pub(crate) fn enter_compiled(&mut self) -> bool {
    let Some(result) = self.compiled.clone() else {
      return false;
    };
    while !self.stack.is_empty() {
      self.pop_stack_frame();
    }
    let frame = self.push_stack_frame(false);
    frame.code = Some(CodeCursor::new(
      Rc::clone(&result.script),
      FrameKind::Script,
    ));
    true
  }

  /// Moves past a hat whose predicate passed.
  pub(crate) fn leave_hat(&mut self) {
    if !self.enter_compiled() {
      self.go_to_next_block();
    }
  }

  pub(crate) fn retire(&mut self) {
    while !self.stack.is_empty() {
      self.pop_stack_frame();
    }
    self.pending = None;
    self.warp_timer = None;
    self.status = ThreadStatus::Done;
  }
}
