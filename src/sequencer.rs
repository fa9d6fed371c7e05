use std::mem;

use crate::compiler::runner;
use crate::error::BlockError;
use crate::execute::{execute, report_hat_value};
use crate::promise::PromiseState;
use crate::runtime::Runtime;
use crate::thread::{Thread, ThreadId, ThreadStatus, WaitKind};
use crate::timer::Timer;
use crate::value::Value;

/// Steps the runtime's threads for one frame tick. Lives only as long as
/// the tick.
pub struct Sequencer<'r> {
  pub(crate) runtime: &'r mut Runtime,
  timer: Timer,
  active_thread: Option<ThreadId>,
}

impl<'r> Sequencer<'r> {
  pub fn new(runtime: &'r mut Runtime) -> Self {
    let timer = Timer::new(runtime.clock());
    Sequencer {
      runtime,
      timer,
      active_thread: None,
    }
  }

  /// The thread being stepped right now.
  pub fn active_thread(&self) -> Option<ThreadId> {
    self.active_thread
  }

  /// Runs passes over the thread list until the tick's work time runs out,
  /// nothing is left running, or a redraw was requested outside turbo
  /// mode. Returns the threads that finished.
  pub fn step_threads(&mut self) -> Vec<Thread> {
    let work_time = self.runtime.config.work_time();
    let turbo_mode = self.runtime.config.turbo_mode;
    self.timer.start();
    let mut done_threads = Vec::new();
    let mut num_active_threads = 1;
    let mut ran_first_tick = false;

    while !self.runtime.threads.is_empty()
      && num_active_threads > 0
      && (!ran_first_tick || self.timer.time_elapsed() < work_time)
      && (turbo_mode || !self.runtime.redraw_requested)
    {
      self.runtime.update_current_msecs();
      num_active_threads = 0;

      let mut index = 0;
      while index < self.runtime.threads.len() {
        let slot = &mut self.runtime.threads[index];
        if slot.status == ThreadStatus::YieldTick && !ran_first_tick {
          slot.status = ThreadStatus::Running;
        }
        let status = slot.status;
        if matches!(
          status,
          ThreadStatus::Running | ThreadStatus::Yield | ThreadStatus::PromiseWait
        ) && !slot.is_done()
        {
          let stand_in = slot.stand_in();
          let mut thread = mem::replace(slot, stand_in);
          self.active_thread = Some(thread.id);
          if status == ThreadStatus::PromiseWait {
            self.resume_promise(&mut thread);
          } else {
            self.step_thread(&mut thread);
          }
          thread.warp_timer = None;
          self.active_thread = None;
          self.put_back(index, thread);
        }
        if self
          .runtime
          .threads
          .get(index)
          .is_some_and(|thread| thread.status == ThreadStatus::Running)
        {
          num_active_threads += 1;
        }
        index += 1;
      }

      ran_first_tick = true;
      let threads = mem::take(&mut self.runtime.threads);
      let (done, alive): (Vec<Thread>, Vec<Thread>) =
        threads.into_iter().partition(Thread::is_done);
      self.runtime.threads = alive;
      done_threads.extend(done);
    }

    done_threads
  }

  /// Returns a stepped thread to its slot. A slot taken over by a
  /// restarted script keeps the new thread; a slot stopped meanwhile
  /// retires the old one.
  fn put_back(&mut self, index: usize, mut thread: Thread) {
    match self.runtime.threads.get_mut(index) {
      Some(slot) if slot.id == thread.id => {
        if slot.status == ThreadStatus::Done {
          thread.retire();
        }
        *slot = thread;
      }
      _ => log::trace!("thread {} was replaced while running", thread.id),
    }
  }

  pub(crate) fn warp_expired(&self, thread: &Thread) -> bool {
    thread
      .warp_timer
      .as_ref()
      .map_or(true, |timer| timer.time_elapsed() > self.runtime.config.warp_time)
  }

  pub(crate) fn start_warp_timer(&self, thread: &mut Thread) {
    if thread.is_warp_mode() && thread.warp_timer.is_none() {
      let mut timer = Timer::new(self.runtime.clock());
      timer.start();
      thread.warp_timer = Some(timer);
    }
  }

  /// Runs one thread until it yields, waits or finishes.
  pub fn step_thread(&mut self, thread: &mut Thread) {
    if thread
      .peek_stack_frame()
      .is_some_and(|frame| frame.code.is_some())
    {
      self.start_warp_timer(thread);
      if let Err(error) = runner::step_compiled(self, thread) {
        self.fail_thread(thread, error);
      }
      return;
    }

    if thread.peek_stack().is_none() && !self.unwind(thread) {
      return;
    }

    while let Some(current) = thread.peek_stack() {
      let depth = thread.stack_depth();
      let warp_mode = thread.is_warp_mode();
      self.start_warp_timer(thread);

      if let Err(error) = execute(self, thread) {
        self.fail_thread(thread, error);
        return;
      }

      match thread.status {
        ThreadStatus::Yield => {
          thread.status = ThreadStatus::Running;
          if warp_mode && !self.warp_expired(thread) {
            continue;
          }
          return;
        }
        ThreadStatus::PromiseWait | ThreadStatus::YieldTick => return,
        ThreadStatus::Done => return,
        ThreadStatus::Running => {}
      }

      if thread.stack_depth() == depth && thread.peek_stack() == Some(current) {
        thread.go_to_next_block();
      }
      if !self.unwind(thread) {
        return;
      }
    }
  }

  /// Pops finished frames until there is a block to run. Returns false
  /// when the thread should stop for now: it finished, a loop iteration
  /// ended outside warp mode, or a reporter's caller is waiting.
  fn unwind(&mut self, thread: &mut Thread) -> bool {
    while thread.peek_stack().is_none() {
      thread.pop_stack_frame();
      let Some(frame) = thread.peek_stack_frame() else {
        thread.status = ThreadStatus::Done;
        return false;
      };
      if frame.is_loop {
        return frame.warp_mode && !self.warp_expired(thread);
      }
      if frame.waiting_reporter.is_some() {
        return false;
      }
      thread.go_to_next_block();
    }
    true
  }

  /// Enters branch `branch_num` of the current block. Empty branches push
  /// an empty frame so loops still yield.
  pub fn step_to_branch(
    &mut self,
    thread: &mut Thread,
    branch_num: usize,
    is_loop: bool,
  ) {
    let Some(block) = thread.peek_stack() else {
      return;
    };
    let branch = thread.blocks.get_branch(&block, branch_num);
    if let Some(frame) = thread.peek_stack_frame_mut() {
      frame.is_loop = is_loop;
    }
    thread.push_stack(branch);
  }

  /// Enters a custom block's definition. Recursive calls yield outside
  /// warp mode.
  pub fn step_to_procedure(&mut self, thread: &mut Thread, proccode: &str) {
    let Some(definition) = thread.blocks.get_procedure_definition(proccode)
    else {
      log::warn!("no definition for {proccode:?}");
      return;
    };
    let is_recursive = thread.is_recursive_call(proccode);
    thread.push_stack(Some(definition));
    if thread.is_warp_mode() && self.warp_expired(thread) {
      thread.status = ThreadStatus::Yield;
      return;
    }
    let warp = match thread.blocks.get_procedure_signature(proccode) {
      Ok(signature) => signature.is_some_and(|signature| signature.warp),
      Err(error) => {
        log::warn!("bad signature for {proccode:?}: {error}");
        false
      }
    };
    if warp {
      if let Some(frame) = thread.peek_stack_frame_mut() {
        frame.warp_mode = true;
      }
    } else if is_recursive {
      thread.status = ThreadStatus::Yield;
    }
  }

  pub fn retire_thread(&mut self, thread: &mut Thread) {
    thread.retire();
  }

  /// Settles a thread waiting on a promise and, once it is running again,
  /// steps it.
  fn resume_promise(&mut self, thread: &mut Thread) {
    let Some(pending) = thread.pending.as_ref() else {
      thread.status = ThreadStatus::Running;
      return;
    };
    let kind = pending.kind;
    let outcome = match pending.promise.state() {
      PromiseState::Pending => return,
      PromiseState::Resolved(value) => Ok(value),
      PromiseState::Rejected(reason) => Err(reason),
    };
    thread.pending = None;
    if thread.status != ThreadStatus::PromiseWait {
      return;
    }
    thread.status = ThreadStatus::Running;
    match outcome {
      Ok(value) => self.settle(thread, kind, value),
      Err(reason) => {
        log::warn!("thread {} promise rejected: {reason}", thread.id);
        if let WaitKind::Block { .. } = kind {
          thread.pop_stack_frame();
          if thread.stack_depth() == 0 {
            thread.status = ThreadStatus::Done;
          }
        }
      }
    }
    if thread.status == ThreadStatus::Running && !thread.is_done() {
      self.step_thread(thread);
    }
  }

  fn settle(&mut self, thread: &mut Thread, kind: WaitKind, value: Value) {
    match kind {
      WaitKind::Compiled { dest } => {
        let cursor = thread
          .peek_stack_frame_mut()
          .and_then(|frame| frame.code.as_mut());
        if let (Some(dest), Some(cursor)) = (dest, cursor) {
          if let Some(local) = cursor.locals.get_mut(dest) {
            *local = value;
          }
        }
      }
      WaitKind::Block { hat: true } => {
        let Some(block) = thread.peek_stack() else {
          return;
        };
        let opcode = thread
          .blocks
          .get_opcode(&block)
          .map(str::to_string)
          .unwrap_or_default();
        if report_hat_value(self, thread, &block, &opcode, &value) {
          thread.leave_hat();
        }
      }
      WaitKind::Block { hat: false } => {
        let reporter = thread
          .peek_parent_stack_frame_mut()
          .is_some_and(|frame| frame.waiting_reporter.is_some());
        thread.push_reported_value(value);
        if reporter {
          thread.pop_stack_frame();
        } else {
          thread.go_to_next_block();
          self.unwind(thread);
        }
      }
    }
  }

  pub(crate) fn fail_thread(&mut self, thread: &mut Thread, error: BlockError) {
    self.runtime.report_error(thread, error);
    thread.retire();
  }
}
