use std::cell::Cell;
use std::rc::Rc;

use super::{BlockArgs, BlockLibrary, BlockRegistry, HatInfo, Reported};
use crate::block_utility::BlockUtility;
use crate::cast;
use crate::compiler::{generator, Generator};
use crate::error::BlockError;

type Outcome = Result<Reported, BlockError>;

fn repeat(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let times = cast::js_round(args.number("TIMES"));
  let context = util.execution_context();
  let counter = context.loop_counter.unwrap_or(times) - 1.;
  context.loop_counter = Some(counter);
  if counter >= 0. {
    util.start_branch(1, true);
  }
  Ok(Reported::Nothing)
}

fn repeat_until(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if !args.boolean("CONDITION") {
    util.start_branch(1, true);
  }
  Ok(Reported::Nothing)
}

fn repeat_while(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if args.boolean("CONDITION") {
    util.start_branch(1, true);
  }
  Ok(Reported::Nothing)
}

fn forever(_: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  util.start_branch(1, true);
  Ok(Reported::Nothing)
}

fn if_(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if args.boolean("CONDITION") {
    util.start_branch(1, false);
  }
  Ok(Reported::Nothing)
}

fn if_else(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let branch = if args.boolean("CONDITION") { 1 } else { 2 };
  util.start_branch(branch, false);
  Ok(Reported::Nothing)
}

fn all_at_once(_: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  util.start_branch(1, false);
  Ok(Reported::Nothing)
}

fn wait(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if util.stack_timer_needs_init() {
    let duration = (1000. * args.number("DURATION")).max(0.);
    util.start_stack_timer(duration);
    util.request_redraw();
    util.yield_thread();
  } else if !util.stack_timer_finished() {
    util.yield_thread();
  }
  Ok(Reported::Nothing)
}

fn wait_until(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if !args.boolean("CONDITION") {
    util.yield_thread();
  }
  Ok(Reported::Nothing)
}

fn stop(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  match args.string("STOP_OPTION").as_str() {
    "all" => util.stop_all(),
    "other scripts in sprite" | "other scripts in stage" => {
      util.stop_other_target_threads()
    }
    "this script" => util.stop_this_script(),
    other => log::warn!("unknown stop option {other:?}"),
  }
  Ok(Reported::Nothing)
}

fn create_clone_of(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let option = args.string("CLONE_OPTION");
  let target = util.target_id();
  let runtime = util.runtime();
  let source = if option == "_myself_" {
    Some(target)
  } else {
    runtime.original_target_by_name(&option)
  };
  if let Some(source) = source {
    runtime.create_clone(source);
  }
  Ok(Reported::Nothing)
}

fn delete_this_clone(_: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let target = util.target_id();
  if util.runtime().is_clone(target) {
    util.runtime().dispose_target(target);
    util.stop_thread();
  }
  Ok(Reported::Nothing)
}

/// Control blocks. Owns the shared counter used by the counter blocks.
#[derive(Debug, Default)]
pub struct ControlBlocks {
  counter: Rc<Cell<f64>>,
}

impl ControlBlocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn counter(&self) -> f64 {
    self.counter.get()
  }
}

impl BlockLibrary for ControlBlocks {
  fn name(&self) -> &'static str {
    "control"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    registry.register_fn("control_repeat", repeat);
    registry.register_fn("control_repeat_until", repeat_until);
    registry.register_fn("control_while", repeat_while);
    registry.register_fn("control_forever", forever);
    registry.register_fn("control_if", if_);
    registry.register_fn("control_if_else", if_else);
    registry.register_fn("control_all_at_once", all_at_once);
    registry.register_fn("control_wait", wait);
    registry.register_fn("control_wait_until", wait_until);
    registry.register_fn("control_stop", stop);
    registry.register_fn("control_create_clone_of", create_clone_of);
    registry.register_fn("control_delete_this_clone", delete_this_clone);

    let counter = Rc::clone(&self.counter);
    registry.register_fn("control_get_counter", move |_, _| {
      Ok(counter.get().into())
    });
    let counter = Rc::clone(&self.counter);
    registry.register_fn("control_incr_counter", move |_, _| {
      counter.set(counter.get() + 1.);
      Ok(Reported::Nothing)
    });
    let counter = Rc::clone(&self.counter);
    registry.register_fn("control_clear_counter", move |_, _| {
      counter.set(0.);
      Ok(Reported::Nothing)
    });

    registry.register_hat("control_start_as_clone", HatInfo::default());

    let generators: [(&str, Generator); 10] = [
      ("control_if", Generator::Statement(generator::if_)),
      ("control_if_else", Generator::Statement(generator::if_else)),
      ("control_repeat", Generator::Statement(generator::repeat)),
      ("control_repeat_until", Generator::Statement(generator::repeat_until)),
      ("control_while", Generator::Statement(generator::repeat_while)),
      ("control_forever", Generator::Statement(generator::forever)),
      ("control_wait", Generator::Statement(generator::wait)),
      ("control_wait_until", Generator::Statement(generator::wait_until)),
      ("control_stop", Generator::Statement(generator::stop)),
      ("control_all_at_once", Generator::Statement(generator::all_at_once)),
    ];
    for (opcode, generator) in generators {
      registry.register_generator(opcode, generator);
    }
  }

  fn reset(&self) {
    self.counter.set(0.);
  }
}
