use super::{BlockArgs, BlockLibrary, BlockRegistry, HatInfo, Reported};
use crate::block_utility::BlockUtility;
use crate::error::BlockError;

type Outcome = Result<Reported, BlockError>;

const BROADCAST_RECEIVED: &str = "event_whenbroadcastreceived";

fn when_greater_than(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let value = args.number("VALUE");
  let fired = match args.string("WHENGREATERTHANMENU").to_lowercase().as_str() {
    "timer" => {
      let timer = util.io_query("clock", "projectTimer", &[])?;
      timer.into_value().map_or(0., |timer| timer.to_f64()) > value
    }
    _ => false,
  };
  Ok(fired.into())
}

fn broadcast(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let message = args.string("BROADCAST_INPUT");
  util.start_hats(BROADCAST_RECEIVED, &[("BROADCAST_OPTION", &message)]);
  Ok(Reported::Nothing)
}

/// Starts the receivers once, then yields until none of them is left in
/// the runtime's thread list.
fn broadcast_and_wait(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let started = match util.execution_context().started_threads.clone() {
    Some(started) => started,
    None => {
      let message = args.string("BROADCAST_INPUT");
      let started =
        util.start_hats(BROADCAST_RECEIVED, &[("BROADCAST_OPTION", &message)]);
      if started.is_empty() {
        return Ok(Reported::Nothing);
      }
      util.execution_context().started_threads = Some(started.clone());
      started
    }
  };
  let runtime = util.runtime();
  let waiting = started.iter().any(|&id| runtime.has_thread(id));
  if waiting {
    if started.iter().all(|&id| runtime.is_waiting_thread(id)) {
      util.yield_tick();
    } else {
      util.yield_thread();
    }
  }
  Ok(Reported::Nothing)
}

#[derive(Debug, Default)]
pub struct EventBlocks;

impl BlockLibrary for EventBlocks {
  fn name(&self) -> &'static str {
    "event"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    let restart = HatInfo {
      edge_activated: false,
      restart_existing_threads: true,
    };
    registry.register_hat("event_whenflagclicked", restart);
    registry.register_hat(BROADCAST_RECEIVED, restart);
    registry.register_hat("event_whengreaterthan", HatInfo {
      edge_activated: true,
      restart_existing_threads: false,
    });
    registry.register_fn("event_whengreaterthan", when_greater_than);
    registry.register_fn("event_broadcast", broadcast);
    registry.register_fn("event_broadcastandwait", broadcast_and_wait);
  }
}

