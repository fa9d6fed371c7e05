use super::{BlockArgs, BlockLibrary, BlockRegistry, Reported};
use crate::block_utility::BlockUtility;
use crate::compiler::{generator, Generator};
use crate::error::BlockError;

type Outcome = Result<Reported, BlockError>;

fn timer(_: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  util.io_query("clock", "projectTimer", &[])
}

fn reset_timer(_: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  util.io_query("clock", "resetProjectTimer", &[])
}

#[derive(Debug, Default)]
pub struct SensingBlocks;

impl BlockLibrary for SensingBlocks {
  fn name(&self) -> &'static str {
    "sensing"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    registry.register_fn("sensing_timer", timer);
    registry.register_fn("sensing_resettimer", reset_timer);
    registry.register_generator(
      "sensing_timer",
      Generator::Reporter(generator::timer),
    );
  }
}
