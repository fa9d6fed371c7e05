use super::{BlockArgs, BlockLibrary, BlockRegistry, Reported};
use crate::block_utility::BlockUtility;
use crate::compiler::{generator, Generator};
use crate::error::BlockError;
use crate::value::Value;

type Outcome = Result<Reported, BlockError>;

fn definition(_: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(Reported::Nothing)
}

/// Binds the arguments by parameter name and enters the definition. Runs
/// once per visit of the call block.
fn call(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  if util.execution_context().executed {
    return Ok(Reported::Nothing);
  }
  let Some(proccode) = args.mutation.as_ref().and_then(|m| m.proccode.clone())
  else {
    return Ok(Reported::Nothing);
  };
  let signature = match util.blocks().get_procedure_signature(&proccode) {
    Ok(Some(signature)) => signature,
    Ok(None) => return Ok(Reported::Nothing),
    Err(error) => {
      log::warn!("cannot call {proccode:?}: {error}");
      return Ok(Reported::Nothing);
    }
  };
  util.init_params();
  for (index, id) in signature.ids.iter().enumerate() {
    let Some(name) = signature.names.get(index) else {
      continue;
    };
    let value = match args.get_opt(id) {
      Some(value) => value.clone(),
      None => signature.defaults.get(index).cloned().unwrap_or_else(Value::empty),
    };
    util.push_param(name, value);
  }
  util.execution_context().executed = true;
  util.start_procedure(&proccode);
  Ok(Reported::Nothing)
}

fn argument_string_number(
  args: &BlockArgs,
  util: &mut BlockUtility,
) -> Outcome {
  let value = util.get_param(&args.string("VALUE"));
  Ok(value.unwrap_or(Value::from(0.)).into())
}

fn argument_boolean(args: &BlockArgs, util: &mut BlockUtility) -> Outcome {
  let value = util.get_param(&args.string("VALUE"));
  Ok(value.unwrap_or(Value::Bool(false)).into())
}

#[derive(Debug, Default)]
pub struct ProcedureBlocks;

impl BlockLibrary for ProcedureBlocks {
  fn name(&self) -> &'static str {
    "procedures"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    registry.register_fn("procedures_definition", definition);
    registry.register_fn("procedures_call", call);
    registry
      .register_fn("argument_reporter_string_number", argument_string_number);
    registry.register_fn("argument_reporter_boolean", argument_boolean);

    registry.register_generator(
      "procedures_call",
      Generator::Statement(generator::call),
    );
    registry.register_generator(
      "argument_reporter_string_number",
      Generator::Reporter(generator::argument_string_number),
    );
    registry.register_generator(
      "argument_reporter_boolean",
      Generator::Reporter(generator::argument_boolean),
    );
  }
}
