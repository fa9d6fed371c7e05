//! Compiled fragments for the core blocks.

use super::{
  CompiledInput, Expr, InputType, Op, ScriptCompiler, StopOption, VarRef,
};
use crate::block::{Block, ProcedureSignature};
use crate::blocks::operators::{Arithmetic, Comparison, MathOp};
use crate::error::CompileError;
use crate::value::Value;

type Statement = Result<(), CompileError>;
type Reporter = Result<CompiledInput, CompileError>;

fn var_ref(block: &Block, field: &str) -> VarRef {
  let field = block.fields.get(field);
  VarRef {
    id: field.and_then(|field| field.id.clone()).unwrap_or_default(),
    name: field.map(|field| field.text()).unwrap_or_default(),
  }
}

pub fn if_(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let condition = c.compile_input(block, "CONDITION")?;
  match condition.constant_value().map(|value| value.to_bool()) {
    Some(true) => c.compile_substack(block, "SUBSTACK"),
    Some(false) => Ok(()),
    None => {
      let skip = c.emit(Op::JumpIfFalse {
        condition: condition.as_boolean(),
        target: 0,
      });
      c.compile_substack(block, "SUBSTACK")?;
      let end = c.here();
      c.patch_jump(skip, end);
      Ok(())
    }
  }
}

pub fn if_else(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let condition = c.compile_input(block, "CONDITION")?;
  let to_else = c.emit(Op::JumpIfFalse {
    condition: condition.as_boolean(),
    target: 0,
  });
  c.compile_substack(block, "SUBSTACK")?;
  let to_end = c.emit(Op::Jump(0));
  let else_start = c.here();
  c.patch_jump(to_else, else_start);
  c.compile_substack(block, "SUBSTACK2")?;
  let end = c.here();
  c.patch_jump(to_end, end);
  Ok(())
}

pub fn repeat(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let times = c.compile_input(block, "TIMES")?;
  let slot = c.alloc_local();
  c.emit(Op::RepeatInit {
    slot,
    times: times.as_number(),
  });
  let head = c.emit(Op::RepeatTest { slot, exit: 0 });
  c.compile_substack(block, "SUBSTACK")?;
  c.loop_yield();
  c.emit(Op::Jump(head));
  let exit = c.here();
  c.patch_jump(head, exit);
  Ok(())
}

/// `repeat until` and `while` differ only in which way the condition
/// exits.
fn conditional_loop(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
  exit_when: bool,
) -> Statement {
  let head = c.here();
  let condition = c.compile_input(block, "CONDITION")?.as_boolean();
  let test = if exit_when {
    c.emit(Op::JumpIfTrue { condition, target: 0 })
  } else {
    c.emit(Op::JumpIfFalse { condition, target: 0 })
  };
  c.compile_substack(block, "SUBSTACK")?;
  c.loop_yield();
  c.emit(Op::Jump(head));
  let exit = c.here();
  c.patch_jump(test, exit);
  Ok(())
}

pub fn repeat_until(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  conditional_loop(c, block, true)
}

pub fn repeat_while(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  conditional_loop(c, block, false)
}

pub fn forever(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let head = c.here();
  c.compile_substack(block, "SUBSTACK")?;
  c.loop_yield();
  c.emit(Op::Jump(head));
  Ok(())
}

pub fn wait_until(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let head = c.here();
  let condition = c.compile_input(block, "CONDITION")?.as_boolean();
  let test = c.emit(Op::JumpIfTrue { condition, target: 0 });
  c.loop_yield();
  c.emit(Op::Jump(head));
  let exit = c.here();
  c.patch_jump(test, exit);
  Ok(())
}

pub fn wait(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let duration = c.compile_input(block, "DURATION")?.as_number();
  c.emit(Op::Wait { duration });
  Ok(())
}

pub fn all_at_once(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  c.compile_substack(block, "SUBSTACK")
}

pub fn stop(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let option = block
    .fields
    .get("STOP_OPTION")
    .map(|field| field.text())
    .unwrap_or_default();
  let option = match option.as_str() {
    "all" => StopOption::All,
    "this script" => StopOption::ThisScript,
    "other scripts in sprite" | "other scripts in stage" => {
      StopOption::OtherScripts
    }
    other => {
      c.emit(Op::Nop(format!("unknown stop option {other:?}")));
      return Ok(());
    }
  };
  c.emit(Op::Stop(option));
  Ok(())
}

pub fn variable(_: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  Ok(CompiledInput::dynamic(Expr::Variable(var_ref(block, "VARIABLE"))))
}

pub fn set_variable(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let value = c.compile_input(block, "VALUE")?.as_unknown();
  c.emit(Op::SetVariable {
    var: var_ref(block, "VARIABLE"),
    value,
  });
  Ok(())
}

pub fn change_variable(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let by = c.compile_input(block, "VALUE")?.as_number();
  c.emit(Op::ChangeVariable {
    var: var_ref(block, "VARIABLE"),
    by,
  });
  Ok(())
}

pub fn list_contents(_: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  Ok(CompiledInput::new(
    Expr::ListContents(var_ref(block, "LIST")),
    InputType::String,
  ))
}

pub fn add_to_list(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let item = c.compile_input(block, "ITEM")?.as_unknown();
  c.emit(Op::AddToList {
    list: var_ref(block, "LIST"),
    item,
  });
  Ok(())
}

pub fn delete_of_list(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let index = c.compile_input(block, "INDEX")?.as_unknown();
  c.emit(Op::DeleteOfList {
    list: var_ref(block, "LIST"),
    index,
  });
  Ok(())
}

pub fn delete_all_of_list(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
) -> Statement {
  c.emit(Op::DeleteAllOfList {
    list: var_ref(block, "LIST"),
  });
  Ok(())
}

pub fn insert_at_list(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let index = c.compile_input(block, "INDEX")?.as_unknown();
  let item = c.compile_input(block, "ITEM")?.as_unknown();
  c.emit(Op::InsertAtList {
    list: var_ref(block, "LIST"),
    index,
    item,
  });
  Ok(())
}

pub fn replace_item_of_list(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
) -> Statement {
  let index = c.compile_input(block, "INDEX")?.as_unknown();
  let item = c.compile_input(block, "ITEM")?.as_unknown();
  c.emit(Op::ReplaceItemOfList {
    list: var_ref(block, "LIST"),
    index,
    item,
  });
  Ok(())
}

pub fn item_of_list(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let index = c.compile_input(block, "INDEX")?.as_unknown();
  Ok(CompiledInput::dynamic(Expr::ListItem(
    var_ref(block, "LIST"),
    Box::new(index),
  )))
}

pub fn item_num_of_list(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let item = c.compile_input(block, "ITEM")?.as_unknown();
  Ok(CompiledInput::new(
    Expr::ListItemNum(var_ref(block, "LIST"), Box::new(item)),
    InputType::AlwaysNumber,
  ))
}

pub fn length_of_list(_: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  Ok(CompiledInput::new(
    Expr::ListLength(var_ref(block, "LIST")),
    InputType::AlwaysNumber,
  ))
}

pub fn list_contains_item(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
) -> Reporter {
  let item = c.compile_input(block, "ITEM")?.as_unknown();
  Ok(CompiledInput::new(
    Expr::ListContains(var_ref(block, "LIST"), Box::new(item)),
    InputType::Boolean,
  ))
}

fn arithmetic(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
  op: Arithmetic,
) -> Reporter {
  let a = c.compile_input(block, "NUM1")?.as_number();
  let b = c.compile_input(block, "NUM2")?.as_number();
  let expr = Expr::Arithmetic(op, Box::new(a), Box::new(b));
  Ok(CompiledInput::folded(expr, InputType::Number))
}

pub fn add(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  arithmetic(c, block, Arithmetic::Add)
}

pub fn subtract(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  arithmetic(c, block, Arithmetic::Subtract)
}

pub fn multiply(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  arithmetic(c, block, Arithmetic::Multiply)
}

pub fn divide(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  arithmetic(c, block, Arithmetic::Divide)
}

pub fn modulo(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  arithmetic(c, block, Arithmetic::Mod)
}

/// Operands both known to be numbers compare numerically; anything else
/// goes through the full comparison rules.
fn comparison(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
  op: Comparison,
) -> Reporter {
  let a = c.compile_input(block, "OPERAND1")?;
  let b = c.compile_input(block, "OPERAND2")?;
  let expr = if a.is_always_number() && b.is_always_number() {
    Expr::NumberCompare(
      op,
      Box::new(a.as_pure_number()),
      Box::new(b.as_pure_number()),
    )
  } else {
    Expr::Compare(op, Box::new(a.as_unknown()), Box::new(b.as_unknown()))
  };
  Ok(CompiledInput::folded(expr, InputType::Boolean))
}

pub fn lt(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  comparison(c, block, Comparison::Lt)
}

pub fn gt(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  comparison(c, block, Comparison::Gt)
}

pub fn equals(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  comparison(c, block, Comparison::Equals)
}

pub fn and(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let a = c.compile_input(block, "OPERAND1")?.as_boolean();
  let b = c.compile_input(block, "OPERAND2")?.as_boolean();
  Ok(CompiledInput::folded(
    Expr::binary(Expr::And, a, b),
    InputType::Boolean,
  ))
}

pub fn or(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let a = c.compile_input(block, "OPERAND1")?.as_boolean();
  let b = c.compile_input(block, "OPERAND2")?.as_boolean();
  Ok(CompiledInput::folded(
    Expr::binary(Expr::Or, a, b),
    InputType::Boolean,
  ))
}

pub fn not(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let a = c.compile_input(block, "OPERAND")?.as_boolean();
  Ok(CompiledInput::folded(
    Expr::Not(Box::new(a)),
    InputType::Boolean,
  ))
}

pub fn random(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let from = c.compile_input(block, "FROM")?.as_unknown();
  let to = c.compile_input(block, "TO")?.as_unknown();
  Ok(CompiledInput::new(
    Expr::binary(Expr::Random, from, to),
    InputType::AlwaysNumber,
  ))
}

pub fn join(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let a = c.compile_input(block, "STRING1")?.as_string();
  let b = c.compile_input(block, "STRING2")?.as_string();
  Ok(CompiledInput::folded(
    Expr::binary(Expr::Join, a, b),
    InputType::String,
  ))
}

pub fn letter_of(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let index = c.compile_input(block, "LETTER")?.as_number();
  let string = c.compile_input(block, "STRING")?.as_string();
  Ok(CompiledInput::folded(
    Expr::binary(Expr::LetterOf, index, string),
    InputType::String,
  ))
}

pub fn length(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let string = c.compile_input(block, "STRING")?.as_string();
  Ok(CompiledInput::folded(
    Expr::Length(Box::new(string)),
    InputType::AlwaysNumber,
  ))
}

pub fn contains(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let a = c.compile_input(block, "STRING1")?.as_string();
  let b = c.compile_input(block, "STRING2")?.as_string();
  Ok(CompiledInput::folded(
    Expr::binary(Expr::Contains, a, b),
    InputType::Boolean,
  ))
}

pub fn round(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let n = c.compile_input(block, "NUM")?.as_number();
  Ok(CompiledInput::folded(
    Expr::Round(Box::new(n)),
    InputType::AlwaysNumber,
  ))
}

pub fn mathop(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  let operator = block
    .fields
    .get("OPERATOR")
    .map(|field| field.text())
    .unwrap_or_default();
  let n = c.compile_input(block, "NUM")?.as_number();
  match MathOp::parse(&operator) {
    Some(op) => Ok(CompiledInput::folded(
      Expr::Math(op, Box::new(n)),
      InputType::Number,
    )),
    None => Ok(CompiledInput::constant(Value::from(0.))),
  }
}

pub fn timer(_: &mut ScriptCompiler<'_>, _: &Block) -> Reporter {
  Ok(CompiledInput::new(Expr::Timer, InputType::AlwaysNumber))
}

fn argument(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
  default: Value,
) -> Reporter {
  let name = block
    .fields
    .get("VALUE")
    .map(|field| field.text())
    .unwrap_or_default();
  if c.has_param(&name) {
    Ok(CompiledInput::dynamic(Expr::Argument { name, default }))
  } else {
    Ok(CompiledInput::constant(default))
  }
}

pub fn argument_string_number(
  c: &mut ScriptCompiler<'_>,
  block: &Block,
) -> Reporter {
  argument(c, block, Value::from(0.))
}

pub fn argument_boolean(c: &mut ScriptCompiler<'_>, block: &Block) -> Reporter {
  argument(c, block, Value::Bool(false))
}

/// Compiles the callee once per mode and binds the arguments by name.
/// Calls without a definition compile to nothing.
pub fn call(c: &mut ScriptCompiler<'_>, block: &Block) -> Statement {
  let Some(proccode) = block
    .mutation
    .as_ref()
    .and_then(|mutation| mutation.proccode.clone())
  else {
    c.emit(Op::Nop("call without a proccode".into()));
    return Ok(());
  };
  let signature = c
    .blocks()
    .get_procedure_signature(&proccode)?
    .unwrap_or(ProcedureSignature {
      names: Vec::new(),
      ids: Vec::new(),
      defaults: Vec::new(),
      warp: false,
    });
  let Some(key) = c.procedure_body(&proccode, &signature)? else {
    c.emit(Op::Nop(format!("{proccode:?} has no definition")));
    return Ok(());
  };
  let mut args = Vec::new();
  for (index, id) in signature.ids.iter().enumerate() {
    let Some(name) = signature.names.get(index) else {
      continue;
    };
    let value = if block.input_block(id).is_some() {
      c.compile_input(block, id)?.as_unknown()
    } else {
      let default = signature.defaults.get(index).cloned();
      Expr::Constant(default.unwrap_or_else(Value::empty))
    };
    args.push((name.clone(), value));
  }
  if c.is_warp() {
    c.emit(Op::YieldIfNeeded);
  } else if c.is_compiling(&key) {
    c.emit(Op::Yield);
  }
  c.emit(Op::Call { key, args });
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::super::{compile, CompileResult};
  use super::*;
  use crate::block::{BlockContainer, Mutation};
  use crate::blocks::{
    BlockLibrary, BlockRegistry, ControlBlocks, DataBlocks, OperatorBlocks,
    ProcedureBlocks,
  };
  use crate::input::Field;

  fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    ControlBlocks::new().register(&mut registry);
    DataBlocks.register(&mut registry);
    OperatorBlocks.register(&mut registry);
    ProcedureBlocks.register(&mut registry);
    registry
  }

  fn number(id: &str, n: &str) -> Block {
    Block::new(id, "math_number").shadow().field("NUM", Field::new(n))
  }

  fn compiled(blocks: Vec<Block>) -> CompileResult {
    let container = BlockContainer::from_blocks(blocks);
    compile(&container, &registry(), "top").unwrap()
  }

  #[test]
  fn constant_arithmetic_folds() {
    let result = compiled(vec![
      Block::new("top", "data_setvariableto")
        .top_level()
        .field("VARIABLE", Field::with_id("x", "v"))
        .input("VALUE", "sum"),
      Block::new("sum", "operator_add")
        .input("NUM1", "a")
        .input("NUM2", "b"),
      number("a", "2"),
      number("b", "3"),
    ]);
    match &result.script.ops[..] {
      [Op::SetVariable { value, .. }] => {
        assert_eq!(value, &Expr::Constant(Value::from(5.)))
      }
      ops => panic!("unexpected ops {ops:?}"),
    }
  }

  #[test]
  fn repeat_loops_end_with_a_yield() {
    let result = compiled(vec![
      Block::new("top", "control_repeat")
        .top_level()
        .input("TIMES", "n")
        .input("SUBSTACK", "body"),
      number("n", "3"),
      Block::new("body", "data_changevariableby")
        .field("VARIABLE", Field::with_id("x", "v"))
        .input("VALUE", "one"),
      number("one", "1"),
    ]);
    let ops = &result.script.ops;
    assert!(matches!(ops[0], Op::RepeatInit { .. }));
    assert!(matches!(ops[1], Op::RepeatTest { exit: 5, .. }));
    assert!(matches!(ops[3], Op::Yield));
    assert!(matches!(ops[4], Op::Jump(1)));
    assert_eq!(result.script.locals, 1);
  }

  #[test]
  fn unknown_opcodes_abort_compilation() {
    let container = BlockContainer::from_blocks([
      Block::new("top", "looks_say").top_level(),
    ]);
    assert!(matches!(
      compile(&container, &registry(), "top"),
      Err(CompileError::UnknownOpcode { .. })
    ));
  }

  #[test]
  fn each_procedure_compiles_once() {
    let prototype = Mutation {
      proccode: Some("step".into()),
      argumentids: Some("[]".into()),
      argumentnames: Some("[]".into()),
      argumentdefaults: Some("[]".into()),
      warp: None,
    };
    let result = compiled(vec![
      Block::new("top", "procedures_call")
        .top_level()
        .mutation(Mutation::procedure("step"))
        .next("again"),
      Block::new("again", "procedures_call")
        .mutation(Mutation::procedure("step")),
      Block::new("def", "procedures_definition")
        .top_level()
        .input("custom_block", "proto")
        .next("recurse"),
      Block::new("proto", "procedures_prototype")
        .shadow()
        .mutation(prototype),
      Block::new("recurse", "procedures_call")
        .mutation(Mutation::procedure("step")),
    ]);
    assert_eq!(result.procedures.len(), 1);
    let body = result.procedures.values().next().unwrap();
    assert!(matches!(body.ops[..], [Op::Yield, Op::Call { .. }]));
    assert!(matches!(
      result.script.ops[..],
      [Op::Call { .. }, Op::Call { .. }]
    ));
  }

  #[test]
  fn headless_calls_compile_to_nothing() {
    let result = compiled(vec![Block::new("top", "procedures_call")
      .top_level()
      .mutation(Mutation::procedure("missing"))]);
    assert!(matches!(result.script.ops[..], [Op::Nop(_)]));
  }
}
