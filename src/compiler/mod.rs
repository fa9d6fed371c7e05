//! Compiles block stacks into resumable instruction lists.
//!
//! Blocks with a registered [`Generator`] are lowered directly; any other
//! block with a primitive is called through the compatibility layer. A
//! script that cannot be compiled runs on the interpreter instead.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::block::{
  branch_input_name, is_stack_input, Block, BlockContainer, BlockId,
  ProcedureSignature,
};
use crate::blocks::BlockRegistry;
use crate::cast;
use crate::error::CompileError;
use crate::value::Value;

pub mod generator;
mod input;
mod ir;
pub(crate) mod runner;

pub use input::{CompiledInput, InputType};
pub use ir::{
  CompatCall, CompiledScript, ConstantEnv, Expr, ExprEnv, Op, ProcedureKey,
  StopOption, VarRef,
};

type StatementFn =
  fn(&mut ScriptCompiler<'_>, &Block) -> Result<(), CompileError>;
type ReporterFn =
  fn(&mut ScriptCompiler<'_>, &Block) -> Result<CompiledInput, CompileError>;

/// Lowers one opcode to compiled code.
#[derive(Clone, Copy)]
pub enum Generator {
  /// A stack block; emits instructions.
  Statement(StatementFn),
  /// A reporter; returns the expression for its value, emitting any
  /// instructions it needs to run first.
  Reporter(ReporterFn),
}

impl fmt::Debug for Generator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Generator::Statement(_) => write!(f, "Generator::Statement"),
      Generator::Reporter(_) => write!(f, "Generator::Reporter"),
    }
  }
}

/// A compiled script plus every procedure body it can reach.
#[derive(Debug)]
pub struct CompileResult {
  pub script: Rc<CompiledScript>,
  pub procedures: HashMap<ProcedureKey, Rc<CompiledScript>>,
}

/// Procedure bodies compiled so far. `None` while a body is being
/// compiled, which is how recursive calls are recognised.
type ProcedureTable = HashMap<ProcedureKey, Option<Rc<CompiledScript>>>;

const LITERAL_NUMBERS: [&str; 5] = [
  "math_number",
  "math_positive_number",
  "math_whole_number",
  "math_integer",
  "math_angle",
];

pub struct ScriptCompiler<'a> {
  blocks: &'a BlockContainer,
  registry: &'a BlockRegistry,
  procedures: &'a mut ProcedureTable,
  ops: Vec<Op>,
  locals: usize,
  warp: bool,
  params: Vec<String>,
}

impl<'a> ScriptCompiler<'a> {
  fn new(
    blocks: &'a BlockContainer,
    registry: &'a BlockRegistry,
    procedures: &'a mut ProcedureTable,
    warp: bool,
    params: Vec<String>,
  ) -> Self {
    ScriptCompiler {
      blocks,
      registry,
      procedures,
      ops: Vec::new(),
      locals: 0,
      warp,
      params,
    }
  }

  fn finish(self, name: String) -> CompiledScript {
    CompiledScript {
      name,
      ops: self.ops,
      locals: self.locals,
      warp: self.warp,
    }
  }

  pub fn blocks(&self) -> &'a BlockContainer {
    self.blocks
  }

  pub fn is_warp(&self) -> bool {
    self.warp
  }

  pub fn has_param(&self, name: &str) -> bool {
    self.params.iter().any(|param| param == name)
  }

  /// Appends an instruction and returns its index.
  pub fn emit(&mut self, op: Op) -> usize {
    self.ops.push(op);
    self.ops.len() - 1
  }

  /// Index the next instruction will get.
  pub fn here(&self) -> usize {
    self.ops.len()
  }

  /// Points the jump at `at` to `target`.
  pub fn patch_jump(&mut self, at: usize, target: usize) {
    match &mut self.ops[at] {
      Op::Jump(to)
      | Op::JumpIfFalse { target: to, .. }
      | Op::JumpIfTrue { target: to, .. }
      | Op::RepeatTest { exit: to, .. } => *to = target,
      op => log::error!("instruction @{at} is not a jump: {op}"),
    }
  }

  pub fn alloc_local(&mut self) -> usize {
    self.locals += 1;
    self.locals - 1
  }

  /// The suspend at the end of a loop body.
  pub fn loop_yield(&mut self) {
    if self.warp {
      self.emit(Op::YieldIfNeeded);
    } else {
      self.emit(Op::Yield);
    }
  }

  pub fn compile_stack(
    &mut self,
    first: Option<&BlockId>,
  ) -> Result<(), CompileError> {
    let mut current = first.cloned();
    while let Some(id) = current {
      let block = self.block(&id)?;
      self.compile_block(block)?;
      current = block.next.clone();
    }
    Ok(())
  }

  pub fn compile_substack(
    &mut self,
    block: &Block,
    name: &str,
  ) -> Result<(), CompileError> {
    self.compile_stack(block.input_block(name))
  }

  fn block(&self, id: &str) -> Result<&'a Block, CompileError> {
    self
      .blocks
      .get_block(id)
      .ok_or_else(|| CompileError::MissingBlock(id.into()))
  }

  fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
    match self.registry.get_compiled_fragment_by_opcode(&block.opcode) {
      Some(Generator::Statement(generate)) => generate(self, block),
      Some(Generator::Reporter(generate)) => {
        generate(self, block)?;
        Ok(())
      }
      None if self.registry.get_opcode_function(&block.opcode).is_some() => {
        self.compat(block, None)
      }
      None if self.registry.is_hat(&block.opcode) => Ok(()),
      None => Err(CompileError::UnknownOpcode {
        opcode: block.opcode.clone(),
      }),
    }
  }

  /// Compiles the block plugged into input `name`. An empty input reads as
  /// an empty string.
  pub fn compile_input(
    &mut self,
    block: &Block,
    name: &str,
  ) -> Result<CompiledInput, CompileError> {
    match block.input_block(name) {
      Some(id) => {
        let input = self.block(id)?;
        self.compile_reporter(input)
      }
      None => Ok(CompiledInput::constant(Value::empty())),
    }
  }

  fn compile_reporter(
    &mut self,
    block: &Block,
  ) -> Result<CompiledInput, CompileError> {
    let opcode = block.opcode.as_str();
    if LITERAL_NUMBERS.contains(&opcode) {
      let value = literal(block, "NUM");
      return Ok(CompiledInput::constant(number_literal(value)));
    }
    match opcode {
      "text" => return Ok(CompiledInput::constant(literal(block, "TEXT"))),
      "colour_picker" => {
        return Ok(CompiledInput::constant(literal(block, "COLOUR")))
      }
      _ => {}
    }
    match self.registry.get_compiled_fragment_by_opcode(opcode) {
      Some(Generator::Reporter(generate)) => return generate(self, block),
      Some(Generator::Statement(_)) => {
        return Err(CompileError::UnknownOpcode {
          opcode: opcode.to_string(),
        })
      }
      None => {}
    }
    if self.registry.get_opcode_function(opcode).is_some() {
      let slot = self.alloc_local();
      self.compat(block, Some(slot))?;
      return Ok(CompiledInput::dynamic(Expr::Local(slot)));
    }
    match block.fields.values().next() {
      Some(field) if block.fields.len() == 1 && block.inputs.is_empty() => {
        Ok(CompiledInput::constant(field.value.clone()))
      }
      _ => Err(CompileError::UnknownOpcode {
        opcode: opcode.to_string(),
      }),
    }
  }

  /// Calls the block's primitive at run time, with its substacks compiled
  /// into separate fragments.
  fn compat(
    &mut self,
    block: &Block,
    dest: Option<usize>,
  ) -> Result<(), CompileError> {
    let mut args = Vec::new();
    for name in block.inputs.keys() {
      if is_stack_input(name) {
        continue;
      }
      let input = self.compile_input(block, name)?;
      args.push((name.clone(), input.as_unknown()));
    }
    let mut branches = Vec::new();
    let mut branch_num = 1;
    while let Some(input) = block.inputs.get(&branch_input_name(branch_num)) {
      let name = format!("{} branch {branch_num}", block.opcode);
      branches.push(self.compile_fragment(input.block.as_ref(), name)?);
      branch_num += 1;
    }
    self.emit(Op::Compat(Box::new(CompatCall {
      opcode: block.opcode.clone(),
      block: block.id.clone(),
      args,
      fields: block.fields.clone(),
      mutation: block.mutation.clone(),
      branches,
      dest,
    })));
    Ok(())
  }

  fn compile_fragment(
    &mut self,
    first: Option<&BlockId>,
    name: String,
  ) -> Result<Option<Rc<CompiledScript>>, CompileError> {
    let Some(first) = first else {
      return Ok(None);
    };
    let mut fragment = ScriptCompiler::new(
      self.blocks,
      self.registry,
      &mut *self.procedures,
      self.warp,
      self.params.clone(),
    );
    fragment.compile_stack(Some(first))?;
    Ok(Some(Rc::new(fragment.finish(name))))
  }

  /// Compiles the body of `proccode` for the given mode, once per mode.
  /// `Ok(None)` when the procedure has no definition.
  pub fn procedure_body(
    &mut self,
    proccode: &str,
    signature: &ProcedureSignature,
  ) -> Result<Option<ProcedureKey>, CompileError> {
    let Some(definition) = self.blocks.get_procedure_definition(proccode)
    else {
      return Ok(None);
    };
    let key = ProcedureKey {
      proccode: proccode.to_string(),
      warp: self.warp || signature.warp,
    };
    if self.procedures.contains_key(&key) {
      return Ok(Some(key));
    }
    self.procedures.insert(key.clone(), None);
    let definition = self.block(&definition)?;
    let script = {
      let mut body = ScriptCompiler::new(
        self.blocks,
        self.registry,
        &mut *self.procedures,
        key.warp,
        signature.names.clone(),
      );
      body.compile_stack(definition.next.as_ref())?;
      body.finish(format!("procedure {proccode:?}"))
    };
    log::trace!("{script}");
    self.procedures.insert(key.clone(), Some(Rc::new(script)));
    Ok(Some(key))
  }

  /// Whether the body for `key` is still being compiled, i.e. the call is
  /// recursive.
  pub fn is_compiling(&self, key: &ProcedureKey) -> bool {
    matches!(self.procedures.get(key), Some(None))
  }
}

fn literal(block: &Block, field: &str) -> Value {
  block
    .fields
    .get(field)
    .map_or_else(Value::empty, |field| field.value.clone())
}

/// Number fields hold what was typed; keep text that is not a number.
fn number_literal(value: Value) -> Value {
  match value {
    Value::String(text) => {
      let n = cast::parse_number(&text);
      if n.is_nan() || cast::is_white_space(&Value::String(text.clone())) {
        Value::String(text)
      } else {
        Value::Number(n)
      }
    }
    other => other,
  }
}

/// Compiles the script starting at `top_block`, skipping its hat.
pub fn compile(
  blocks: &BlockContainer,
  registry: &BlockRegistry,
  top_block: &str,
) -> Result<CompileResult, CompileError> {
  let mut first = Some(BlockId::from(top_block));
  while let Some(id) = first.clone() {
    let block = blocks
      .get_block(&id)
      .ok_or_else(|| CompileError::MissingBlock(id.clone()))?;
    if registry.is_hat(&block.opcode) || block.opcode == "procedures_definition"
    {
      first = block.next.clone();
    } else {
      break;
    }
  }
  let mut procedures = ProcedureTable::new();
  let script = {
    let mut compiler =
      ScriptCompiler::new(blocks, registry, &mut procedures, false, Vec::new());
    compiler.compile_stack(first.as_ref())?;
    compiler.finish(format!("script {top_block:?}"))
  };
  log::trace!("{script}");
  let procedures = procedures
    .into_iter()
    .filter_map(|(key, body)| body.map(|body| (key, body)))
    .collect();
  Ok(CompileResult {
    script: Rc::new(script),
    procedures,
  })
}

/// Compiles a script once per block container. Failures are remembered
/// too, so a script that does not compile is not retried.
pub fn compile_cached(
  blocks: &BlockContainer,
  registry: &BlockRegistry,
  top_block: &BlockId,
) -> Option<Rc<CompileResult>> {
  if let Some(entry) = blocks.compiled(top_block) {
    return entry.ok();
  }
  let entry = compile(blocks, registry, top_block).map(Rc::new);
  match &entry {
    Ok(result) => log::debug!(
      "compiled script {top_block} ({} procedures)",
      result.procedures.len()
    ),
    Err(error) => {
      log::warn!("script {top_block} runs interpreted: {error}")
    }
  }
  blocks.store_compiled(top_block.clone(), entry.clone());
  entry.ok()
}
