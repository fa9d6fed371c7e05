use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::Deserialize;

use crate::compiler::CompileResult;
use crate::error::CompileError;
use crate::input::{Field, Input};
use crate::value::Value;

pub type BlockId = Rc<str>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
  pub id: BlockId,
  pub opcode: String,
  #[serde(default)]
  pub next: Option<BlockId>,
  #[serde(default)]
  pub parent: Option<BlockId>,
  #[serde(default)]
  pub inputs: BTreeMap<String, Input>,
  #[serde(default)]
  pub fields: BTreeMap<String, Field>,
  #[serde(default)]
  pub mutation: Option<Mutation>,
  #[serde(default)]
  pub shadow: bool,
  #[serde(default)]
  pub top_level: bool,
}

impl Block {
  pub fn new(id: &str, opcode: &str) -> Self {
    Block {
      id: id.into(),
      opcode: opcode.to_string(),
      next: None,
      parent: None,
      inputs: BTreeMap::new(),
      fields: BTreeMap::new(),
      mutation: None,
      shadow: false,
      top_level: false,
    }
  }

  pub fn top_level(mut self) -> Self {
    self.top_level = true;
    self
  }

  pub fn shadow(mut self) -> Self {
    self.shadow = true;
    self
  }

  pub fn next(mut self, id: &str) -> Self {
    self.next = Some(id.into());
    self
  }

  pub fn parent(mut self, id: &str) -> Self {
    self.parent = Some(id.into());
    self
  }

  pub fn input(mut self, name: &str, block: &str) -> Self {
    self
      .inputs
      .insert(name.to_string(), Input::new(Some(block.into()), None));
    self
  }

  pub fn field(mut self, name: &str, field: Field) -> Self {
    self.fields.insert(name.to_string(), field);
    self
  }

  pub fn mutation(mut self, mutation: Mutation) -> Self {
    self.mutation = Some(mutation);
    self
  }

  /// The block plugged into input `name`, or its shadow when the slot is
  /// empty.
  pub fn input_block(&self, name: &str) -> Option<&BlockId> {
    let input = self.inputs.get(name)?;
    input.block.as_ref().or(input.shadow.as_ref())
  }
}

/// Extra data attached to procedure blocks. The argument lists are JSON
/// encoded arrays, as in saved projects.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Mutation {
  #[serde(default)]
  pub proccode: Option<String>,
  #[serde(default)]
  pub argumentids: Option<String>,
  #[serde(default)]
  pub argumentnames: Option<String>,
  #[serde(default)]
  pub argumentdefaults: Option<String>,
  #[serde(default)]
  pub warp: Option<serde_json::Value>,
}

impl Mutation {
  pub fn procedure(proccode: &str) -> Self {
    Mutation {
      proccode: Some(proccode.to_string()),
      ..Default::default()
    }
  }

  pub fn is_warp(&self) -> bool {
    match &self.warp {
      Some(serde_json::Value::Bool(warp)) => *warp,
      Some(serde_json::Value::String(warp)) => warp == "true",
      _ => false,
    }
  }

  pub fn argument_ids(&self) -> Result<Vec<String>, serde_json::Error> {
    parse_list(&self.argumentids)
  }

  pub fn argument_names(&self) -> Result<Vec<String>, serde_json::Error> {
    parse_list(&self.argumentnames)
  }

  pub fn argument_defaults(&self) -> Result<Vec<Value>, serde_json::Error> {
    parse_list(&self.argumentdefaults)
  }
}

fn parse_list<T: for<'de> Deserialize<'de>>(
  json: &Option<String>,
) -> Result<Vec<T>, serde_json::Error> {
  match json {
    Some(json) => serde_json::from_str(json),
    None => Ok(Vec::new()),
  }
}

/// Parameter shape of a custom block, read from its prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureSignature {
  pub names: Vec<String>,
  pub ids: Vec<String>,
  pub defaults: Vec<Value>,
  pub warp: bool,
}

type CompiledEntry = Result<Rc<CompileResult>, CompileError>;

#[derive(Debug, Default)]
struct BlockCache {
  procedure_definitions: HashMap<String, Option<BlockId>>,
  procedure_signatures:
    HashMap<String, Result<Option<ProcedureSignature>, CompileError>>,
  compiled: HashMap<BlockId, CompiledEntry>,
}

/// All blocks of one target. Clones share their original's container.
#[derive(Debug, Default)]
pub struct BlockContainer {
  blocks: HashMap<BlockId, Block>,
  scripts: Vec<BlockId>,
  cache: RefCell<BlockCache>,
}

impl BlockContainer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
    let mut container = Self::new();
    for block in blocks {
      container.create_block(block);
    }
    container
  }

  pub fn create_block(&mut self, block: Block) {
    if block.top_level && !self.scripts.contains(&block.id) {
      self.scripts.push(block.id.clone());
    }
    self.blocks.insert(block.id.clone(), block);
    self.reset_cache();
  }

  fn reset_cache(&self) {
    *self.cache.borrow_mut() = BlockCache::default();
  }

  pub fn get_block(&self, id: &str) -> Option<&Block> {
    self.blocks.get(id)
  }

  pub fn get_opcode(&self, id: &str) -> Option<&str> {
    self.blocks.get(id).map(|block| block.opcode.as_str())
  }

  pub fn get_next_block(&self, id: &str) -> Option<BlockId> {
    self.blocks.get(id).and_then(|block| block.next.clone())
  }

  /// The first block of the `branch_num`th substack (1-based).
  pub fn get_branch(&self, id: &str, branch_num: usize) -> Option<BlockId> {
    let block = self.blocks.get(id)?;
    let name = branch_input_name(branch_num);
    block.input_block(&name).cloned()
  }

  pub fn get_top_level_script(&self, id: &str) -> Option<BlockId> {
    let mut block = self.blocks.get(id)?;
    while let Some(parent) = block.parent.as_ref() {
      match self.blocks.get(parent) {
        Some(parent) => block = parent,
        None => break,
      }
    }
    Some(block.id.clone())
  }

  /// Top-level scripts in creation order.
  pub fn scripts(&self) -> &[BlockId] {
    &self.scripts
  }

  pub fn scripts_by_opcode(&self, opcode: &str) -> Vec<BlockId> {
    self
      .scripts
      .iter()
      .filter(|id| self.get_opcode(id) == Some(opcode))
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  fn custom_block_internal(&self, definition: &Block) -> Option<&Block> {
    let prototype = definition.input_block("custom_block")?;
    self.blocks.get(prototype)
  }

  pub fn get_procedure_definition(&self, proccode: &str) -> Option<BlockId> {
    if let Some(cached) =
      self.cache.borrow().procedure_definitions.get(proccode)
    {
      return cached.clone();
    }
    let found = self
      .blocks
      .values()
      .filter(|block| block.opcode == "procedures_definition")
      .find(|block| {
        self
          .custom_block_internal(block)
          .and_then(|internal| internal.mutation.as_ref())
          .and_then(|mutation| mutation.proccode.as_deref())
          == Some(proccode)
      })
      .map(|block| block.id.clone());
    self
      .cache
      .borrow_mut()
      .procedure_definitions
      .insert(proccode.to_string(), found.clone());
    found
  }

  /// Parameter names, ids and defaults of a custom block, read from its
  /// prototype. `Ok(None)` when no prototype declares `proccode`.
  pub fn get_procedure_signature(
    &self,
    proccode: &str,
  ) -> Result<Option<ProcedureSignature>, CompileError> {
    if let Some(cached) = self.cache.borrow().procedure_signatures.get(proccode)
    {
      return cached.clone();
    }
    let prototype = self.blocks.values().find(|block| {
      block.opcode == "procedures_prototype"
        && block
          .mutation
          .as_ref()
          .and_then(|mutation| mutation.proccode.as_deref())
          == Some(proccode)
    });
    let signature = match prototype {
      None => Ok(None),
      Some(prototype) => {
        read_signature(prototype).map(Some).map_err(|error| {
          CompileError::MalformedMutation {
            block: prototype.id.clone(),
            reason: error.to_string(),
          }
        })
      }
    };
    self
      .cache
      .borrow_mut()
      .procedure_signatures
      .insert(proccode.to_string(), signature.clone());
    signature
  }

  pub fn compiled(&self, top_block: &str) -> Option<CompiledEntry> {
    self.cache.borrow().compiled.get(top_block).cloned()
  }

  /// Stores the compile result for a script, replacing any earlier one.
  pub fn store_compiled(&self, top_block: BlockId, entry: CompiledEntry) {
    self.cache.borrow_mut().compiled.insert(top_block, entry);
  }
}

/// Inputs that hold a stack of blocks rather than a reporter.
pub fn is_stack_input(name: &str) -> bool {
  name == "custom_block" || name.starts_with("SUBSTACK")
}

pub fn branch_input_name(branch_num: usize) -> String {
  if branch_num <= 1 {
    "SUBSTACK".to_string()
  } else {
    format!("SUBSTACK{branch_num}")
  }
}

fn read_signature(
  prototype: &Block,
) -> Result<ProcedureSignature, serde_json::Error> {
  let mutation = prototype.mutation.clone().unwrap_or_default();
  Ok(ProcedureSignature {
    names: mutation.argument_names()?,
    ids: mutation.argument_ids()?,
    defaults: mutation.argument_defaults()?,
    warp: mutation.is_warp(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn procedure_blocks(argumentnames: &str) -> BlockContainer {
    BlockContainer::from_blocks([
      Block::new("def", "procedures_definition")
        .top_level()
        .input("custom_block", "proto")
        .next("body"),
      Block::new("proto", "procedures_prototype")
        .shadow()
        .parent("def")
        .mutation(Mutation {
          proccode: Some("jump %s".into()),
          argumentids: Some(r#"["a1"]"#.into()),
          argumentnames: Some(argumentnames.into()),
          argumentdefaults: Some(r#"[""]"#.into()),
          warp: Some(serde_json::Value::String("true".into())),
        }),
      Block::new("body", "control_wait").parent("def"),
    ])
  }

  #[test]
  fn finds_procedure_definitions() {
    let blocks = procedure_blocks(r#"["height"]"#);
    assert_eq!(blocks.get_procedure_definition("jump %s"), Some("def".into()));
    assert_eq!(blocks.get_procedure_definition("fall"), None);
    let signature = blocks.get_procedure_signature("jump %s").unwrap().unwrap();
    assert_eq!(signature.names, vec!["height".to_string()]);
    assert_eq!(signature.ids, vec!["a1".to_string()]);
    assert!(signature.warp);
    assert_eq!(blocks.get_top_level_script("body"), Some("def".into()));
  }

  #[test]
  fn malformed_argument_lists_are_reported() {
    let blocks = procedure_blocks("[height");
    assert!(matches!(
      blocks.get_procedure_signature("jump %s"),
      Err(CompileError::MalformedMutation { .. })
    ));
  }

  #[test]
  fn branches_by_number() {
    let blocks = BlockContainer::from_blocks([Block::new("if", "control_if_else")
      .input("SUBSTACK", "a")
      .input("SUBSTACK2", "b")]);
    assert_eq!(blocks.get_branch("if", 1), Some("a".into()));
    assert_eq!(blocks.get_branch("if", 2), Some("b".into()));
    assert_eq!(blocks.get_branch("if", 3), None);
  }
}
