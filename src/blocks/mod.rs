//! Block libraries and the opcode tables the core dispatches through.
//!
//! The core never looks at a library's concrete type: each library
//! registers primitives (interpreted implementations), hat metadata and,
//! optionally, compiled-code generators.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use derivative::Derivative;

use crate::block::{BlockId, Mutation};
use crate::block_utility::BlockUtility;
use crate::compiler::Generator;
use crate::error::BlockError;
use crate::input::Field;
use crate::promise::Promise;
use crate::value::Value;

pub mod control;
pub mod data;
pub mod event;
pub mod operators;
pub mod procedures;
pub mod sensing;

pub use control::ControlBlocks;
pub use data::DataBlocks;
pub use event::EventBlocks;
pub use operators::OperatorBlocks;
pub use procedures::ProcedureBlocks;
pub use sensing::SensingBlocks;

/// What a primitive hands back.
#[derive(Debug, Clone, Default)]
pub enum Reported {
  #[default]
  Nothing,
  Value(Value),
  /// The value arrives later; the thread waits for it.
  Promise(Promise),
}

impl Reported {
  pub fn into_value(self) -> Option<Value> {
    match self {
      Reported::Value(value) => Some(value),
      _ => None,
    }
  }
}

macro_rules! reported_from {
  ($($source:ty),*) => {
    $(
      impl From<$source> for Reported {
        fn from(value: $source) -> Self {
          Reported::Value(Value::from(value))
        }
      }
    )*
  };
}

reported_from!(f64, usize, bool, String, &str);

impl From<Value> for Reported {
  fn from(value: Value) -> Self {
    Reported::Value(value)
  }
}

pub type Primitive =
  Rc<dyn Fn(&BlockArgs, &mut BlockUtility<'_, '_>) -> Result<Reported, BlockError>>;

/// Resolved arguments of one block invocation: evaluated inputs and the
/// block's own fields.
#[derive(Debug, Clone, Default)]
pub struct BlockArgs {
  pub opcode: String,
  pub block: Option<BlockId>,
  pub mutation: Option<Mutation>,
  values: BTreeMap<String, Value>,
  fields: BTreeMap<String, Field>,
}

impl BlockArgs {
  pub fn new(opcode: &str, block: Option<BlockId>) -> Self {
    BlockArgs {
      opcode: opcode.to_string(),
      block,
      ..Default::default()
    }
  }

  pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.insert(name, value.into());
    self
  }

  pub fn with_field(mut self, name: &str, field: Field) -> Self {
    self.insert_field(name, field);
    self
  }

  pub fn insert(&mut self, name: &str, value: Value) {
    self.values.insert(name.to_string(), value);
  }

  pub fn insert_field(&mut self, name: &str, field: Field) {
    self.values.insert(name.to_string(), field.value.clone());
    self.fields.insert(name.to_string(), field);
  }

  pub fn get_opt(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  /// The argument, or an empty string when the block has no such input.
  pub fn get(&self, name: &str) -> Value {
    self.values.get(name).cloned().unwrap_or_else(Value::empty)
  }

  pub fn number(&self, name: &str) -> f64 {
    self.values.get(name).map_or(0., Value::to_f64)
  }

  pub fn string(&self, name: &str) -> String {
    self
      .values
      .get(name)
      .map(|value| value.to_string())
      .unwrap_or_default()
  }

  pub fn boolean(&self, name: &str) -> bool {
    self.values.get(name).is_some_and(Value::to_bool)
  }

  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.get(name)
  }

  pub(crate) fn into_values(self) -> BTreeMap<String, Value> {
    self.values
  }

  /// `(id, name)` of a variable, list or broadcast field.
  pub fn reference(&self, name: &str) -> Option<(String, String)> {
    let field = self.fields.get(name)?;
    Some((field.id.clone().unwrap_or_default(), field.text()))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HatInfo {
  /// Fires on a false to true transition of its predicate, checked every
  /// frame.
  pub edge_activated: bool,
  /// Triggering the hat again restarts a script that is still running.
  pub restart_existing_threads: bool,
}

/// A pluggable set of blocks.
pub trait BlockLibrary {
  fn name(&self) -> &'static str;

  fn register(&self, registry: &mut BlockRegistry);

  /// Clears library-owned state when the runtime is disposed.
  fn reset(&self) {}
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct BlockRegistry {
  #[derivative(Debug = "ignore")]
  primitives: HashMap<String, Primitive>,
  hats: HashMap<String, HatInfo>,
  #[derivative(Debug = "ignore")]
  generators: HashMap<String, Generator>,
}

impl BlockRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register_primitive(&mut self, opcode: &str, primitive: Primitive) {
    self.primitives.insert(opcode.to_string(), primitive);
  }

  pub fn register_fn<F>(&mut self, opcode: &str, primitive: F)
  where
    F: Fn(&BlockArgs, &mut BlockUtility<'_, '_>) -> Result<Reported, BlockError>
      + 'static,
  {
    self.register_primitive(opcode, Rc::new(primitive));
  }

  pub fn register_hat(&mut self, opcode: &str, hat: HatInfo) {
    self.hats.insert(opcode.to_string(), hat);
  }

  pub fn register_generator(&mut self, opcode: &str, generator: Generator) {
    self.generators.insert(opcode.to_string(), generator);
  }

  pub fn get_opcode_function(&self, opcode: &str) -> Option<Primitive> {
    self.primitives.get(opcode).cloned()
  }

  pub fn get_hat(&self, opcode: &str) -> Option<HatInfo> {
    self.hats.get(opcode).copied()
  }

  pub fn is_hat(&self, opcode: &str) -> bool {
    self.hats.contains_key(opcode)
  }

  /// Hat opcodes the runtime polls every frame, sorted for a stable order.
  pub fn edge_activated_hats(&self) -> Vec<String> {
    let mut hats: Vec<String> = self
      .hats
      .iter()
      .filter(|(_, hat)| hat.edge_activated)
      .map(|(opcode, _)| opcode.clone())
      .collect();
    hats.sort();
    hats
  }

  pub fn get_compiled_fragment_by_opcode(
    &self,
    opcode: &str,
  ) -> Option<Generator> {
    self.generators.get(opcode).copied()
  }
}
