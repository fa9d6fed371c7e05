use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::block::{BlockContainer, BlockId};
use crate::variable::Variable;

pub type TargetId = usize;

/// A sprite or the stage, or a clone of a sprite.
#[derive(Debug)]
pub struct Target {
  pub id: TargetId,
  pub name: String,
  pub is_stage: bool,
  pub is_original: bool,
  /// For clones, the sprite they were cloned from.
  pub original: Option<TargetId>,
  pub blocks: Rc<BlockContainer>,
  pub variables: BTreeMap<String, Variable>,
  pub state: TargetState,
  edge_activated_values: HashMap<BlockId, bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
  pub visible: bool,
  pub x: f64,
  pub y: f64,
  pub size: f64,
  pub direction: f64,
  pub current_costume: usize,
  pub effects: BTreeMap<String, f64>,
}

impl Default for TargetState {
  fn default() -> Self {
    TargetState {
      visible: true,
      x: 0.,
      y: 0.,
      size: 100.,
      direction: 90.,
      current_costume: 0,
      effects: BTreeMap::new(),
    }
  }
}

impl Target {
  pub fn new(name: &str, is_stage: bool, blocks: BlockContainer) -> Self {
    Target {
      id: 0,
      name: name.to_string(),
      is_stage,
      is_original: true,
      original: None,
      blocks: Rc::new(blocks),
      variables: BTreeMap::new(),
      state: TargetState::default(),
      edge_activated_values: HashMap::new(),
    }
  }

  pub fn stage(blocks: BlockContainer) -> Self {
    Target::new("Stage", true, blocks)
  }

  pub fn sprite(name: &str, blocks: BlockContainer) -> Self {
    Target::new(name, false, blocks)
  }

  pub fn with_variable(mut self, variable: Variable) -> Self {
    self.add_variable(variable);
    self
  }

  pub fn add_variable(&mut self, mut variable: Variable) {
    variable.is_local = !self.is_stage;
    self.variables.insert(variable.id.clone(), variable);
  }

  pub fn variable(&self, id: &str) -> Option<&Variable> {
    self.variables.get(id)
  }

  pub fn variable_mut(&mut self, id: &str) -> Option<&mut Variable> {
    self.variables.get_mut(id)
  }

  pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
    self.variables.values().find(|variable| variable.name == name)
  }

  pub fn has_edge_activated_value(&self, block: &str) -> bool {
    self.edge_activated_values.contains_key(block)
  }

  /// Records the latest predicate value of an edge-activated hat and returns
  /// the previous one.
  pub fn update_edge_activated_value(
    &mut self,
    block: BlockId,
    value: bool,
  ) -> Option<bool> {
    self.edge_activated_values.insert(block, value)
  }

  pub fn clear_edge_activated_values(&mut self) {
    self.edge_activated_values.clear();
  }

  /// A clone shares the block container and copies execution state; its
  /// variables are fresh instances with the same ids.
  pub fn make_clone(&self) -> Target {
    Target {
      id: 0,
      name: self.name.clone(),
      is_stage: false,
      is_original: false,
      original: Some(self.original.unwrap_or(self.id)),
      blocks: Rc::clone(&self.blocks),
      variables: self
        .variables
        .iter()
        .filter(|(_, variable)| !variable.is_cloud)
        .map(|(id, variable)| (id.clone(), variable.clone()))
        .collect(),
      state: self.state.clone(),
      edge_activated_values: HashMap::new(),
    }
  }
}
