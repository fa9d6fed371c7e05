//! Loads a project from its plain block-graph JSON: a list of targets, each
//! with its variables, lists and the flat list of its blocks.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::block::{Block, BlockContainer};
use crate::error::LoadError;
use crate::runtime::Runtime;
use crate::target::{Target, TargetId, TargetState};
use crate::value::Value;
use crate::variable::Variable;

#[derive(Debug, Deserialize)]
pub struct Project {
  pub targets: Vec<TargetJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetJson {
  #[serde(default = "default_false")]
  is_stage: bool,
  name: String,
  #[serde(default)]
  variables: BTreeMap<String, VariableJson>,
  #[serde(default)]
  lists: BTreeMap<String, ListJson>,
  #[serde(default)]
  broadcasts: BTreeMap<String, String>,
  #[serde(default)]
  blocks: Vec<Block>,
  #[serde(default = "default_true")]
  visible: bool,
  #[serde(default = "default_f64")]
  x: f64,
  #[serde(default = "default_f64")]
  y: f64,
  #[serde(default = "default_size")]
  size: f64,
  #[serde(default = "default_direction")]
  direction: f64,
  #[serde(default)]
  current_costume: usize,
}

fn default_true() -> bool {
  true
}

fn default_false() -> bool {
  false
}

fn default_f64() -> f64 {
  0.
}

fn default_size() -> f64 {
  100.
}

fn default_direction() -> f64 {
  90.
}

/// `[name, value]`, or `[name, value, true]` for cloud variables.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VariableJson {
  Cloud(String, Value, bool),
  Plain(String, Value),
}

/// `[name, items]`.
#[derive(Debug, Deserialize)]
struct ListJson(String, Vec<Value>);

impl TargetJson {
  fn into_target(self) -> Target {
    let blocks = BlockContainer::from_blocks(self.blocks);
    let mut target = Target::new(&self.name, self.is_stage, blocks);
    target.state = TargetState {
      visible: self.visible,
      x: self.x,
      y: self.y,
      size: self.size,
      direction: self.direction,
      current_costume: self.current_costume,
      ..TargetState::default()
    };
    for (id, variable) in self.variables {
      let variable = match variable {
        VariableJson::Cloud(name, value, is_cloud) => {
          let mut variable = Variable::scalar(&id, &name, value);
          variable.is_cloud = is_cloud;
          variable
        }
        VariableJson::Plain(name, value) => Variable::scalar(&id, &name, value),
      };
      target.add_variable(variable);
    }
    for (id, ListJson(name, items)) in self.lists {
      target.add_variable(Variable::list(&id, &name, items));
    }
    for (id, name) in self.broadcasts {
      target.add_variable(Variable::broadcast(&id, &name));
    }
    target
  }
}

impl Project {
  pub fn parse(json: &str) -> Result<Self, LoadError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Adds the project's targets to `runtime`, stage first, and returns
  /// their ids in file order.
  pub fn install(
    self,
    runtime: &mut Runtime,
  ) -> Result<Vec<TargetId>, LoadError> {
    let Some(stage) = self.targets.iter().position(|target| target.is_stage)
    else {
      return Err(LoadError::MissingStage);
    };
    let mut targets: Vec<Option<TargetJson>> =
      self.targets.into_iter().map(Some).collect();
    let mut ids = vec![0; targets.len()];
    let order = std::iter::once(stage)
      .chain((0..targets.len()).filter(|&index| index != stage));
    for index in order {
      if let Some(target) = targets[index].take() {
        log::debug!("loading target {}", target.name);
        ids[index] = runtime.add_target(target.into_target());
      }
    }
    Ok(ids)
  }
}

pub fn load_project(path: impl AsRef<Path>) -> Result<Project, LoadError> {
  let file = File::open(path)?;
  Ok(serde_json::from_reader(BufReader::new(file))?)
}
