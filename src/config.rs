use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::LoadError;
use crate::variable::DEFAULT_LIST_ITEM_LIMIT;

fn default_frame_rate() -> f64 {
  30.
}

fn default_work_time_ratio() -> f64 {
  0.75
}

fn default_warp_time() -> f64 {
  500.
}

fn default_list_item_limit() -> usize {
  DEFAULT_LIST_ITEM_LIMIT
}

fn default_max_clones() -> usize {
  300
}

fn default_true() -> bool {
  true
}

fn default_false() -> bool {
  false
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
  #[serde(default = "default_frame_rate")]
  pub frame_rate: f64,
  /// Share of a frame the sequencer may spend stepping threads.
  #[serde(default = "default_work_time_ratio")]
  pub work_time_ratio: f64,
  /// Milliseconds a warp-mode thread may run before it must yield.
  #[serde(default = "default_warp_time")]
  pub warp_time: f64,
  #[serde(default = "default_list_item_limit")]
  pub list_item_limit: usize,
  #[serde(default = "default_max_clones")]
  pub max_clones: usize,
  #[serde(default = "default_true")]
  pub compiler_enabled: bool,
  /// Keep stepping after a redraw request instead of ending the tick.
  #[serde(default = "default_false")]
  pub turbo_mode: bool,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    RuntimeConfig {
      frame_rate: default_frame_rate(),
      work_time_ratio: default_work_time_ratio(),
      warp_time: default_warp_time(),
      list_item_limit: default_list_item_limit(),
      max_clones: default_max_clones(),
      compiler_enabled: default_true(),
      turbo_mode: default_false(),
    }
  }
}

impl RuntimeConfig {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
  }

  /// Milliseconds between ticks.
  pub fn frame_interval(&self) -> f64 {
    1000. / self.frame_rate
  }

  /// Milliseconds of thread stepping allowed per tick.
  pub fn work_time(&self) -> f64 {
    self.frame_interval() * self.work_time_ratio
  }
}
