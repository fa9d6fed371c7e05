use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use derivative::Derivative;

use crate::block::BlockId;
use crate::blocks::{
  BlockLibrary, BlockRegistry, ControlBlocks, DataBlocks, EventBlocks,
  OperatorBlocks, ProcedureBlocks, Reported, SensingBlocks,
};
use crate::compiler;
use crate::config::RuntimeConfig;
use crate::error::BlockError;
use crate::execute::execute;
use crate::io::{ClockDevice, IoDevice};
use crate::sequencer::Sequencer;
use crate::target::{Target, TargetId};
use crate::thread::{Thread, ThreadId, ThreadStatus};
use crate::timer::{Clock, SystemClock};
use crate::value::Value;
use crate::variable::Variable;

/// Things embedders may want to react to, collected during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
  ProjectStart,
  ProjectStopAll,
  /// A stack-clicked reporter finished with a value.
  VisualReport { block: BlockId, value: Value },
  /// A monitored reporter changed value.
  MonitorUpdate { block: BlockId, value: Value },
  /// A list changed since its last update.
  ListMonitorUpdate {
    target: TargetId,
    list: String,
    items: Vec<Value>,
  },
  ThreadError {
    thread: ThreadId,
    target: TargetId,
    error: BlockError,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnKind {
  Hat { has_predicate: bool },
  StackClick,
  Monitor,
}

#[derive(Debug, Clone, PartialEq)]
struct Monitor {
  block: BlockId,
  target: TargetId,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Runtime {
  pub config: RuntimeConfig,
  pub(crate) registry: BlockRegistry,
  #[derivative(Debug = "ignore")]
  libraries: Vec<Box<dyn BlockLibrary>>,
  targets: BTreeMap<TargetId, Target>,
  /// Targets in layer order; hats fire from the last one backwards.
  executable_targets: Vec<TargetId>,
  stage: Option<TargetId>,
  next_target_id: TargetId,
  clone_count: usize,
  pub(crate) threads: Vec<Thread>,
  next_thread_id: ThreadId,
  #[derivative(Debug = "ignore")]
  clock: Rc<dyn Clock>,
  /// Timestamp of the current tick, read by everything that times itself.
  pub(crate) current_msecs: f64,
  pub(crate) redraw_requested: bool,
  #[derivative(Debug = "ignore")]
  io_devices: HashMap<String, Box<dyn IoDevice>>,
  monitors: Vec<Monitor>,
  monitor_values: HashMap<BlockId, Value>,
  events: Vec<RuntimeEvent>,
}

impl Default for Runtime {
  fn default() -> Self {
    Self::new(RuntimeConfig::default())
  }
}

impl Runtime {
  pub fn new(config: RuntimeConfig) -> Self {
    Self::with_clock(config, Rc::new(SystemClock::new()))
  }

  /// A runtime with the core block libraries and the clock device.
  pub fn with_clock(config: RuntimeConfig, clock: Rc<dyn Clock>) -> Self {
    let current_msecs = clock.now();
    let mut runtime = Runtime {
      config,
      registry: BlockRegistry::new(),
      libraries: Vec::new(),
      targets: BTreeMap::new(),
      executable_targets: Vec::new(),
      stage: None,
      next_target_id: 0,
      clone_count: 0,
      threads: Vec::new(),
      next_thread_id: 0,
      clock,
      current_msecs,
      redraw_requested: false,
      io_devices: HashMap::new(),
      monitors: Vec::new(),
      monitor_values: HashMap::new(),
      events: Vec::new(),
    };
    runtime.register_library(Box::new(ControlBlocks::new()));
    runtime.register_library(Box::new(DataBlocks));
    runtime.register_library(Box::new(EventBlocks));
    runtime.register_library(Box::new(OperatorBlocks));
    runtime.register_library(Box::new(ProcedureBlocks));
    runtime.register_library(Box::new(SensingBlocks));
    let mut clock_device = ClockDevice::new();
    if let Err(error) = clock_device.query("resetProjectTimer", &[], current_msecs)
    {
      log::error!("could not start the project timer: {error}");
    }
    runtime.register_io_device("clock", Box::new(clock_device));
    runtime
  }

  pub fn register_library(&mut self, library: Box<dyn BlockLibrary>) {
    log::debug!("registering block library {}", library.name());
    library.register(&mut self.registry);
    self.libraries.push(library);
  }

  pub fn register_io_device(&mut self, name: &str, device: Box<dyn IoDevice>) {
    self.io_devices.insert(name.to_string(), device);
  }

  pub fn registry(&self) -> &BlockRegistry {
    &self.registry
  }

  pub fn clock(&self) -> Rc<dyn Clock> {
    Rc::clone(&self.clock)
  }

  pub fn current_msecs(&self) -> f64 {
    self.current_msecs
  }

  pub(crate) fn update_current_msecs(&mut self) {
    self.current_msecs = self.clock.now();
  }

  pub fn request_redraw(&mut self) {
    self.redraw_requested = true;
  }

  pub fn take_events(&mut self) -> Vec<RuntimeEvent> {
    std::mem::take(&mut self.events)
  }

  pub(crate) fn emit(&mut self, event: RuntimeEvent) {
    self.events.push(event);
  }

  // Targets

  pub fn add_target(&mut self, mut target: Target) -> TargetId {
    let id = self.next_target_id;
    self.next_target_id += 1;
    target.id = id;
    if target.is_stage {
      self.stage = Some(id);
      self.executable_targets.insert(0, id);
    } else {
      self.executable_targets.push(id);
    }
    self.targets.insert(id, target);
    id
  }

  pub fn target(&self, id: TargetId) -> Option<&Target> {
    self.targets.get(&id)
  }

  pub fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
    self.targets.get_mut(&id)
  }

  pub fn has_target(&self, id: TargetId) -> bool {
    self.targets.contains_key(&id)
  }

  pub fn stage_id(&self) -> Option<TargetId> {
    self.stage
  }

  /// Target ids in layer order, stage first.
  pub fn executable_targets(&self) -> &[TargetId] {
    &self.executable_targets
  }

  pub fn original_target_by_name(&self, name: &str) -> Option<TargetId> {
    self
      .targets
      .values()
      .find(|target| target.is_original && target.name == name)
      .map(|target| target.id)
  }

  pub fn is_clone(&self, id: TargetId) -> bool {
    self.targets.get(&id).is_some_and(|target| !target.is_original)
  }

  pub fn clone_count(&self) -> usize {
    self.clone_count
  }

  /// Clones `source`, places the clone just behind it and starts its
  /// "when I start as a clone" scripts.
  pub fn create_clone(&mut self, source: TargetId) -> Option<TargetId> {
    let original = self.targets.get(&source)?;
    if original.is_stage {
      return None;
    }
    if self.clone_count >= self.config.max_clones {
      log::warn!("clone limit of {} reached", self.config.max_clones);
      return None;
    }
    let mut clone = original.make_clone();
    let id = self.next_target_id;
    self.next_target_id += 1;
    let position = self
      .executable_targets
      .iter()
      .position(|&target| target == source)
      .unwrap_or(self.executable_targets.len());
    self.executable_targets.insert(position, id);
    clone.id = id;
    self.targets.insert(id, clone);
    self.clone_count += 1;
    self.start_hats("control_start_as_clone", &[], Some(id));
    Some(id)
  }

  /// Removes a target and stops its threads.
  pub fn dispose_target(&mut self, id: TargetId) {
    let Some(target) = self.targets.remove(&id) else {
      return;
    };
    if !target.is_original {
      self.clone_count = self.clone_count.saturating_sub(1);
    }
    if self.stage == Some(id) {
      self.stage = None;
    }
    self.executable_targets.retain(|&target| target != id);
    self.monitors.retain(|monitor| monitor.target != id);
    self.stop_for_target(id, None);
  }

  // Threads

  pub fn threads(&self) -> &[Thread] {
    &self.threads
  }

  pub fn has_thread(&self, id: ThreadId) -> bool {
    self.threads.iter().any(|thread| thread.id == id)
  }

  pub fn is_active_thread(&self, id: ThreadId) -> bool {
    self
      .threads
      .iter()
      .any(|thread| thread.id == id && !thread.is_done())
  }

  /// Waiting on a promise, sleeping until the next tick or not running at
  /// all.
  pub fn is_waiting_thread(&self, id: ThreadId) -> bool {
    match self.threads.iter().find(|thread| thread.id == id) {
      Some(thread) => {
        matches!(
          thread.status,
          ThreadStatus::PromiseWait | ThreadStatus::YieldTick
        ) || thread.status == ThreadStatus::Done
      }
      None => true,
    }
  }

  fn spawn_thread(
    &mut self,
    top_block: &BlockId,
    target: TargetId,
    kind: SpawnKind,
  ) -> Option<Thread> {
    let blocks = Rc::clone(&self.targets.get(&target)?.blocks);
    let id = self.next_thread_id;
    self.next_thread_id += 1;
    let mut thread =
      Thread::new(id, target, top_block.clone(), Rc::clone(&blocks));
    let has_predicate = match kind {
      SpawnKind::StackClick => {
        thread.stack_click = true;
        return Some(thread);
      }
      SpawnKind::Monitor => {
        thread.update_monitor = true;
        return Some(thread);
      }
      SpawnKind::Hat { has_predicate } => has_predicate,
    };
    if self.config.compiler_enabled {
      thread.compiled =
        compiler::compile_cached(&blocks, &self.registry, top_block);
    }
    if !has_predicate {
      thread.enter_compiled();
      return Some(thread);
    }
    let result = execute(&mut Sequencer::new(self), &mut thread);
    if let Err(error) = result {
      self.report_error(&thread, error);
      return None;
    }
    match thread.status {
      ThreadStatus::Done => return None,
      ThreadStatus::PromiseWait => {}
      _ => thread.leave_hat(),
    }
    Some(thread)
  }

  /// Starts a script on `target` as if its hat fired.
  pub fn push_thread(
    &mut self,
    top_block: &str,
    target: TargetId,
  ) -> Option<ThreadId> {
    let top_block = BlockId::from(top_block);
    let opcode = self
      .targets
      .get(&target)?
      .blocks
      .get_opcode(&top_block)?
      .to_string();
    let has_predicate = self.registry.is_hat(&opcode)
      && self.registry.get_opcode_function(&opcode).is_some();
    let thread =
      self.spawn_thread(&top_block, target, SpawnKind::Hat { has_predicate })?;
    let id = thread.id;
    self.threads.push(thread);
    Some(id)
  }

  /// Runs a script clicked in the editor, or stops it when it is already
  /// running. Clicked scripts always run interpreted.
  pub fn toggle_script(
    &mut self,
    top_block: &str,
    target: TargetId,
  ) -> Option<ThreadId> {
    let top_block = BlockId::from(top_block);
    if let Some(thread) = self.threads.iter_mut().find(|thread| {
      thread.target == target && thread.top_block == top_block && !thread.is_done()
    }) {
      thread.retire();
      return None;
    }
    let thread = self.spawn_thread(&top_block, target, SpawnKind::StackClick)?;
    let id = thread.id;
    self.threads.push(thread);
    Some(id)
  }

  /// Starts every script whose hat is `opcode` and whose fields match,
  /// case-insensitively. Returns the threads started.
  pub fn start_hats(
    &mut self,
    opcode: &str,
    match_fields: &[(&str, &str)],
    only_target: Option<TargetId>,
  ) -> Vec<ThreadId> {
    let Some(hat) = self.registry.get_hat(opcode) else {
      log::warn!("{opcode} is not a hat");
      return Vec::new();
    };
    let has_predicate = self.registry.get_opcode_function(opcode).is_some();
    let targets: Vec<TargetId> = match only_target {
      Some(target) => vec![target],
      None => self.executable_targets.iter().rev().copied().collect(),
    };
    let mut started = Vec::new();
    for target in targets {
      let Some(blocks) = self.targets.get(&target).map(|t| Rc::clone(&t.blocks))
      else {
        continue;
      };
      for top_block in blocks.scripts_by_opcode(opcode) {
        let Some(block) = blocks.get_block(&top_block) else {
          continue;
        };
        let fields_match = match_fields.iter().all(|(name, value)| {
          block
            .fields
            .get(*name)
            .is_some_and(|field| field.text().to_uppercase() == value.to_uppercase())
        });
        if !fields_match {
          continue;
        }
        let existing = self.threads.iter().position(|thread| {
          thread.target == target
            && thread.top_block == top_block
            && !thread.stack_click
            && !thread.update_monitor
        });
        if let Some(index) = existing {
          if !hat.restart_existing_threads {
            if !self.threads[index].is_done() {
              continue;
            }
          } else {
            let kind = SpawnKind::Hat { has_predicate };
            if let Some(thread) = self.spawn_thread(&top_block, target, kind) {
              started.push(thread.id);
              match self.threads.get_mut(index) {
                Some(slot) => *slot = thread,
                None => self.threads.push(thread),
              }
            }
            continue;
          }
        }
        let kind = SpawnKind::Hat { has_predicate };
        if let Some(thread) = self.spawn_thread(&top_block, target, kind) {
          started.push(thread.id);
          self.threads.push(thread);
        }
      }
    }
    started
  }

  /// Evaluates an edge-activated hat's predicate result and returns
  /// whether it should fire.
  pub(crate) fn edge_activated(
    &mut self,
    thread: &Thread,
    block: &BlockId,
    value: bool,
  ) -> bool {
    if thread.stack_click {
      return true;
    }
    let Some(target) = self.targets.get_mut(&thread.target) else {
      return false;
    };
    match target.update_edge_activated_value(block.clone(), value) {
      Some(old) => !old && value,
      None => value,
    }
  }

  pub fn green_flag(&mut self) {
    self.stop_all();
    self.emit(RuntimeEvent::ProjectStart);
    let now = self.current_msecs;
    if let Some(clock) = self.io_devices.get_mut("clock") {
      if let Err(error) = clock.query("resetProjectTimer", &[], now) {
        log::warn!("could not reset the project timer: {error}");
      }
    }
    for target in self.targets.values_mut() {
      target.clear_edge_activated_values();
    }
    self.start_hats("event_whenflagclicked", &[], None);
  }

  /// Marks every thread done and removes all clones.
  pub fn stop_all(&mut self) {
    self.emit(RuntimeEvent::ProjectStopAll);
    let clones: Vec<TargetId> = self
      .targets
      .values()
      .filter(|target| !target.is_original)
      .map(|target| target.id)
      .collect();
    for clone in clones {
      self.dispose_target(clone);
    }
    for thread in &mut self.threads {
      thread.retire();
    }
  }

  /// Stops the threads of `target`, except `except`.
  pub fn stop_for_target(
    &mut self,
    target: TargetId,
    except: Option<ThreadId>,
  ) {
    for thread in &mut self.threads {
      if thread.target == target && Some(thread.id) != except {
        thread.retire();
      }
    }
  }

  /// Stops everything and forgets all targets, threads and library state.
  pub fn dispose(&mut self) {
    self.stop_all();
    let targets: Vec<TargetId> = self.targets.keys().copied().collect();
    for target in targets {
      self.dispose_target(target);
    }
    self.threads.clear();
    self.monitors.clear();
    self.monitor_values.clear();
    self.events.clear();
    for library in &self.libraries {
      library.reset();
    }
    for device in self.io_devices.values_mut() {
      device.reset();
    }
  }

  // Monitors

  /// Re-evaluates the reporter `block` of `target` every tick and reports
  /// changes as [`RuntimeEvent::MonitorUpdate`].
  pub fn add_monitor(&mut self, block: &str, target: TargetId) {
    let monitor = Monitor {
      block: block.into(),
      target,
    };
    if !self.monitors.contains(&monitor) {
      self.monitors.push(monitor);
    }
  }

  fn start_monitor_threads(&mut self) {
    for monitor in self.monitors.clone() {
      let running = self.threads.iter().any(|thread| {
        thread.update_monitor
          && thread.top_block == monitor.block
          && thread.target == monitor.target
          && !thread.is_done()
      });
      if running {
        continue;
      }
      if let Some(thread) =
        self.spawn_thread(&monitor.block, monitor.target, SpawnKind::Monitor)
      {
        self.threads.push(thread);
      }
    }
  }

  fn report_finished(&mut self, done: &[Thread]) {
    for thread in done {
      let Some(value) = thread.reported_value.clone() else {
        continue;
      };
      if thread.stack_click {
        self.emit(RuntimeEvent::VisualReport {
          block: thread.top_block.clone(),
          value,
        });
      } else if thread.update_monitor {
        let previous = self.monitor_values.get(&thread.top_block);
        if previous != Some(&value) {
          self
            .monitor_values
            .insert(thread.top_block.clone(), value.clone());
          self.emit(RuntimeEvent::MonitorUpdate {
            block: thread.top_block.clone(),
            value,
          });
        }
      }
    }
    let mut updates = Vec::new();
    for target in self.targets.values_mut() {
      for list in target.variables.values_mut() {
        if list.is_list() && !list.monitor_up_to_date {
          list.monitor_up_to_date = true;
          updates.push(RuntimeEvent::ListMonitorUpdate {
            target: target.id,
            list: list.id.clone(),
            items: list.items().to_vec(),
          });
        }
      }
    }
    self.events.extend(updates);
  }

  /// Runs one frame tick and returns the threads that finished in it.
  pub fn step(&mut self) -> Vec<Thread> {
    self.update_current_msecs();
    self.redraw_requested = false;
    for opcode in self.registry.edge_activated_hats() {
      self.start_hats(&opcode, &[], None);
    }
    self.start_monitor_threads();
    let done = Sequencer::new(self).step_threads();
    self.report_finished(&done);
    done
  }

  // Variables

  fn find_variable(
    &self,
    target: TargetId,
    id: &str,
    name: &str,
    list: bool,
  ) -> Option<(TargetId, String)> {
    let owners = [Some(target), self.stage.filter(|&stage| stage != target)];
    let owners = owners.iter().flatten();
    for owner in owners.clone() {
      let Some(variables) = self.targets.get(owner).map(|t| &t.variables) else {
        continue;
      };
      if variables.contains_key(id) {
        return Some((*owner, id.to_string()));
      }
    }
    for owner in owners {
      let Some(variables) = self.targets.get(owner).map(|t| &t.variables) else {
        continue;
      };
      if let Some(variable) = variables
        .values()
        .find(|variable| variable.name == name && variable.is_list() == list)
      {
        return Some((*owner, variable.id.clone()));
      }
    }
    None
  }

  fn lookup_or_create(
    &mut self,
    target: TargetId,
    id: &str,
    name: &str,
    list: bool,
  ) -> Result<&mut Variable, BlockError> {
    let (owner, id) = match self.find_variable(target, id, name, list) {
      Some(found) => found,
      None => {
        let owner = self
          .targets
          .get_mut(&target)
          .ok_or(BlockError::MissingTarget(target))?;
        let variable = if list {
          Variable::list(id, name, Vec::new())
        } else {
          Variable::scalar(id, name, 0.)
        };
        let kind = if list { "list" } else { "variable" };
        log::debug!("creating {kind} {name:?} on {}", owner.name);
        owner.add_variable(variable);
        (target, id.to_string())
      }
    };
    self
      .targets
      .get_mut(&owner)
      .and_then(|owner| owner.variable_mut(&id))
      .ok_or(BlockError::MissingTarget(owner))
  }

  /// Finds a variable by id, then by name, on the target and then on the
  /// stage. Creates it on the target when neither has it.
  pub fn lookup_or_create_variable(
    &mut self,
    target: TargetId,
    id: &str,
    name: &str,
  ) -> Result<&mut Variable, BlockError> {
    self.lookup_or_create(target, id, name, false)
  }

  pub fn lookup_or_create_list(
    &mut self,
    target: TargetId,
    id: &str,
    name: &str,
  ) -> Result<&mut Variable, BlockError> {
    self.lookup_or_create(target, id, name, true)
  }

  /// Sets a variable, forwarding cloud variables to the cloud device when
  /// one is registered.
  pub fn set_variable(
    &mut self,
    target: TargetId,
    id: &str,
    name: &str,
    value: Value,
  ) -> Result<(), BlockError> {
    let variable = self.lookup_or_create_variable(target, id, name)?;
    variable.set(value.clone());
    let cloud = variable
      .is_cloud
      .then(|| Value::from(variable.name.as_str()));
    if let Some(name) = cloud {
      if self.io_devices.contains_key("cloud") {
        self.io_query("cloud", "requestUpdateVariable", &[name, value])?;
      }
    }
    Ok(())
  }

  pub fn io_query(
    &mut self,
    device: &str,
    function: &str,
    args: &[Value],
  ) -> Result<Reported, BlockError> {
    let now = self.current_msecs;
    let device_impl = self
      .io_devices
      .get_mut(device)
      .ok_or_else(|| BlockError::UnknownDevice(device.to_string()))?;
    device_impl.query(function, args, now)
  }

  pub(crate) fn report_error(&mut self, thread: &Thread, error: BlockError) {
    log::error!("thread {} stopped: {error}", thread.id);
    self.emit(RuntimeEvent::ThreadError {
      thread: thread.id,
      target: thread.target,
      error,
    });
  }
}
