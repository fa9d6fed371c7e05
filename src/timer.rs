use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic millisecond source.
pub trait Clock {
  fn now(&self) -> f64;
}

pub struct SystemClock {
  origin: Instant,
}

impl SystemClock {
  pub fn new() -> Self {
    SystemClock {
      origin: Instant::now(),
    }
  }
}

impl Default for SystemClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for SystemClock {
  fn now(&self) -> f64 {
    self.origin.elapsed().as_secs_f64() * 1000.
  }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
  millis: Rc<Cell<f64>>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn advance(&self, millis: f64) {
    self.millis.set(self.millis.get() + millis);
  }

  pub fn set(&self, millis: f64) {
    self.millis.set(millis);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> f64 {
    self.millis.get()
  }
}

/// Measures elapsed milliseconds against a shared clock.
#[derive(Clone)]
pub struct Timer {
  clock: Rc<dyn Clock>,
  start: f64,
}

impl Timer {
  pub fn new(clock: Rc<dyn Clock>) -> Self {
    let start = clock.now();
    Timer { clock, start }
  }

  pub fn start(&mut self) {
    self.start = self.clock.now();
  }

  pub fn time_elapsed(&self) -> f64 {
    self.clock.now() - self.start
  }
}

impl fmt::Debug for Timer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Timer").field("start", &self.start).finish()
  }
}
