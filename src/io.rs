//! Devices blocks talk to through `io_query`.

use crate::blocks::Reported;
use crate::error::BlockError;
use crate::value::Value;

pub trait IoDevice {
  /// Runs `function` on the device. `now` is the current tick's timestamp
  /// in milliseconds.
  fn query(
    &mut self,
    function: &str,
    args: &[Value],
    now: f64,
  ) -> Result<Reported, BlockError>;

  /// Called when the runtime is disposed.
  fn reset(&mut self) {}
}

/// Project timer, in seconds since the last reset.
#[derive(Debug, Default)]
pub struct ClockDevice {
  start: f64,
  paused_at: Option<f64>,
}

impl ClockDevice {
  pub fn new() -> Self {
    Self::default()
  }

  fn project_timer(&self, now: f64) -> f64 {
    (self.paused_at.unwrap_or(now) - self.start) / 1000.
  }
}

impl IoDevice for ClockDevice {
  fn query(
    &mut self,
    function: &str,
    _: &[Value],
    now: f64,
  ) -> Result<Reported, BlockError> {
    match function {
      "projectTimer" => return Ok(self.project_timer(now).into()),
      "resetProjectTimer" => {
        self.start = now;
        if self.paused_at.is_some() {
          self.paused_at = Some(now);
        }
      }
      "pause" => {
        self.paused_at.get_or_insert(now);
      }
      "resume" => {
        if let Some(paused_at) = self.paused_at.take() {
          self.start += now - paused_at;
        }
      }
      _ => {
        return Err(BlockError::UnknownDeviceFunction {
          device: "clock".to_string(),
          function: function.to_string(),
        });
      }
    }
    Ok(Reported::Nothing)
  }

  fn reset(&mut self) {
    *self = Self::default();
  }
}
