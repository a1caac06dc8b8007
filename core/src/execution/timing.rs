// stepcore/src/execution/timing.rs

use std::time::Instant;

/// Wall-clock timer for the part of a step reported in `StepSuccess`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutionTimer {
  started_at: Instant,
}

impl ExecutionTimer {
  pub(crate) fn start() -> Self {
    Self {
      started_at: Instant::now(),
    }
  }

  pub(crate) fn elapsed_ms(&self) -> f64 {
    self.started_at.elapsed().as_secs_f64() * 1000.0
  }
}
