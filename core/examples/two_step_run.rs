// stepcore/examples/two_step_run.rs

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use stepcore::{
  compute_fn, execute_step, ExecutionStep, ExpectationResult, FromStepOutput, InMemoryOutputManager, NodeHandle,
  OutputEvent, PipelineInfo, RetryRequested, RuntimeType, StepContext, StepError, StepInput, StepOutput,
  StepOutputHandle, UserEvent,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Two Step Example ---");

  // One in-memory store backs both steps: "load" writes to it, "total" reads from it.
  let store = InMemoryOutputManager::new();
  let pipeline = PipelineInfo::new("orders_report");

  let load = ExecutionStep::new(
    "load",
    NodeHandle::root("load"),
    "load_orders",
    compute_fn(|_, _| Ok(vec![OutputEvent::new("orders", json!([12, 30, 7])).into()])),
  )
  .with_output(StepOutput::new("orders", RuntimeType::any(), "mem", Arc::new(store.clone())));

  let total = ExecutionStep::new(
    "total",
    NodeHandle::root("total"),
    "sum_orders",
    compute_fn(|_, inputs| {
      let orders = inputs["orders"].as_array().cloned().unwrap_or_default();
      if orders.is_empty() {
        // Upstream may still be writing; ask the scheduler for another attempt.
        return Err(RetryRequested::new(3).with_cooldown(1.0).into());
      }
      let sum: i64 = orders.iter().filter_map(|v| v.as_i64()).sum();
      Ok(vec![
        UserEvent::from(ExpectationResult::new(sum > 0).with_label("positive_total")),
        OutputEvent::new("sum", json!(sum)).into(),
      ])
    }),
  )
  .with_input(StepInput::new(
    "orders",
    RuntimeType::any(),
    FromStepOutput::new(store.clone(), "mem", StepOutputHandle::new("load", "orders")),
  ))
  .with_output(StepOutput::new("sum", RuntimeType::int(), "mem", Arc::new(store.clone())));

  for step in [load, total] {
    let ctx = StepContext::new("run-1", Arc::new(step), pipeline.clone());
    let mut events = execute_step(&ctx, 0);
    while let Some(item) = events.next().await {
      match item {
        Ok(event) => info!("[{}] {}: {}", event.step_key, event.event_type(), event.message),
        Err(StepError::RetryRequested(retry)) => {
          warn!("Step {} asked for a retry: {}", ctx.step_key(), retry);
        }
        Err(e) => error!("Step {} failed: {}", ctx.step_key(), e),
      }
    }
  }

  info!(
    "Stored sum: {:?}",
    store.get(&StepOutputHandle::new("total", "sum"))
  );
}
