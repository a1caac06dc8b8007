// stepcore/src/execution/orchestrator.rs

//! Contains `execute_step`, the state machine sequencing input resolution,
//! compute, the output gate and persistence into one ordered event stream.

use crate::core::context::{StepContext, StepInputs};
use crate::core::events::{LifecycleEvent, UserEvent};
use crate::error::{StepError, StepResult};
use crate::execution::compute::user_event_stream;
use crate::execution::inputs::{load_input_values, type_checked_input_events, InputItem};
use crate::execution::outputs::checked_user_events;
use crate::execution::persistence::step_events_for_output;
use crate::execution::timing::ExecutionTimer;
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use tracing::{event, instrument, Level};

/// The lifecycle events of one step execution. Ends after the first `Err` item.
pub type EventStream<'a> = BoxStream<'a, StepResult<LifecycleEvent>>;

/// Executes the step held by `ctx`, lazily.
///
/// Nothing happens until the returned stream is polled, and every side effect
/// (loading inputs, running compute, handing outputs to their managers) happens
/// at the pull that needs it. Dropping the stream stops the execution where it is;
/// a stream that did not yield `StepSuccess` is an incomplete execution.
///
/// `prior_attempt_count` only selects between `StepStart` and `StepRestarted`;
/// retries are the caller's decision.
pub fn execute_step(ctx: &StepContext, prior_attempt_count: u32) -> EventStream<'_> {
  Box::pin(try_stream! {
    event!(
      Level::DEBUG,
      step_key = %ctx.step_key(),
      run_id = %ctx.run_id(),
      prior_attempt_count,
      "Step execution starting."
    );
    if prior_attempt_count > 0 {
      yield LifecycleEvent::step_restarted(ctx, prior_attempt_count);
    } else {
      yield LifecycleEvent::step_start(ctx);
    }

    let mut inputs = StepInputs::new();
    let mut loaded = load_input_values(ctx);
    while let Some(item) = loaded.next().await {
      match item? {
        InputItem::Event(store_event) => {
          yield store_event;
        }
        InputItem::Loaded { name, value } => {
          inputs.insert(name, value);
        }
      }
    }

    let mut input_events = type_checked_input_events(ctx, &inputs);
    while let Some(input_event) = input_events.next().await {
      yield input_event?;
    }

    // Covers compute, the output gate and persistence, not compute alone.
    let timer = ExecutionTimer::start();
    let mut user_events = checked_user_events(ctx, user_event_stream(ctx, &inputs));
    while let Some(user_event) = user_events.next().await {
      match user_event? {
        UserEvent::Output(output) => {
          let mut output_events = step_events_for_output(ctx, output);
          while let Some(output_event) = output_events.next().await {
            yield output_event?;
          }
        }
        UserEvent::Materialization(materialization) => {
          yield LifecycleEvent::step_materialization(ctx, materialization);
        }
        UserEvent::ExpectationResult(result) => {
          yield LifecycleEvent::step_expectation_result(ctx, result);
        }
      }
    }
    let duration_ms = timer.elapsed_ms();

    event!(Level::DEBUG, step_key = %ctx.step_key(), duration_ms, "Step execution finished successfully.");
    yield LifecycleEvent::step_success(ctx, duration_ms);
  })
}

/// Drains `execute_step` into the events it yielded and the error it ended with, if any.
#[instrument(
  name = "collect_step_events",
  skip_all,
  fields(step_key = %ctx.step_key(), prior_attempt_count = prior_attempt_count)
)]
pub async fn collect_step_events(
  ctx: &StepContext,
  prior_attempt_count: u32,
) -> (Vec<LifecycleEvent>, Option<StepError>) {
  let mut events = Vec::new();
  let mut stream = execute_step(ctx, prior_attempt_count);
  while let Some(item) = stream.next().await {
    match item {
      Ok(lifecycle_event) => events.push(lifecycle_event),
      Err(e) => {
        event!(Level::ERROR, error = %e, events_recorded = events.len(), "Step execution failed.");
        return (events, Some(e));
      }
    }
  }
  (events, None)
}
