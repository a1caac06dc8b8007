// stepcore/src/execution/compute.rs

use crate::core::context::{StepContext, StepInputs};
use crate::core::events::UserEvent;
use crate::error::{user_code_boundary, StepError, StepResult};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use tracing::{event, Level};

/// Runs the step's compute logic on first pull and yields its events.
///
/// Both the call itself and every item of the returned stream go through the
/// compute error boundary. A compute that returns nothing iterable yields nothing.
pub(crate) fn user_event_stream<'a>(
  ctx: &'a StepContext,
  inputs: &'a StepInputs,
) -> BoxStream<'a, StepResult<UserEvent>> {
  Box::pin(try_stream! {
    let step = ctx.step();
    event!(Level::DEBUG, step_key = %step.key(), node = %step.node_handle(), "Invoking compute.");

    let produced = user_code_boundary(step.compute().compute(ctx, inputs), |source| compute_error(ctx, source))?;
    if let Some(mut user_events) = produced {
      while let Some(user_event) = user_events.next().await {
        let user_event = user_code_boundary(user_event, |source| compute_error(ctx, source))?;
        yield user_event;
      }
    } else {
      event!(Level::DEBUG, step_key = %step.key(), "Compute produced nothing to iterate.");
    }
  })
}

fn compute_error(ctx: &StepContext, source: anyhow::Error) -> StepError {
  let step = ctx.step();
  StepError::Compute {
    step_key: step.key().to_string(),
    node_name: step.node_name().to_string(),
    node_def_name: step.node_def_name().to_string(),
    source,
  }
}
